//! HTTP client for a remote extraction/structuring service
//!
//! Endpoints:
//! - `POST {base}/extract` with `{fileLocation, mimeType}` returns `{text}`
//! - `POST {base}/structure` with `{rawText, mimeType}` returns a structured resume

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::ParserConfig;
use crate::error::{Error, Result};
use crate::types::StructuredResume;

use super::parser::DocumentParser;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ExtractRequest<'a> {
    file_location: &'a str,
    mime_type: &'a str,
}

#[derive(Debug, Deserialize)]
struct ExtractResponse {
    text: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StructureRequest<'a> {
    raw_text: &'a str,
    mime_type: &'a str,
}

/// Document parser backed by an HTTP service
pub struct HttpDocumentParser {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    timeout_secs: u64,
}

impl HttpDocumentParser {
    /// Create a new HTTP parser client
    pub fn new(config: &ParserConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            timeout_secs: config.timeout_secs,
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    async fn post<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<reqwest::Response> {
        let mut request = self.client.post(self.endpoint(path)).json(body);
        if let Some(ref api_key) = self.api_key {
            request = request.bearer_auth(api_key);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                Error::timeout(format!("parser:{}", path), self.timeout_secs)
            } else {
                Error::upstream(format!("Parser request to /{} failed: {}", path, e))
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(error_for_status(status, &body));
        }

        Ok(response)
    }
}

/// Map a non-success response to a kind-tagged error
pub fn error_for_status(status: StatusCode, body: &str) -> Error {
    let detail = if body.trim().is_empty() {
        status.to_string()
    } else {
        format!("{} - {}", status, body.trim())
    };

    match status {
        StatusCode::TOO_MANY_REQUESTS => Error::rate_limited(detail),
        StatusCode::BAD_REQUEST
        | StatusCode::UNSUPPORTED_MEDIA_TYPE
        | StatusCode::UNPROCESSABLE_ENTITY => Error::validation(detail),
        _ => Error::upstream(detail),
    }
}

#[async_trait]
impl DocumentParser for HttpDocumentParser {
    async fn extract_text(&self, file_location: &str, mime_type: &str) -> Result<String> {
        let response = self
            .post(
                "extract",
                &ExtractRequest {
                    file_location,
                    mime_type,
                },
            )
            .await?;

        let body: ExtractResponse = response
            .json()
            .await
            .map_err(|e| Error::upstream(format!("Failed to parse extract response: {}", e)))?;

        tracing::debug!("Extracted {} chars from {}", body.text.len(), file_location);
        Ok(body.text)
    }

    async fn structure(&self, raw_text: &str, mime_type: &str) -> Result<StructuredResume> {
        let response = self
            .post("structure", &StructureRequest { raw_text, mime_type })
            .await?;

        let mut structured: StructuredResume = response
            .json()
            .await
            .map_err(|e| Error::upstream(format!("Failed to parse structure response: {}", e)))?;

        if structured.raw_text.is_empty() {
            structured.raw_text = raw_text.to_string();
        }
        Ok(structured)
    }

    fn name(&self) -> &str {
        "http"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            error_for_status(StatusCode::TOO_MANY_REQUESTS, "slow down").kind(),
            ErrorKind::RateLimited
        );
        assert_eq!(
            error_for_status(StatusCode::UNSUPPORTED_MEDIA_TYPE, "").kind(),
            ErrorKind::Validation
        );
        assert_eq!(
            error_for_status(StatusCode::UNPROCESSABLE_ENTITY, "bad pdf").kind(),
            ErrorKind::Validation
        );
        assert_eq!(
            error_for_status(StatusCode::BAD_GATEWAY, "").kind(),
            ErrorKind::Unknown
        );
        assert_eq!(
            error_for_status(StatusCode::SERVICE_UNAVAILABLE, "").kind(),
            ErrorKind::Unknown
        );
    }

    #[test]
    fn test_error_detail_includes_body() {
        let err = error_for_status(StatusCode::TOO_MANY_REQUESTS, "  quota exhausted ");
        assert!(err.to_string().contains("quota exhausted"));
    }

    #[test]
    fn test_endpoint_trims_trailing_slash() {
        let parser = HttpDocumentParser::new(&ParserConfig {
            base_url: "http://parser:9000/".to_string(),
            ..Default::default()
        })
        .unwrap();

        assert_eq!(parser.endpoint("extract"), "http://parser:9000/extract");
        assert_eq!(parser.name(), "http");
    }
}
