//! Document parsing engine trait

use async_trait::async_trait;

use crate::error::Result;
use crate::types::StructuredResume;

/// Trait for the external document parsing engine
///
/// Implementations:
/// - `HttpDocumentParser`: remote extraction/structuring service
///
/// Errors must carry their kind at the throw site (for example
/// `Error::RateLimited` for an upstream throttle) so the retry classifier
/// never has to look at message text.
#[async_trait]
pub trait DocumentParser: Send + Sync {
    /// Extract plain text from the uploaded document
    async fn extract_text(&self, file_location: &str, mime_type: &str) -> Result<String>;

    /// Turn extracted text into structured resume fields
    async fn structure(&self, raw_text: &str, mime_type: &str) -> Result<StructuredResume>;

    /// Extract and structure in one call
    async fn extract_and_structure(
        &self,
        file_location: &str,
        mime_type: &str,
    ) -> Result<StructuredResume> {
        let raw_text = self.extract_text(file_location, mime_type).await?;
        let mut structured = self.structure(&raw_text, mime_type).await?;
        if structured.raw_text.is_empty() {
            structured.raw_text = raw_text;
        }
        Ok(structured)
    }

    /// Get provider name for logging
    fn name(&self) -> &str;
}
