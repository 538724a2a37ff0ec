//! Configuration for the ingestion worker

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};

/// Environment variable naming a TOML config file
pub const CONFIG_ENV_VAR: &str = "RESUME_INGEST_CONFIG";

/// Main ingestion configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// Worker pool, timeouts and retry policy
    pub processing: ProcessingConfig,
    /// Job validation rules
    pub validation: ValidationConfig,
    /// Document parsing service
    pub parser: ParserConfig,
    /// SQLite storage
    pub storage: StorageConfig,
    /// Log filter
    pub logging: LoggingConfig,
}

impl IngestConfig {
    /// Parse a TOML config file. Missing sections use defaults.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read config '{}': {}", path.display(), e))
        })?;
        Self::from_toml(&raw)
    }

    /// Parse TOML text
    pub fn from_toml(raw: &str) -> Result<Self> {
        let config: IngestConfig = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from an explicit path, else from `RESUME_INGEST_CONFIG`, else defaults
    pub fn load(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            return Self::from_file(path);
        }

        match std::env::var(CONFIG_ENV_VAR) {
            Ok(path) if !path.trim().is_empty() => Self::from_file(path.trim()),
            _ => Ok(Self::default()),
        }
    }

    /// Reject settings the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.processing.max_attempts == 0 {
            return Err(Error::Config("processing.max_attempts must be at least 1".to_string()));
        }
        if self.processing.stage_timeout_secs == 0 {
            return Err(Error::Config("processing.stage_timeout_secs must be positive".to_string()));
        }
        if self.processing.queue_capacity == 0 {
            return Err(Error::Config("processing.queue_capacity must be positive".to_string()));
        }
        if self.validation.allowed_mime_types.is_empty() {
            return Err(Error::Config("validation.allowed_mime_types is empty".to_string()));
        }
        Ok(())
    }
}

/// Processing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessingConfig {
    /// Number of workers (default: CPU count, max 4)
    pub workers: Option<usize>,
    /// Bounded queue capacity
    pub queue_capacity: usize,
    /// Timeout for each collaborator call in seconds
    pub stage_timeout_secs: u64,
    /// Overall budget for a job before the watchdog force-fails it
    pub max_job_duration_secs: u64,
    /// How often the watchdog scans for stalled jobs
    pub watchdog_interval_secs: u64,
    /// Attempts the dispatcher allows per job, first run included
    pub max_attempts: u32,
    /// Base delay before a retried job is re-enqueued; doubles per attempt
    pub retry_backoff_ms: u64,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            workers: None,
            queue_capacity: 1000,
            stage_timeout_secs: 120,
            max_job_duration_secs: 900,
            watchdog_interval_secs: 30,
            max_attempts: 3,
            retry_backoff_ms: 2000,
        }
    }
}

impl ProcessingConfig {
    /// Resolved worker count
    pub fn worker_count(&self) -> usize {
        self.workers
            .unwrap_or_else(|| num_cpus::get().min(4))
            .max(1)
    }

    pub fn stage_timeout(&self) -> Duration {
        Duration::from_secs(self.stage_timeout_secs)
    }

    pub fn max_job_duration(&self) -> Duration {
        Duration::from_secs(self.max_job_duration_secs)
    }

    pub fn watchdog_interval(&self) -> Duration {
        Duration::from_secs(self.watchdog_interval_secs.max(1))
    }

    /// Delay before re-enqueueing after the given failed attempt
    pub fn retry_delay(&self, attempt: u32) -> Duration {
        let factor = 1u64 << attempt.saturating_sub(1).min(10);
        Duration::from_millis(self.retry_backoff_ms.saturating_mul(factor))
    }
}

/// Job validation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    /// Accepted resume mime types
    pub allowed_mime_types: Vec<String>,
    /// Guess the mime type from the file name when none is declared
    pub infer_mime_from_name: bool,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            allowed_mime_types: vec![
                "application/pdf".to_string(),
                "application/msword".to_string(),
                "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
                    .to_string(),
                "text/plain".to_string(),
            ],
            infer_mime_from_name: true,
        }
    }
}

impl ValidationConfig {
    pub fn is_allowed(&self, mime_type: &str) -> bool {
        self.allowed_mime_types
            .iter()
            .any(|allowed| allowed.eq_ignore_ascii_case(mime_type))
    }
}

/// Document parsing service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ParserConfig {
    /// Base URL of the extraction/structuring service
    pub base_url: String,
    /// API key sent as a bearer token
    pub api_key: Option<String>,
    /// HTTP client timeout in seconds
    pub timeout_secs: u64,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8090".to_string(),
            api_key: None,
            timeout_secs: 120,
        }
    }
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// SQLite database file
    pub database_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        let database_path = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("resume-ingest")
            .join("ingest.db");

        Self { database_path }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "resume_ingest=info".to_string(),
        }
    }
}
