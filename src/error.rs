use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExporterError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Regex error: {0}")]
    Regex(#[from] regex::Error),

    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    #[error("Lookup failed: {0}")]
    LookupFailed(String),

    #[error("No benchmark servers available")]
    NoServersAvailable,

    #[error("Server ID {0} is not in the list of available servers and fallback is disabled")]
    ServerNotFound(String),

    #[error("Latency test failed: {0}")]
    LatencyFailed(String),

    #[error("Download test failed: {0}")]
    DownloadFailed(String),

    #[error("Upload test failed: {0}")]
    UploadFailed(String),

    #[error("Collection deadline exceeded")]
    DeadlineExceeded,

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("{0}")]
    Custom(String),
}

impl ExporterError {
    /// Deadline expiry is kept as is; anything else from a lookup becomes `LookupFailed`.
    pub fn into_lookup(self) -> Self {
        match self {
            Self::DeadlineExceeded | Self::LookupFailed(_) => self,
            other => Self::LookupFailed(other.to_string()),
        }
    }

    pub fn is_deadline(&self) -> bool {
        matches!(self, Self::DeadlineExceeded)
    }
}

pub type Result<T> = std::result::Result<T, ExporterError>;
