use thiserror::Error;

/// Failures talking to the hosted model
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RequestError {
    #[error("API key is not configured for {0}")]
    MissingApiKey(String),

    #[error("model API is unreachable: {0}")]
    Unreachable(String),

    #[error("model API call timed out")]
    Timeout,

    #[error("model API rejected the credentials: {0}")]
    Unauthorized(String),

    #[error("model API returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("unexpected response envelope from model API: {0}")]
    MalformedEnvelope(String),

    #[error("model provider error: {0}")]
    Provider(String),
}

impl From<reqwest::Error> for RequestError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            RequestError::Timeout
        } else if err.is_decode() {
            RequestError::MalformedEnvelope(err.to_string())
        } else {
            RequestError::Unreachable(err.to_string())
        }
    }
}

#[derive(Error, Debug)]
pub enum ExtractionError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Unsupported media type: {0}")]
    UnsupportedMediaType(String),

    #[error("Media processing failed: {0}")]
    Media(String),

    #[error(transparent)]
    Request(#[from] RequestError),

    #[error("Context error: {0}")]
    ContextError(String),

    #[error("Task execution failed: {0}")]
    TaskExecutionFailed(String),
}

impl ExtractionError {
    /// Stable machine-readable name for API clients
    pub fn kind(&self) -> &'static str {
        match self {
            ExtractionError::Configuration(_) => "configuration",
            ExtractionError::InvalidInput(_) => "invalid_input",
            ExtractionError::UnsupportedMediaType(_) => "unsupported_media_type",
            ExtractionError::Media(_) => "media",
            ExtractionError::Request(RequestError::Timeout) => "timeout",
            ExtractionError::Request(RequestError::MissingApiKey(_)) => "configuration",
            ExtractionError::Request(_) => "request",
            ExtractionError::ContextError(_) | ExtractionError::TaskExecutionFailed(_) => {
                "internal"
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, ExtractionError>;
