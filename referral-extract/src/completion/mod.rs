//! Hosted model backends behind one injectable capability.

pub mod gemini;
pub mod openrouter;

use async_trait::async_trait;

use crate::error::RequestError;
use crate::models::ImageAttachment;

pub use gemini::GeminiClient;
pub use openrouter::OpenRouterClient;

/// A hosted generative model that turns a prompt (and optional page images)
/// into completion text. One attempt per call; retries are the caller's choice.
#[async_trait]
pub trait CompletionModel: Send + Sync {
    /// Provider/model name for logs
    fn name(&self) -> &str;

    async fn complete(
        &self,
        prompt: &str,
        images: &[ImageAttachment],
    ) -> Result<String, RequestError>;
}

/// Map a non-success HTTP status to a request error.
pub(crate) fn status_error(status: reqwest::StatusCode, body: String) -> RequestError {
    match status.as_u16() {
        401 | 403 => RequestError::Unauthorized(body),
        400 if body.contains("API_KEY_INVALID") => RequestError::Unauthorized(body),
        408 | 504 => RequestError::Timeout,
        code => RequestError::Status { status: code, body },
    }
}

pub(crate) fn http_client(
    timeout: Option<std::time::Duration>,
) -> Result<reqwest::Client, RequestError> {
    let mut builder = reqwest::Client::builder();
    if let Some(timeout) = timeout {
        builder = builder.timeout(timeout);
    }
    builder
        .build()
        .map_err(|e| RequestError::Provider(format!("Failed to build HTTP client: {}", e)))
}
