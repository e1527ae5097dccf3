use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Value, json};
use std::time::Duration;
use tracing::{info, warn};

use super::{CompletionModel, http_client, status_error};
use crate::error::RequestError;
use crate::models::ImageAttachment;

pub const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.5-flash";

/// Google Gemini `generateContent` over HTTPS
pub struct GeminiClient {
    http: Client,
    api_key: String,
    model: String,
    base_url: String,
    name: String,
}

impl GeminiClient {
    pub fn new(
        api_key: impl Into<String>,
        model: impl Into<String>,
        timeout: Option<Duration>,
    ) -> Result<Self, RequestError> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(RequestError::MissingApiKey("Gemini".to_string()));
        }
        let model = model.into();

        Ok(Self {
            http: http_client(timeout)?,
            api_key,
            name: format!("gemini/{}", model),
            model,
            base_url: GEMINI_API_BASE.to_string(),
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url, self.model
        )
    }
}

fn request_body(prompt: &str, images: &[ImageAttachment]) -> Value {
    let mut parts = vec![json!({ "text": prompt })];
    parts.extend(images.iter().map(|image| {
        json!({
            "inline_data": {
                "mime_type": image.media_type.mime(),
                "data": image.to_base64()
            }
        })
    }));

    json!({
        "contents": [
            {
                "role": "user",
                "parts": parts
            }
        ],
        "generationConfig": {
            "responseMimeType": "application/json"
        }
    })
}

/// Concatenate the text parts of the first candidate.
fn completion_text(response: &Value) -> Result<String, RequestError> {
    let Some(parts) = response["candidates"][0]["content"]["parts"].as_array() else {
        let reason = response["promptFeedback"]["blockReason"]
            .as_str()
            .map(|r| format!("prompt blocked: {}", r))
            .unwrap_or_else(|| "no candidates in response".to_string());
        return Err(RequestError::MalformedEnvelope(reason));
    };

    let text: String = parts
        .iter()
        .filter_map(|part| part["text"].as_str())
        .collect();

    Ok(text)
}

#[async_trait]
impl CompletionModel for GeminiClient {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(
        &self,
        prompt: &str,
        images: &[ImageAttachment],
    ) -> Result<String, RequestError> {
        info!(
            model = %self.model,
            images = images.len(),
            prompt_length = prompt.len(),
            "Calling Gemini generateContent"
        );

        let response = self
            .http
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .json(&request_body(prompt, images))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = %status, "Gemini request failed");
            return Err(status_error(status, body));
        }

        let response_json: Value = response
            .json()
            .await
            .map_err(|e| RequestError::MalformedEnvelope(e.to_string()))?;

        let text = completion_text(&response_json)?;
        info!(
            completion_length = text.len(),
            "Gemini completion received"
        );
        Ok(text)
    }
}
