use async_trait::async_trait;
use reqwest::Client;
use rig::{
    client::CompletionClient,
    completion::{CompletionError, Prompt, PromptError},
    providers::openrouter,
};
use serde_json::{Value, json};
use std::time::Duration;
use tracing::{info, warn};

use super::{CompletionModel, http_client, status_error};
use crate::error::RequestError;
use crate::models::ImageAttachment;

pub const OPENROUTER_API_BASE: &str = "https://openrouter.ai/api/v1";
pub const DEFAULT_OPENROUTER_MODEL: &str = "openai/gpt-4.1-mini";

const PREAMBLE: &str =
    "You are a medical AI assistant that extracts patient information from referral letters.";

/// OpenRouter backend. Text prompts go through a rig agent; prompts with
/// page images use the chat-completions endpoint directly.
pub struct OpenRouterClient {
    http: Client,
    api_key: String,
    model: String,
    base_url: String,
    max_tokens: u32,
    name: String,
}

impl OpenRouterClient {
    pub fn new(
        api_key: impl Into<String>,
        model: impl Into<String>,
        timeout: Option<Duration>,
    ) -> Result<Self, RequestError> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(RequestError::MissingApiKey("OpenRouter".to_string()));
        }
        let model = model.into();

        Ok(Self {
            http: http_client(timeout)?,
            api_key,
            name: format!("openrouter/{}", model),
            model,
            base_url: OPENROUTER_API_BASE.to_string(),
            max_tokens: 4000,
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// The rig client shares our endpoint and HTTP client, so the configured
    /// timeout applies to text prompts too.
    async fn complete_text(&self, prompt: &str) -> Result<String, RequestError> {
        let client = openrouter::Client::builder(&self.api_key)
            .base_url(&self.base_url)
            .custom_client(self.http.clone())
            .build()
            .map_err(|e| RequestError::Provider(format!("Failed to build rig client: {}", e)))?;
        let agent = client.agent(&self.model).preamble(PREAMBLE).build();

        agent.prompt(prompt).await.map_err(prompt_error)
    }

    async fn complete_vision(
        &self,
        prompt: &str,
        images: &[ImageAttachment],
    ) -> Result<String, RequestError> {
        let payload = vision_payload(&self.model, prompt, images, self.max_tokens);

        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = %status, "OpenRouter request failed");
            return Err(status_error(status, body));
        }

        let response_json: Value = response
            .json()
            .await
            .map_err(|e| RequestError::MalformedEnvelope(e.to_string()))?;

        response_json["choices"][0]["message"]["content"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| {
                RequestError::MalformedEnvelope("missing choices[0].message.content".to_string())
            })
    }
}

/// rig reports a failed HTTP status as the response body only; OpenRouter
/// puts the status in `error.code`.
fn prompt_error(err: PromptError) -> RequestError {
    match err {
        PromptError::CompletionError(CompletionError::HttpError(e)) => RequestError::from(e),
        PromptError::CompletionError(CompletionError::JsonError(e)) => {
            RequestError::MalformedEnvelope(e.to_string())
        }
        PromptError::CompletionError(CompletionError::ResponseError(message)) => {
            RequestError::MalformedEnvelope(message)
        }
        PromptError::CompletionError(CompletionError::ProviderError(body)) => {
            let code = serde_json::from_str::<Value>(&body)
                .ok()
                .and_then(|v| v["error"]["code"].as_u64())
                .and_then(|code| u16::try_from(code).ok())
                .and_then(|code| reqwest::StatusCode::from_u16(code).ok());
            match code {
                Some(status) => status_error(status, body),
                None => RequestError::Provider(body),
            }
        }
        other => RequestError::Provider(other.to_string()),
    }
}

fn vision_payload(model: &str, prompt: &str, images: &[ImageAttachment], max_tokens: u32) -> Value {
    let mut content = vec![json!({
        "type": "text",
        "text": prompt
    })];
    content.extend(images.iter().map(|image| {
        json!({
            "type": "image_url",
            "image_url": {
                "url": format!("data:{};base64,{}", image.media_type.mime(), image.to_base64())
            }
        })
    }));

    json!({
        "model": model,
        "messages": [
            { "role": "system", "content": PREAMBLE },
            { "role": "user", "content": content }
        ],
        "max_tokens": max_tokens
    })
}

#[async_trait]
impl CompletionModel for OpenRouterClient {
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
            "Calling OpenRouter"
        );

        let text = if images.is_empty() {
            self.complete_text(prompt).await?
        } else {
            self.complete_vision(prompt, images).await?
        };

        info!(completion_length = text.len(), "OpenRouter completion received");
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MediaType;
    use mockito::Matcher;
    use std::io::Write;

    fn page() -> ImageAttachment {
        ImageAttachment::new(vec![0x89, b'P', b'N', b'G'], MediaType::Png)
    }

    #[test]
    fn test_vision_payload_uses_data_urls() {
        let payload = vision_payload("m", "prompt", &[page()], 100);

        let content = payload["messages"][1]["content"].as_array().unwrap();
        assert_eq!(content[0]["text"], "prompt");
        assert!(
            content[1]["image_url"]["url"]
                .as_str()
                .unwrap()
                .starts_with("data:image/png;base64,")
        );
        assert_eq!(payload["max_tokens"], 100);
    }

    #[tokio::test]
    async fn test_vision_completion() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/chat/completions")
            .match_header("authorization", "Bearer or-key")
            .match_body(Matcher::Regex("image_url".to_string()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"choices": [{"message": {"content": "主訴：腹痛"}}]}"#)
            .create_async()
            .await;

        let client = OpenRouterClient::new("or-key", "test/model", None)
            .unwrap()
            .with_base_url(server.url());
        let text = client.complete("prompt", &[page()]).await.unwrap();

        assert_eq!(text, "主訴：腹痛");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_vision_unauthorized() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/chat/completions")
            .with_status(401)
            .with_body("No auth credentials found")
            .create_async()
            .await;

        let client = OpenRouterClient::new("bad-key", "test/model", None)
            .unwrap()
            .with_base_url(server.url());
        let err = client.complete("prompt", &[page()]).await.unwrap_err();

        assert!(matches!(err, RequestError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn test_vision_missing_content() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/chat/completions")
            .with_status(200)
            .with_body(r#"{"choices": []}"#)
            .create_async()
            .await;

        let client = OpenRouterClient::new("or-key", "test/model", None)
            .unwrap()
            .with_base_url(server.url());
        let err = client.complete("prompt", &[page()]).await.unwrap_err();

        assert!(matches!(err, RequestError::MalformedEnvelope(_)));
    }

    #[tokio::test]
    async fn test_text_completion_goes_through_configured_endpoint() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/chat/completions")
            .match_header("authorization", "Bearer or-key")
            .match_body(Matcher::Regex("test/model".to_string()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!({
                    "id": "gen-1",
                    "object": "chat.completion",
                    "created": 1,
                    "model": "test/model",
                    "choices": [{
                        "index": 0,
                        "message": { "role": "assistant", "content": "{\"name\": \"山田太郎\"}" },
                        "finish_reason": "stop"
                    }],
                    "usage": { "prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15 }
                })
                .to_string(),
            )
            .create_async()
            .await;

        let client = OpenRouterClient::new("or-key", "test/model", None)
            .unwrap()
            .with_base_url(server.url());
        let text = client.complete("prompt", &[]).await.unwrap();

        assert_eq!(text, r#"{"name": "山田太郎"}"#);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_text_unauthorized() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/chat/completions")
            .with_status(401)
            .with_body(r#"{"error": {"message": "No auth credentials found", "code": 401}}"#)
            .create_async()
            .await;

        let client = OpenRouterClient::new("bad-key", "test/model", None)
            .unwrap()
            .with_base_url(server.url());
        let err = client.complete("prompt", &[]).await.unwrap_err();

        assert!(matches!(err, RequestError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn test_text_honours_request_timeout() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/chat/completions")
            .with_status(200)
            .with_chunked_body(|w| {
                std::thread::sleep(Duration::from_millis(1000));
                w.write_all(b"{}")
            })
            .create_async()
            .await;

        let client = OpenRouterClient::new("or-key", "test/model", Some(Duration::from_millis(50)))
            .unwrap()
            .with_base_url(server.url());
        let err = client.complete("prompt", &[]).await.unwrap_err();

        assert_eq!(err, RequestError::Timeout);
    }

    #[test]
    fn test_provider_error_without_code() {
        let err = prompt_error(PromptError::CompletionError(
            CompletionError::ProviderError("model overloaded".to_string()),
        ));
        assert_eq!(err, RequestError::Provider("model overloaded".to_string()));
    }

    /// Usage: OPENROUTER_API_KEY=key cargo test test_live_openrouter_text
    #[tokio::test]
    async fn test_live_openrouter_text() {
        let Ok(api_key) = std::env::var("OPENROUTER_API_KEY") else {
            println!("Skipping test - set OPENROUTER_API_KEY environment variable");
            return;
        };

        let client = OpenRouterClient::new(api_key, DEFAULT_OPENROUTER_MODEL, None).unwrap();
        let text = client.complete("Reply with the word OK.", &[]).await.unwrap();
        assert!(!text.trim().is_empty());
    }
}
