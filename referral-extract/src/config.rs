use std::sync::Arc;
use std::time::Duration;

use crate::{
    completion::{
        CompletionModel, GeminiClient, OpenRouterClient, gemini::DEFAULT_GEMINI_MODEL,
        openrouter::DEFAULT_OPENROUTER_MODEL,
    },
    error::{ExtractionError, Result},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    Gemini,
    OpenRouter,
}

/// Model backend settings, read from the environment once at startup
#[derive(Clone)]
pub struct ExtractionConfig {
    pub provider: Provider,
    pub gemini_api_key: Option<String>,
    pub gemini_model: String,
    pub openrouter_api_key: Option<String>,
    pub openrouter_model: String,
    pub request_timeout: Option<Duration>,
}

impl std::fmt::Debug for ExtractionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtractionConfig")
            .field("provider", &self.provider)
            .field("gemini_api_key", &self.gemini_api_key.as_ref().map(|_| "***"))
            .field("gemini_model", &self.gemini_model)
            .field("openrouter_api_key", &self.openrouter_api_key.as_ref().map(|_| "***"))
            .field("openrouter_model", &self.openrouter_model)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

impl ExtractionConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let provider = match get("EXTRACTION_PROVIDER")
            .map(|p| p.trim().to_ascii_lowercase())
            .as_deref()
        {
            None | Some("gemini") => Provider::Gemini,
            Some("openrouter") => Provider::OpenRouter,
            Some(other) => {
                return Err(ExtractionError::Configuration(format!(
                    "Unknown EXTRACTION_PROVIDER '{}', expected 'gemini' or 'openrouter'",
                    other
                )));
            }
        };

        let request_timeout = match get("REQUEST_TIMEOUT_SECS") {
            None => None,
            Some(raw) => {
                let secs = raw.trim().parse::<u64>().map_err(|_| {
                    ExtractionError::Configuration(format!(
                        "REQUEST_TIMEOUT_SECS must be a whole number of seconds, got '{}'",
                        raw
                    ))
                })?;
                Some(Duration::from_secs(secs))
            }
        };

        Ok(Self {
            provider,
            gemini_api_key: get("GEMINI_API_KEY").or_else(|| get("GOOGLE_API_KEY")),
            gemini_model: get("GEMINI_MODEL").unwrap_or_else(|| DEFAULT_GEMINI_MODEL.to_string()),
            openrouter_api_key: get("OPENROUTER_API_KEY"),
            openrouter_model: get("OPENROUTER_MODEL")
                .unwrap_or_else(|| DEFAULT_OPENROUTER_MODEL.to_string()),
            request_timeout,
        })
    }

    /// Name of the variable that must hold the key for the chosen provider
    pub fn api_key_variable(&self) -> &'static str {
        match self.provider {
            Provider::Gemini => "GEMINI_API_KEY",
            Provider::OpenRouter => "OPENROUTER_API_KEY",
        }
    }

    pub fn api_key(&self) -> Option<&str> {
        match self.provider {
            Provider::Gemini => self.gemini_api_key.as_deref(),
            Provider::OpenRouter => self.openrouter_api_key.as_deref(),
        }
    }

    /// Fails with a configuration error when the provider's key is missing.
    pub fn build_model(&self) -> Result<Arc<dyn CompletionModel>> {
        let missing = || {
            ExtractionError::Configuration(format!(
                "{} environment variable is required",
                self.api_key_variable()
            ))
        };

        let model: Arc<dyn CompletionModel> = match self.provider {
            Provider::Gemini => {
                let key = self.gemini_api_key.clone().ok_or_else(missing)?;
                Arc::new(
                    GeminiClient::new(key, &self.gemini_model, self.request_timeout)
                        .map_err(|e| ExtractionError::Configuration(e.to_string()))?,
                )
            }
            Provider::OpenRouter => {
                let key = self.openrouter_api_key.clone().ok_or_else(missing)?;
                Arc::new(
                    OpenRouterClient::new(key, &self.openrouter_model, self.request_timeout)
                        .map_err(|e| ExtractionError::Configuration(e.to_string()))?,
                )
            }
        };
        Ok(model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<ExtractionConfig> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ExtractionConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config(&[]).unwrap();
        assert_eq!(config.provider, Provider::Gemini);
        assert_eq!(config.gemini_model, DEFAULT_GEMINI_MODEL);
        assert!(config.gemini_api_key.is_none());
        assert!(config.request_timeout.is_none());
    }

    #[test]
    fn test_google_api_key_is_a_fallback() {
        let config = config(&[("GOOGLE_API_KEY", "g-key")]).unwrap();
        assert_eq!(config.gemini_api_key.as_deref(), Some("g-key"));

        let config = config_with_both();
        assert_eq!(config.gemini_api_key.as_deref(), Some("primary"));
    }

    fn config_with_both() -> ExtractionConfig {
        config(&[("GEMINI_API_KEY", "primary"), ("GOOGLE_API_KEY", "fallback")]).unwrap()
    }

    #[test]
    fn test_missing_key_is_a_configuration_error() {
        let config = config(&[("GEMINI_API_KEY", "  ")]).unwrap();
        let err = config.build_model().err().unwrap();
        assert!(matches!(err, ExtractionError::Configuration(_)));
        assert!(err.to_string().contains("GEMINI_API_KEY"));
    }

    #[test]
    fn test_openrouter_provider() {
        let config = config(&[
            ("EXTRACTION_PROVIDER", "OpenRouter"),
            ("OPENROUTER_API_KEY", "or-key"),
            ("REQUEST_TIMEOUT_SECS", "30"),
        ])
        .unwrap();

        assert_eq!(config.provider, Provider::OpenRouter);
        assert_eq!(config.api_key(), Some("or-key"));
        assert_eq!(config.request_timeout, Some(Duration::from_secs(30)));
        let model = config.build_model().unwrap();
        assert_eq!(model.name(), format!("openrouter/{}", DEFAULT_OPENROUTER_MODEL));
    }

    #[test]
    fn test_invalid_values() {
        assert!(config(&[("EXTRACTION_PROVIDER", "claude")]).is_err());
        assert!(config(&[("REQUEST_TIMEOUT_SECS", "soon")]).is_err());
    }

    #[test]
    fn test_debug_hides_keys() {
        let rendered = format!("{:?}", config_with_both());
        assert!(!rendered.contains("primary"));
    }
}
