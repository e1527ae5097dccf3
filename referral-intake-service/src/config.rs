use referral_extract::{ExtractionConfig, ExtractionError, Result};

pub const DEFAULT_PORT: u16 = 3000;

/// Everything the binary needs at startup
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub port: u16,
    pub extraction: ExtractionConfig,
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Fails when the selected provider has no API key.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let port = match lookup("PORT").filter(|v| !v.trim().is_empty()) {
            None => DEFAULT_PORT,
            Some(raw) => raw.trim().parse::<u16>().map_err(|_| {
                ExtractionError::Configuration(format!("PORT must be a port number, got '{}'", raw))
            })?,
        };

        let extraction = ExtractionConfig::from_lookup(&lookup)?;
        if extraction.api_key().is_none() {
            return Err(ExtractionError::Configuration(format!(
                "{} environment variable is required",
                extraction.api_key_variable()
            )));
        }

        Ok(Self { port, extraction })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use referral_extract::Provider;

    fn lookup<'a>(vars: &'a [(&'a str, &'a str)]) -> impl Fn(&str) -> Option<String> + 'a {
        move |key| {
            vars.iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| v.to_string())
        }
    }

    #[test]
    fn test_defaults_with_gemini_key() {
        let config = ServiceConfig::from_lookup(lookup(&[("GEMINI_API_KEY", "key")])).unwrap();
        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.extraction.provider, Provider::Gemini);
    }

    #[test]
    fn test_missing_key_fails_at_startup() {
        let err = ServiceConfig::from_lookup(lookup(&[("PORT", "8080")])).unwrap_err();
        assert_eq!(err.kind(), "configuration");
        assert!(err.to_string().contains("GEMINI_API_KEY"));

        let err = ServiceConfig::from_lookup(lookup(&[
            ("EXTRACTION_PROVIDER", "openrouter"),
            ("GEMINI_API_KEY", "key"),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("OPENROUTER_API_KEY"));
    }

    #[test]
    fn test_port_override() {
        let config =
            ServiceConfig::from_lookup(lookup(&[("GOOGLE_API_KEY", "key"), ("PORT", "8080")]))
                .unwrap();
        assert_eq!(config.port, 8080);

        assert!(
            ServiceConfig::from_lookup(lookup(&[("GOOGLE_API_KEY", "key"), ("PORT", "http")]))
                .is_err()
        );
    }
}
