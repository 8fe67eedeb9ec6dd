//! Connection settings for the tracking service.
//!
//! The process environment is only consulted in [`NeptuneConfig::resolve`];
//! everything downstream receives an explicit [`NeptuneConfig`].

use std::env;
use std::fmt;
use std::time::Duration;

use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD, URL_SAFE};
use base64::Engine as _;
use serde::Deserialize;

use crate::error::{Error, Result};

/// Environment variable holding the API token
pub const API_TOKEN_ENV: &str = "NEPTUNE_API_TOKEN";

/// Optional override for the service address encoded in the token
pub const API_URL_ENV: &str = "NEPTUNE_API_URL";

#[derive(Clone)]
pub struct NeptuneConfig {
    /// Project identifier, `workspace/project`
    pub project: String,
    pub api_token: String,
    /// Base URL of the service; derived from the token when unset
    pub api_url: Option<String>,
    /// Global request timeout; the HTTP client default applies when unset
    pub timeout: Option<Duration>,
}

/// Payload carried inside a Neptune API token
#[derive(Debug, Deserialize)]
struct TokenClaims {
    api_address: Option<String>,
    api_url: Option<String>,
}

impl NeptuneConfig {
    pub fn new(project: impl Into<String>, api_token: impl Into<String>) -> Self {
        Self {
            project: project.into(),
            api_token: api_token.into(),
            api_url: None,
            timeout: None,
        }
    }

    /// Build a config from an optional explicit token, falling back to
    /// `NEPTUNE_API_TOKEN`. An explicit token is written back into the
    /// environment so later calls in this process can reuse it.
    pub fn resolve(project: impl Into<String>, api_token: Option<String>) -> Result<Self> {
        let token = resolve_token(API_TOKEN_ENV, api_token)?;
        let mut config = Self::new(project, token);
        if let Ok(url) = env::var(API_URL_ENV) {
            if !url.is_empty() {
                config.api_url = Some(url);
            }
        }
        Ok(config)
    }

    pub fn with_api_url(mut self, url: impl Into<String>) -> Self {
        self.api_url = Some(url.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Base URL of the service without a trailing slash
    pub fn base_url(&self) -> Result<String> {
        let url = match &self.api_url {
            Some(url) => url.clone(),
            None => api_address_from_token(&self.api_token)?,
        };
        Ok(url.trim_end_matches('/').to_string())
    }
}

impl fmt::Debug for NeptuneConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NeptuneConfig")
            .field("project", &self.project)
            .field("api_token", &"<redacted>")
            .field("api_url", &self.api_url)
            .field("timeout", &self.timeout)
            .finish()
    }
}

fn resolve_token(var: &str, explicit: Option<String>) -> Result<String> {
    match explicit {
        Some(token) => {
            env::set_var(var, &token);
            Ok(token)
        }
        None => env::var(var)
            .map_err(|_| Error::Config(format!("Environment variable {var} not found."))),
    }
}

/// Extract the service address from a base64-encoded token.
pub fn api_address_from_token(token: &str) -> Result<String> {
    let raw = token.trim();
    let bytes = STANDARD
        .decode(raw)
        .or_else(|_| STANDARD_NO_PAD.decode(raw))
        .or_else(|_| URL_SAFE.decode(raw))
        .map_err(|e| Error::Config(format!("API token is not valid base64: {e}")))?;

    let claims: TokenClaims = serde_json::from_slice(&bytes)
        .map_err(|e| Error::Config(format!("API token payload is not valid JSON: {e}")))?;

    claims
        .api_address
        .or(claims.api_url)
        .ok_or_else(|| Error::Config("API token does not carry a service address".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Serializes tests that touch NEPTUNE_API_TOKEN itself.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    fn encode_token(payload: &serde_json::Value) -> String {
        STANDARD.encode(payload.to_string())
    }

    #[test]
    fn explicit_token_is_written_to_environment() {
        let _guard = ENV_LOCK.lock().unwrap();
        let config = NeptuneConfig::resolve("ws/proj", Some("secret-token".to_string())).unwrap();
        assert_eq!(config.api_token, "secret-token");
        assert_eq!(env::var(API_TOKEN_ENV).unwrap(), "secret-token");
    }

    #[test]
    fn token_is_read_from_environment() {
        let _guard = ENV_LOCK.lock().unwrap();
        env::set_var(API_TOKEN_ENV, "from-env");
        let config = NeptuneConfig::resolve("ws/proj", None).unwrap();
        assert_eq!(config.api_token, "from-env");
        assert_eq!(config.project, "ws/proj");
    }

    #[test]
    fn resolve_without_token_or_environment_fails() {
        let _guard = ENV_LOCK.lock().unwrap();
        env::remove_var(API_TOKEN_ENV);
        let err = NeptuneConfig::resolve("ws/proj", None).unwrap_err();
        assert!(matches!(err, Error::Config(ref msg) if msg.contains(API_TOKEN_ENV)));
    }

    #[test]
    fn missing_token_is_a_config_error() {
        let var = "EXPHUB_TEST_TOKEN_MISSING";
        env::remove_var(var);
        let err = resolve_token(var, None).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert!(err.to_string().contains(var));
    }

    #[test]
    fn explicit_token_wins_over_environment() {
        let var = "EXPHUB_TEST_TOKEN_OVERRIDE";
        env::set_var(var, "old");
        let token = resolve_token(var, Some("new".to_string())).unwrap();
        assert_eq!(token, "new");
        assert_eq!(env::var(var).unwrap(), "new");
    }

    #[test]
    fn base_url_comes_from_token() {
        let token = encode_token(&serde_json::json!({
            "api_address": "https://app.neptune.ai/",
            "api_url": "https://ignored.example",
            "api_key": "abc"
        }));
        let config = NeptuneConfig::new("ws/proj", token);
        assert_eq!(config.base_url().unwrap(), "https://app.neptune.ai");
    }

    #[test]
    fn base_url_falls_back_to_api_url_claim() {
        let token = encode_token(&serde_json::json!({ "api_url": "https://onprem.local" }));
        let config = NeptuneConfig::new("ws/proj", token);
        assert_eq!(config.base_url().unwrap(), "https://onprem.local");
    }

    #[test]
    fn explicit_url_skips_token_decoding() {
        let config = NeptuneConfig::new("ws/proj", "not-base64!").with_api_url("http://localhost:8080/");
        assert_eq!(config.base_url().unwrap(), "http://localhost:8080");
    }

    #[test]
    fn garbage_token_without_url_is_rejected() {
        let config = NeptuneConfig::new("ws/proj", "not-base64!");
        assert!(matches!(config.base_url(), Err(Error::Config(_))));
    }

    #[test]
    fn debug_output_hides_token() {
        let config = NeptuneConfig::new("ws/proj", "super-secret");
        let shown = format!("{config:?}");
        assert!(!shown.contains("super-secret"));
        assert!(shown.contains("ws/proj"));
    }
}
