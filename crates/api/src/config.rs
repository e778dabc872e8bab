//! Runtime configuration for the workflow API client.
//!
//! Configuration is resolved once at process start and handed to
//! [`crate::WorkflowClient`]. Nothing here is global; tests build a
//! [`WorkflowConfig`] directly or through [`WorkflowConfig::from_env`].

use std::env;
use std::path::PathBuf;

use reqwest::Url;

use crate::error::{ApiError, ApiResult};

/// Public workflow builder API.
pub const DEFAULT_API_URL: &str = "https://tuba.ai/workflow_builder_api";
/// Environment variable carrying the bearer credential.
pub const ACCESS_TOKEN_ENV: &str = "TUBA_WORKFLOW_ACCESS_TOKEN";
/// Environment variable overriding the API base URL.
pub const API_URL_ENV: &str = "TUBA_WORKFLOW_API_URL";
/// Environment variable overriding where `result.zip` is written.
pub const RESULT_DIR_ENV: &str = "TUBA_WORKFLOW_RESULT_DIR";

/// Hostnames allowed for local development regardless of scheme.
const LOCALHOST_DOMAINS: &[&str] = &["localhost", "127.0.0.1"];

/// Resolved client configuration.
#[derive(Clone)]
pub struct WorkflowConfig {
    base_url: String,
    access_token: Option<String>,
    result_dir: PathBuf,
}

impl std::fmt::Debug for WorkflowConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowConfig")
            .field("base_url", &self.base_url)
            .field("access_token", &self.access_token.as_ref().map(|_| "<redacted>"))
            .field("result_dir", &self.result_dir)
            .finish()
    }
}

impl WorkflowConfig {
    /// Build a configuration for `base_url`, validating it.
    ///
    /// The result directory defaults to the current working directory.
    pub fn new(base_url: impl Into<String>, access_token: Option<String>) -> ApiResult<Self> {
        let base_url = normalize_base_url(base_url.into())?;
        Ok(Self {
            base_url,
            access_token: access_token.filter(|token| !token.trim().is_empty()),
            result_dir: PathBuf::from("."),
        })
    }

    /// Resolve configuration from process environment variables.
    ///
    /// - `TUBA_WORKFLOW_ACCESS_TOKEN`: bearer credential; empty counts as missing
    /// - `TUBA_WORKFLOW_API_URL`: base URL override
    /// - `TUBA_WORKFLOW_RESULT_DIR`: directory for downloaded archives
    pub fn from_env() -> ApiResult<Self> {
        let base_url = env::var(API_URL_ENV).unwrap_or_else(|_| DEFAULT_API_URL.to_string());
        let mut config = Self::new(base_url, env::var(ACCESS_TOKEN_ENV).ok())?;
        if let Ok(result_dir) = env::var(RESULT_DIR_ENV)
            && !result_dir.is_empty()
        {
            config.result_dir = PathBuf::from(result_dir);
        }
        Ok(config)
    }

    /// Replace the base URL, validating it like [`WorkflowConfig::new`].
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> ApiResult<Self> {
        self.base_url = normalize_base_url(base_url.into())?;
        Ok(self)
    }

    /// Replace the directory `result.zip` is written to.
    pub fn with_result_dir(mut self, result_dir: impl Into<PathBuf>) -> Self {
        self.result_dir = result_dir.into();
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn access_token(&self) -> Option<&str> {
        self.access_token.as_deref()
    }

    pub fn has_access_token(&self) -> bool {
        self.access_token.is_some()
    }

    pub fn result_dir(&self) -> &PathBuf {
        &self.result_dir
    }
}

fn normalize_base_url(base_url: String) -> ApiResult<String> {
    let trimmed = base_url.trim().trim_end_matches('/').to_string();
    validate_base_url(&trimmed)?;
    Ok(trimmed)
}

/// Validate that a base URL is acceptable for use by the client.
///
/// Rules:
/// - `localhost` or `127.0.0.1`: any http(s) scheme is allowed
/// - otherwise: scheme must be HTTPS
fn validate_base_url(base: &str) -> ApiResult<()> {
    let parsed_base_url = Url::parse(base).map_err(|error| ApiError::InvalidConfig {
        message: format!("invalid {API_URL_ENV} '{base}': {error}"),
    })?;

    let host_name = parsed_base_url.host_str().ok_or_else(|| ApiError::InvalidConfig {
        message: format!("{API_URL_ENV} must include a host"),
    })?;

    if LOCALHOST_DOMAINS.iter().any(|&allowed| host_name.eq_ignore_ascii_case(allowed))
        && matches!(parsed_base_url.scheme(), "http" | "https")
    {
        return Ok(());
    }

    if parsed_base_url.scheme() != "https" {
        return Err(ApiError::InvalidConfig {
            message: format!(
                "{API_URL_ENV} must use https for non-localhost hosts; got '{}://'",
                parsed_base_url.scheme()
            ),
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_come_from_environment() {
        temp_env::with_vars(
            [
                (ACCESS_TOKEN_ENV, Some("secret-token")),
                (API_URL_ENV, None),
                (RESULT_DIR_ENV, Some("/tmp/results")),
            ],
            || {
                let config = WorkflowConfig::from_env().unwrap();
                assert_eq!(config.base_url(), DEFAULT_API_URL);
                assert_eq!(config.access_token(), Some("secret-token"));
                assert_eq!(config.result_dir(), &PathBuf::from("/tmp/results"));
            },
        );
    }

    #[test]
    fn empty_token_counts_as_missing() {
        temp_env::with_vars([(ACCESS_TOKEN_ENV, Some("")), (API_URL_ENV, None)], || {
            let config = WorkflowConfig::from_env().unwrap();
            assert!(!config.has_access_token());
        });
    }

    #[test]
    fn base_url_override_is_trimmed() {
        temp_env::with_vars([(API_URL_ENV, Some("http://127.0.0.1:8080/api/")), (ACCESS_TOKEN_ENV, None)], || {
            let config = WorkflowConfig::from_env().unwrap();
            assert_eq!(config.base_url(), "http://127.0.0.1:8080/api");
            assert!(!config.has_access_token());
        });
    }

    #[test]
    fn plain_http_is_rejected_for_remote_hosts() {
        let error = WorkflowConfig::new("http://tuba.ai/workflow_builder_api", None).unwrap_err();
        assert!(matches!(error, ApiError::InvalidConfig { .. }));
        assert!(WorkflowConfig::new("not a url", None).is_err());
        assert!(WorkflowConfig::new("https://staging.tuba.ai/api", None).is_ok());

        let config = WorkflowConfig::new(DEFAULT_API_URL, Some("token".into())).unwrap();
        assert!(config.clone().with_base_url("ftp://localhost/api").is_err());
        let overridden = config.with_base_url("http://localhost:9000/").unwrap();
        assert_eq!(overridden.base_url(), "http://localhost:9000");
        assert_eq!(overridden.access_token(), Some("token"));
    }

    #[test]
    fn debug_output_redacts_token() {
        let config = WorkflowConfig::new(DEFAULT_API_URL, Some("super-secret".into())).unwrap();
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("super-secret"));
        assert!(rendered.contains("<redacted>"));
    }
}
