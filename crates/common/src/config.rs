use anyhow::{Context, Result};
use serde::Deserialize;
use validator::Validate;

// Default constants
pub const DEFAULT_HOST: &str = "http://localhost:8080";
pub const DEFAULT_OAUTH_REDIRECT_PATH: &str = "/oauth2/authorize";
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_SERVICE_NAME: &str = "Lowdeck Server";

/// Top-level application configuration.
///
/// Loaded from an optional config file, overridden by `LOWDECK`-prefixed
/// environment variables (`LOWDECK_SERVER__HOST` maps to `server.host`).
#[derive(Debug, Deserialize, Default, Clone, Validate)]
pub struct AppConfig {
    #[serde(default)]
    #[validate(nested)]
    pub server: ServerSettings,
    #[serde(default)]
    pub http: HttpSettings,
}

#[derive(Debug, Deserialize, Clone, Validate)]
pub struct ServerSettings {
    /// Public base URL of this deployment, used to build OAuth redirect URIs.
    #[serde(default = "default_host")]
    #[validate(url)]
    pub host: String,

    /// Path appended to `host` for the OAuth2 authorization callback.
    #[serde(default = "default_oauth_redirect_path")]
    pub oauth_redirect_path: String,

    #[serde(default = "default_service_name")]
    pub name: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            oauth_redirect_path: default_oauth_redirect_path(),
            name: default_service_name(),
        }
    }
}

impl ServerSettings {
    /// Full redirect URI registered with OAuth providers.
    pub fn oauth_redirect_uri(&self) -> String {
        format!(
            "{}{}",
            self.host.trim_end_matches('/'),
            self.oauth_redirect_path
        )
    }
}

fn default_host() -> String {
    DEFAULT_HOST.to_string()
}

fn default_oauth_redirect_path() -> String {
    DEFAULT_OAUTH_REDIRECT_PATH.to_string()
}

fn default_service_name() -> String {
    DEFAULT_SERVICE_NAME.to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct HttpSettings {
    /// Timeout applied to outbound requests (token endpoints, REST queries).
    #[serde(default = "default_http_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            timeout_secs: default_http_timeout_secs(),
        }
    }
}

fn default_http_timeout_secs() -> u64 {
    DEFAULT_HTTP_TIMEOUT_SECS
}

impl AppConfig {
    pub fn from_file(path: &str) -> Result<Self> {
        let builder = config::Config::builder();

        let builder = if std::path::Path::new(path).exists() {
            builder.add_source(config::File::with_name(path))
        } else {
            builder
        };

        // Map LOWDECK_SERVER__HOST to server.host, etc.
        let builder = builder.add_source(
            config::Environment::with_prefix("LOWDECK")
                .separator("__")
                .try_parsing(true),
        );

        let cfg = builder.build().context("Failed to build configuration")?;

        let app_config: AppConfig = cfg
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        app_config
            .validate()
            .map_err(|e| anyhow::anyhow!("Configuration validation failed: {:?}", e))?;

        Ok(app_config)
    }
}
