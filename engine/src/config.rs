//! `~/.cashier/config.toml` loading and resolution into [`AppSettings`].

use std::path::{Path, PathBuf};
use std::time::Duration;

use cashier_providers::{DEFAULT_REQUEST_TIMEOUT_SECS, Endpoints, GEOLOCATION_URL};
use cashier_providers::{PRODUCTION_API_BASE_URL, SANDBOX_API_BASE_URL};
use cashier_types::ui::UiOptions;
use cashier_types::{BearerToken, Environment, PayerId, PaymentId};
use serde::Deserialize;
use thiserror::Error;

use crate::location::LocationPolicy;
use crate::orchestrator::CallSettings;

#[derive(Debug, Default, Deserialize)]
pub struct CashierConfig {
    pub app: Option<AppConfig>,
    pub payments: Option<PaymentsConfig>,
    pub geolocation: Option<GeolocationConfig>,
    pub http: Option<HttpConfig>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

impl ConfigError {
    pub fn path(&self) -> &PathBuf {
        match self {
            ConfigError::Read { path, .. } | ConfigError::Parse { path, .. } => path,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct AppConfig {
    /// Use ASCII-only glyphs for icons and spinners.
    #[serde(default)]
    pub ascii_only: bool,
    /// Enable a high-contrast color palette.
    #[serde(default)]
    pub high_contrast: bool,
    /// Disable modal animations and motion effects.
    #[serde(default)]
    pub reduced_motion: bool,
}

#[derive(Default, Deserialize)]
pub struct PaymentsConfig {
    /// "sandbox" (default) or "production".
    pub environment: Option<String>,
    pub sandbox_base_url: Option<String>,
    pub production_base_url: Option<String>,
    /// Bearer token for the payments API. Supports `${VAR}` expansion.
    pub access_token: Option<String>,
    pub payment_id: Option<String>,
    pub payer_id: Option<String>,
}

// Manual Debug impl to prevent leaking the access token in logs.
impl std::fmt::Debug for PaymentsConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PaymentsConfig")
            .field("environment", &self.environment)
            .field("sandbox_base_url", &self.sandbox_base_url)
            .field("production_base_url", &self.production_base_url)
            .field(
                "access_token",
                &if self.access_token.is_some() {
                    "[REDACTED]"
                } else {
                    "None"
                },
            )
            .field("payment_id", &self.payment_id)
            .field("payer_id", &self.payer_id)
            .finish()
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct GeolocationConfig {
    pub url: Option<String>,
    /// ISO country codes where real-money play is refused. Default: `["VN"]`.
    pub blocked_countries: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
pub struct HttpConfig {
    /// Whole-request timeout. Default: 30.
    pub timeout_seconds: Option<u64>,
}

pub fn expand_env_vars(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut rest = value;

    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find('}') {
            Some(end) => {
                let var = &after[..end];
                if !var.is_empty() {
                    out.push_str(&std::env::var(var).unwrap_or_default());
                }
                rest = &after[end + 1..];
            }
            None => {
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }

    out.push_str(rest);
    out
}

impl CashierConfig {
    pub fn load() -> Result<Option<Self>, ConfigError> {
        match config_path() {
            Some(path) => Self::load_from(&path),
            None => Ok(None),
        }
    }

    /// Load `path`. A missing file is not an error.
    pub fn load_from(path: &Path) -> Result<Option<Self>, ConfigError> {
        if !path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(path).map_err(|source| {
            tracing::warn!("Failed to read config at {:?}: {}", path, source);
            ConfigError::Read {
                path: path.to_path_buf(),
                source,
            }
        })?;

        toml::from_str(&content).map(Some).map_err(|source| {
            tracing::warn!("Failed to parse config at {:?}: {}", path, source);
            ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            }
        })
    }

    #[must_use]
    pub fn path() -> Option<PathBuf> {
        config_path()
    }
}

pub fn config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".cashier").join("config.toml"))
}

/// Configuration resolved into the values the app runs with.
#[derive(Debug, Clone)]
pub struct AppSettings {
    pub ui: UiOptions,
    pub calls: CallSettings,
    pub request_timeout: Duration,
    pub payment_id: Option<PaymentId>,
    pub payer_id: Option<PayerId>,
}

impl AppSettings {
    #[must_use]
    pub fn from_config(config: Option<&CashierConfig>) -> Self {
        let ui = config
            .and_then(|c| c.app.as_ref())
            .map(|app| UiOptions {
                ascii_only: app.ascii_only,
                high_contrast: app.high_contrast,
                reduced_motion: app.reduced_motion,
            })
            .unwrap_or_default();

        let payments = config.and_then(|c| c.payments.as_ref());
        let geolocation = config.and_then(|c| c.geolocation.as_ref());

        let environment = payments
            .and_then(|p| p.environment.as_deref())
            .and_then(|raw| {
                Environment::parse(raw)
                    .inspect_err(|err| tracing::warn!("{err}; using sandbox"))
                    .ok()
            })
            .unwrap_or_default();

        let endpoints = Endpoints::new(
            expanded(payments.and_then(|p| p.sandbox_base_url.as_deref()))
                .unwrap_or_else(|| SANDBOX_API_BASE_URL.to_string()),
            expanded(payments.and_then(|p| p.production_base_url.as_deref()))
                .unwrap_or_else(|| PRODUCTION_API_BASE_URL.to_string()),
            expanded(geolocation.and_then(|g| g.url.as_deref()))
                .unwrap_or_else(|| GEOLOCATION_URL.to_string()),
        );

        let access_token = expanded(payments.and_then(|p| p.access_token.as_deref()))
            .and_then(|token| BearerToken::new(token).ok());

        let policy = geolocation
            .and_then(|g| g.blocked_countries.as_ref())
            .map(LocationPolicy::new)
            .unwrap_or_default();

        let timeout_secs = config
            .and_then(|c| c.http.as_ref())
            .and_then(|h| h.timeout_seconds)
            .filter(|secs| *secs > 0)
            .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS);

        Self {
            ui,
            calls: CallSettings {
                endpoints,
                environment,
                access_token,
                policy,
            },
            request_timeout: Duration::from_secs(timeout_secs),
            payment_id: expanded(payments.and_then(|p| p.payment_id.as_deref()))
                .and_then(|id| PaymentId::new(id).ok()),
            payer_id: expanded(payments.and_then(|p| p.payer_id.as_deref()))
                .and_then(|id| PayerId::new(id).ok()),
        }
    }
}

/// Expand `${VAR}` references; empty results count as unset.
fn expanded(raw: Option<&str>) -> Option<String> {
    let value = expand_env_vars(raw?);
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expand_env_vars_no_vars() {
        assert_eq!(expand_env_vars("hello world"), "hello world");
    }

    #[test]
    fn expand_env_vars_single_var() {
        unsafe {
            std::env::set_var("CASHIER_TEST_VAR", "replaced");
        }
        let result = expand_env_vars("prefix ${CASHIER_TEST_VAR} suffix");
        assert_eq!(result, "prefix replaced suffix");
        unsafe {
            std::env::remove_var("CASHIER_TEST_VAR");
        }
    }

    #[test]
    fn expand_env_vars_missing_var_becomes_empty() {
        unsafe {
            std::env::remove_var("CASHIER_MISSING_VAR");
        }
        let result = expand_env_vars("before ${CASHIER_MISSING_VAR} after");
        assert_eq!(result, "before  after");
    }

    #[test]
    fn expand_env_vars_unclosed_brace_preserved() {
        assert_eq!(expand_env_vars("test ${UNCLOSED"), "test ${UNCLOSED");
        assert_eq!(expand_env_vars("test ${} more"), "test  more");
    }

    #[test]
    fn missing_file_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = CashierConfig::load_from(&dir.path().join("config.toml")).unwrap();
        assert!(loaded.is_none());
    }

    #[test]
    fn parse_error_carries_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[payments\nenvironment = ").unwrap();

        let err = CashierConfig::load_from(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert_eq!(err.path(), &path);
    }

    #[test]
    fn full_file_resolves_settings() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
[app]
reduced_motion = true

[payments]
environment = "production"
production_base_url = "https://payments.example"
access_token = "live-token"
payment_id = "PAY-1"
payer_id = "PAYER-9"

[geolocation]
url = "http://geo.example/json"
blocked_countries = ["vn", "kp"]

[http]
timeout_seconds = 5
"#,
        )
        .unwrap();

        let config = CashierConfig::load_from(&path).unwrap().unwrap();
        let settings = AppSettings::from_config(Some(&config));

        assert!(settings.ui.reduced_motion);
        assert_eq!(settings.calls.environment, Environment::Production);
        assert_eq!(
            settings
                .calls
                .endpoints
                .base_url(Environment::Production)
                .unwrap()
                .as_str(),
            "https://payments.example/"
        );
        assert_eq!(settings.calls.access_token.unwrap().as_str(), "live-token");
        assert!(settings.calls.policy.is_blocked("KP"));
        assert_eq!(settings.request_timeout, Duration::from_secs(5));
        assert_eq!(settings.payment_id.unwrap().as_str(), "PAY-1");
        assert_eq!(settings.payer_id.unwrap().as_str(), "PAYER-9");
    }

    #[test]
    fn defaults_without_config() {
        let settings = AppSettings::from_config(None);
        assert_eq!(settings.calls.environment, Environment::Sandbox);
        assert!(settings.calls.access_token.is_none());
        assert!(settings.calls.policy.is_blocked("VN"));
        assert_eq!(
            settings.request_timeout,
            Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS)
        );
        assert_eq!(
            settings.calls.endpoints.geolocation_url().unwrap().as_str(),
            GEOLOCATION_URL
        );
    }

    #[test]
    fn unexpanded_token_counts_as_missing() {
        unsafe {
            std::env::remove_var("CASHIER_UNSET_TOKEN");
        }
        let config: CashierConfig =
            toml::from_str("[payments]\naccess_token = \"${CASHIER_UNSET_TOKEN}\"\n").unwrap();
        let settings = AppSettings::from_config(Some(&config));
        assert!(settings.calls.access_token.is_none());
    }

    #[test]
    fn debug_redacts_access_token() {
        let config: CashierConfig =
            toml::from_str("[payments]\naccess_token = \"very-secret\"\n").unwrap();
        let debug = format!("{config:?}");
        assert!(!debug.contains("very-secret"));
        assert!(debug.contains("[REDACTED]"));
    }
}
