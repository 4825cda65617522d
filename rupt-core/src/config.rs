//! Client settings file
//!
//! TOML model of everything the host can configure, with the default
//! lookup locations and environment overrides used by the CLI.

use crate::error::{ErrorContext, RuptError, RuptResult};
use crate::logging::LoggingConfig;
use crate::types::{AppearanceConfig, CallbackFlags, LimitConfig, SessionConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_BASE_URL: &str = "https://api.rupt.dev";

/// Reconnection tuning for the realtime channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RealtimeConfig {
    pub reconnect_initial_delay_ms: u64,
    pub reconnect_max_delay_ms: u64,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            reconnect_initial_delay_ms: 1_000,
            reconnect_max_delay_ms: 30_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientSettings {
    pub base_url: String,
    pub client_id: String,
    pub secret: Option<String>,
    pub request_timeout_seconds: u64,
    pub appearance: Option<AppearanceConfig>,
    pub limit: Option<LimitConfig>,
    pub callbacks: CallbackFlags,
    pub realtime: RealtimeConfig,
    pub logging: LoggingConfig,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            client_id: String::new(),
            secret: None,
            request_timeout_seconds: 30,
            appearance: None,
            limit: None,
            callbacks: CallbackFlags::default(),
            realtime: RealtimeConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl RealtimeConfig {
    /// Shortest pause the channel ever takes between two connection attempts
    pub const MIN_RECONNECT_DELAY_MS: u64 = 10;

    pub fn validate(&self) -> RuptResult<()> {
        if self.reconnect_initial_delay_ms == 0 {
            return Err(RuptError::Config {
                message: "realtime.reconnect_initial_delay_ms must be greater than 0".to_string(),
                context: ErrorContext::new("config").with_operation("validate"),
            });
        }
        if self.reconnect_max_delay_ms < self.reconnect_initial_delay_ms {
            return Err(RuptError::Config {
                message: format!(
                    "reconnect_max_delay_ms ({}) is below reconnect_initial_delay_ms ({})",
                    self.reconnect_max_delay_ms, self.reconnect_initial_delay_ms
                ),
                context: ErrorContext::new("config").with_operation("validate"),
            });
        }
        Ok(())
    }

    /// Delays as the channel applies them: the initial delay is at least
    /// `MIN_RECONNECT_DELAY_MS` and the maximum never drops below it.
    pub fn clamped(self) -> Self {
        let initial = self
            .reconnect_initial_delay_ms
            .max(Self::MIN_RECONNECT_DELAY_MS);
        Self {
            reconnect_initial_delay_ms: initial,
            reconnect_max_delay_ms: self.reconnect_max_delay_ms.max(initial),
        }
    }
}

impl ClientSettings {
    /// Load settings from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> RuptResult<Self> {
        let content = std::fs::read_to_string(&path).map_err(|e| RuptError::Config {
            message: format!("Failed to read config file: {}", e),
            context: ErrorContext::new("config")
                .with_operation("read_file")
                .with_suggestion("Check if the config file exists and is readable"),
        })?;

        toml::from_str(&content).map_err(|e| RuptError::Config {
            message: format!("Failed to parse config: {}", e),
            context: ErrorContext::new("config")
                .with_operation("parse_toml")
                .with_suggestion("Check TOML syntax in config file"),
        })
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> RuptResult<()> {
        let content = toml::to_string_pretty(self).map_err(|e| RuptError::Encoding {
            message: format!("Failed to serialize config: {}", e),
            source: Some(Box::new(e)),
            context: ErrorContext::new("config").with_operation("serialize_toml"),
        })?;

        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Candidate files, most specific first
    pub fn default_paths() -> Vec<PathBuf> {
        [
            dirs::config_dir().map(|d| d.join("rupt").join("config.toml")),
            dirs::home_dir().map(|d| d.join(".rupt").join("config.toml")),
            Some(PathBuf::from("rupt.toml")),
        ]
        .into_iter()
        .flatten()
        .collect()
    }

    /// Load from `path`, or from the first default location that exists, then
    /// apply `RUPT_CLIENT_ID` / `RUPT_SECRET`.
    pub fn load(path: Option<&Path>) -> RuptResult<Self> {
        let mut settings = match path {
            Some(path) => Self::from_file(path)?,
            None => match Self::default_paths().into_iter().find(|p| p.exists()) {
                Some(found) => {
                    tracing::info!("Loading configuration from {:?}", found);
                    Self::from_file(found)?
                }
                None => {
                    tracing::info!("No configuration file found, using defaults");
                    Self::default()
                }
            },
        };
        settings.apply_env_overrides(|key| std::env::var(key).ok());
        Ok(settings)
    }

    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(client_id) = lookup("RUPT_CLIENT_ID").filter(|v| !v.is_empty()) {
            self.client_id = client_id;
        }
        if let Some(secret) = lookup("RUPT_SECRET").filter(|v| !v.is_empty()) {
            self.secret = Some(secret);
        }
    }

    pub fn validate(&self) -> RuptResult<()> {
        if self.client_id.trim().is_empty() {
            return Err(RuptError::Config {
                message: "client_id must not be empty".to_string(),
                context: ErrorContext::new("config")
                    .with_operation("validate")
                    .with_suggestion("Set client_id or RUPT_CLIENT_ID"),
            });
        }

        if let Err(e) = url::Url::parse(&self.base_url) {
            return Err(RuptError::Config {
                message: format!("Invalid base_url '{}': {}", self.base_url, e),
                context: ErrorContext::new("config").with_operation("validate"),
            });
        }

        if self.request_timeout_seconds == 0 {
            return Err(RuptError::Config {
                message: "request_timeout_seconds must be greater than 0".to_string(),
                context: ErrorContext::new("config").with_operation("validate"),
            });
        }

        if matches!(self.limit, Some(limit) if limit.overall_limit == 0) {
            return Err(RuptError::Config {
                message: "limit.overall_limit must be greater than 0".to_string(),
                context: ErrorContext::new("config")
                    .with_operation("validate")
                    .with_suggestion("Remove the limit table to use the service default"),
            });
        }

        self.realtime.validate()
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            client_id: self.client_id.clone(),
            secret: self.secret.clone(),
            appearance: self.appearance,
            limit: self.limit,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minimal_settings() {
        let settings: ClientSettings = toml::from_str("client_id = \"abc\"").unwrap();
        assert_eq!(settings.client_id, "abc");
        assert_eq!(settings.base_url, DEFAULT_BASE_URL);
        assert_eq!(settings.request_timeout_seconds, 30);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_parse_full_settings() {
        let raw = r#"
            client_id = "abc"
            secret = "xyz"
            base_url = "http://127.0.0.1:9000"

            [appearance]
            show_blocking_dialog = true

            [limit]
            mobile_limit = 1
            overall_limit = 2

            [callbacks]
            limit_exceeded = true
        "#;
        let settings: ClientSettings = toml::from_str(raw).unwrap();
        let config = settings.session_config();
        assert_eq!(config.secret.as_deref(), Some("xyz"));
        assert_eq!(config.limit.map(|l| l.overall_limit), Some(2));
        assert_eq!(config.appearance.map(|a| a.show_blocking_dialog), Some(true));
        assert!(settings.callbacks.limit_exceeded);
        assert!(!settings.callbacks.on_challenge);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut settings = ClientSettings::default();
        assert!(settings.validate().is_err());

        settings.client_id = "abc".to_string();
        settings.base_url = "not a url".to_string();
        assert!(settings.validate().is_err());

        settings.base_url = DEFAULT_BASE_URL.to_string();
        settings.limit = Some(LimitConfig {
            mobile_limit: 1,
            overall_limit: 0,
        });
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_reconnect_delays() {
        let mut settings = ClientSettings {
            client_id: "abc".to_string(),
            ..ClientSettings::default()
        };
        settings.realtime.reconnect_initial_delay_ms = 0;
        let err = settings.validate().unwrap_err();
        assert!(err.message().contains("reconnect_initial_delay_ms"));

        settings.realtime = RealtimeConfig {
            reconnect_initial_delay_ms: 500,
            reconnect_max_delay_ms: 100,
        };
        assert!(settings.validate().is_err());

        settings.realtime.reconnect_max_delay_ms = 500;
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_realtime_delays_are_clamped() {
        let zero = RealtimeConfig {
            reconnect_initial_delay_ms: 0,
            reconnect_max_delay_ms: 0,
        }
        .clamped();
        assert_eq!(zero.reconnect_initial_delay_ms, RealtimeConfig::MIN_RECONNECT_DELAY_MS);
        assert_eq!(zero.reconnect_max_delay_ms, RealtimeConfig::MIN_RECONNECT_DELAY_MS);

        let inverted = RealtimeConfig {
            reconnect_initial_delay_ms: 200,
            reconnect_max_delay_ms: 50,
        }
        .clamped();
        assert_eq!(inverted.reconnect_max_delay_ms, 200);

        assert_eq!(RealtimeConfig::default().clamped(), RealtimeConfig::default());
    }

    #[test]
    fn test_env_overrides() {
        let mut settings = ClientSettings::default();
        settings.apply_env_overrides(|key| match key {
            "RUPT_CLIENT_ID" => Some("from-env".to_string()),
            "RUPT_SECRET" => Some(String::new()),
            _ => None,
        });
        assert_eq!(settings.client_id, "from-env");
        assert_eq!(settings.secret, None);
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let mut settings = ClientSettings::default();
        settings.client_id = "abc".to_string();
        settings.save_to_file(&path).unwrap();

        let reloaded = ClientSettings::from_file(&path).unwrap();
        assert_eq!(reloaded.client_id, "abc");
    }
}
