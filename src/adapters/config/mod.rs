use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::core::retrieval::DEFAULT_TOP_K;

/// Bump this when adding new fields with non-trivial defaults.
/// When a loaded config has a lower version, it is re-saved to disk
/// so that users see the new keys in their `config.toml`.
const CURRENT_CONFIG_VERSION: u32 = 1;

pub const API_URL_ENV: &str = "KBCHAT_API_URL";
pub const TOKEN_ENV: &str = "KBCHAT_TOKEN";

const DEFAULT_API_BASE_URL: &str = "http://localhost:8000/api";
const LOG_LEVELS: [&str; 5] = ["error", "warn", "info", "debug", "trace"];

fn default_top_k() -> u32 {
    DEFAULT_TOP_K
}

fn default_connect_timeout_secs() -> u64 {
    10
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to write config: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("Invalid value for '{key}': {reason}")]
    InvalidValue { key: &'static str, reason: String },
    #[error("Unknown config key '{0}'. Expected one of: {keys}", keys = Settings::KEYS.join(", "))]
    UnknownKey(String),
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct Settings {
    pub config_version: u32,
    pub api_base_url: Option<String>,
    pub access_token: Option<String>,
    #[serde(default = "default_top_k")]
    pub default_top_k: u32,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    pub log_level: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            config_version: 0,
            api_base_url: Some(DEFAULT_API_BASE_URL.to_string()),
            access_token: None,
            default_top_k: default_top_k(),
            connect_timeout_secs: default_connect_timeout_secs(),
            log_level: None,
        }
    }
}

impl Settings {
    pub const KEYS: [&'static str; 5] = [
        "api_base_url",
        "access_token",
        "default_top_k",
        "connect_timeout_secs",
        "log_level",
    ];

    fn global_config_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".kbchat")
    }

    pub fn global_config_path() -> PathBuf {
        Self::global_config_dir().join("config.toml")
    }

    pub fn load_global() -> Self {
        Self::load_from(&Self::global_config_path())
    }

    /// Missing or unreadable files yield defaults; this never fails.
    pub fn load_from(path: &Path) -> Self {
        if !path.exists() {
            return Self {
                config_version: CURRENT_CONFIG_VERSION,
                ..Self::default()
            };
        }

        let content = std::fs::read_to_string(path).unwrap_or_default();
        let mut settings: Self = match toml::from_str(&content) {
            Ok(s) => s,
            Err(e) => {
                // Logging is configured from these settings, so it is not up yet.
                eprintln!(
                    "[config] Failed to parse {}: {e}. Using defaults.",
                    path.display()
                );
                return Self {
                    config_version: CURRENT_CONFIG_VERSION,
                    ..Self::default()
                };
            }
        };

        // Re-save when config is from an older version so new fields
        // (with their defaults) appear in the file on disk.
        if settings.config_version < CURRENT_CONFIG_VERSION {
            settings.config_version = CURRENT_CONFIG_VERSION;
            if let Err(e) = settings.save_to(path) {
                eprintln!("[config] Failed to migrate config to v{CURRENT_CONFIG_VERSION}: {e}");
            }
        }

        settings
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        match key.trim() {
            "api_base_url" => self.set_api_base_url(value),
            "access_token" => {
                self.set_access_token(value);
                Ok(())
            }
            "default_top_k" => {
                let parsed = value.trim().parse::<u32>().map_err(|e| ConfigError::InvalidValue {
                    key: "default_top_k",
                    reason: e.to_string(),
                })?;
                self.set_default_top_k(parsed)
            }
            "connect_timeout_secs" => {
                let parsed = value.trim().parse::<u64>().map_err(|e| ConfigError::InvalidValue {
                    key: "connect_timeout_secs",
                    reason: e.to_string(),
                })?;
                self.connect_timeout_secs = parsed.max(1);
                Ok(())
            }
            "log_level" => self.set_log_level(value),
            other => Err(ConfigError::UnknownKey(other.to_string())),
        }
    }

    pub fn set_api_base_url(&mut self, url: &str) -> Result<(), ConfigError> {
        let normalized = url.trim().trim_end_matches('/');
        if normalized.is_empty() {
            self.api_base_url = None;
            return Ok(());
        }
        if !(normalized.starts_with("http://") || normalized.starts_with("https://")) {
            return Err(ConfigError::InvalidValue {
                key: "api_base_url",
                reason: format!("'{normalized}' must start with http:// or https://"),
            });
        }
        self.api_base_url = Some(normalized.to_string());
        Ok(())
    }

    pub fn set_access_token(&mut self, token: &str) {
        let normalized = token.trim();
        self.access_token = if normalized.is_empty() {
            None
        } else {
            Some(normalized.to_string())
        };
    }

    pub fn set_default_top_k(&mut self, top_k: u32) -> Result<(), ConfigError> {
        if top_k == 0 {
            return Err(ConfigError::InvalidValue {
                key: "default_top_k",
                reason: "must be at least 1".to_string(),
            });
        }
        self.default_top_k = top_k;
        Ok(())
    }

    pub fn set_log_level(&mut self, level: &str) -> Result<(), ConfigError> {
        let normalized = level.trim().to_ascii_lowercase();
        if normalized.is_empty() {
            self.log_level = None;
            return Ok(());
        }
        if !LOG_LEVELS.contains(&normalized.as_str()) {
            return Err(ConfigError::InvalidValue {
                key: "log_level",
                reason: format!("expected one of {}", LOG_LEVELS.join(", ")),
            });
        }
        self.log_level = Some(normalized);
        Ok(())
    }

    pub fn api_base_url(&self) -> String {
        self.api_base_url_with(std::env::var(API_URL_ENV).ok())
    }

    fn api_base_url_with(&self, env_override: Option<String>) -> String {
        env_override
            .map(|value| value.trim().trim_end_matches('/').to_string())
            .filter(|value| !value.is_empty())
            .or_else(|| {
                self.api_base_url
                    .as_deref()
                    .map(str::trim)
                    .filter(|value| !value.is_empty())
                    .map(ToOwned::to_owned)
            })
            .unwrap_or_else(|| DEFAULT_API_BASE_URL.to_string())
    }

    pub fn access_token(&self) -> Option<String> {
        self.access_token
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(ToOwned::to_owned)
    }

    pub fn default_top_k(&self) -> u32 {
        self.default_top_k.max(1)
    }

    pub fn connect_timeout_secs(&self) -> u64 {
        self.connect_timeout_secs.clamp(1, 300)
    }

    pub fn log_level(&self) -> String {
        self.log_level
            .clone()
            .filter(|level| LOG_LEVELS.contains(&level.as_str()))
            .unwrap_or_else(|| "warn".to_string())
    }

    /// Same settings with the token masked, for display.
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        if let Some(token) = copy.access_token.as_mut() {
            let visible = token.chars().take(4).collect::<String>();
            *token = format!("{visible}...");
        }
        copy
    }
}

#[cfg(test)]
mod tests {
    use super::{ConfigError, Settings, CURRENT_CONFIG_VERSION};

    fn temp_config_path() -> std::path::PathBuf {
        std::env::temp_dir()
            .join(format!("kbchat-config-test-{}", uuid::Uuid::new_v4()))
            .join("config.toml")
    }

    #[test]
    fn missing_file_yields_current_version_defaults() {
        let settings = Settings::load_from(&temp_config_path());
        assert_eq!(settings.config_version, CURRENT_CONFIG_VERSION);
        assert_eq!(settings.api_base_url(), "http://localhost:8000/api");
        assert_eq!(settings.default_top_k(), 3);
        assert_eq!(settings.access_token(), None);
    }

    #[test]
    fn old_config_is_migrated_and_resaved() {
        let path = temp_config_path();
        std::fs::create_dir_all(path.parent().expect("parent")).expect("create dir");
        std::fs::write(&path, "access_token = \"tok-123\"\n").expect("write old config");

        let settings = Settings::load_from(&path);
        assert_eq!(settings.config_version, CURRENT_CONFIG_VERSION);
        assert_eq!(settings.access_token(), Some("tok-123".to_string()));

        let content = std::fs::read_to_string(&path).expect("read migrated");
        assert!(content.contains("config_version"));
        assert!(content.contains("default_top_k"));

        let _ = std::fs::remove_dir_all(path.parent().expect("parent"));
    }

    #[test]
    fn unparsable_config_falls_back_to_defaults() {
        let path = temp_config_path();
        std::fs::create_dir_all(path.parent().expect("parent")).expect("create dir");
        std::fs::write(&path, "default_top_k = \"many\"\n[[[").expect("write broken config");

        let settings = Settings::load_from(&path);
        assert_eq!(settings.default_top_k(), 3);

        let _ = std::fs::remove_dir_all(path.parent().expect("parent"));
    }

    #[test]
    fn save_and_reload_roundtrip() {
        let path = temp_config_path();
        let mut settings = Settings::default();
        settings
            .set_api_base_url("https://rag.example.com/api/")
            .expect("set url");
        settings.set_access_token("  secret ");
        settings.set_default_top_k(5).expect("set top k");
        settings.save_to(&path).expect("save");

        let reloaded = Settings::load_from(&path);
        assert_eq!(
            reloaded.api_base_url,
            Some("https://rag.example.com/api".to_string())
        );
        assert_eq!(reloaded.access_token(), Some("secret".to_string()));
        assert_eq!(reloaded.default_top_k(), 5);

        let _ = std::fs::remove_dir_all(path.parent().expect("parent"));
    }

    #[test]
    fn env_override_wins_over_file_value() {
        let mut settings = Settings::default();
        settings
            .set_api_base_url("https://file.example.com/api")
            .expect("set url");
        assert_eq!(
            settings.api_base_url_with(Some("https://env.example.com/api/".to_string())),
            "https://env.example.com/api"
        );
        assert_eq!(
            settings.api_base_url_with(Some("  ".to_string())),
            "https://file.example.com/api"
        );
    }

    #[test]
    fn set_rejects_invalid_values() {
        let mut settings = Settings::default();
        assert!(matches!(
            settings.set("api_base_url", "localhost:8000"),
            Err(ConfigError::InvalidValue { key: "api_base_url", .. })
        ));
        assert!(settings.set("default_top_k", "0").is_err());
        assert!(settings.set("default_top_k", "three").is_err());
        assert!(settings.set("log_level", "loud").is_err());
        assert!(matches!(
            settings.set("theme", "dark"),
            Err(ConfigError::UnknownKey(_))
        ));
    }

    #[test]
    fn set_dispatches_known_keys() {
        let mut settings = Settings::default();
        settings.set("log_level", "DEBUG").expect("set log level");
        settings.set("connect_timeout_secs", "0").expect("set timeout");
        settings.set("access_token", "").expect("clear token");
        assert_eq!(settings.log_level(), "debug");
        assert_eq!(settings.connect_timeout_secs(), 1);
        assert_eq!(settings.access_token(), None);
    }

    #[test]
    fn redacted_masks_token() {
        let mut settings = Settings::default();
        settings.set_access_token("abcdefghijkl");
        assert_eq!(
            settings.redacted().access_token,
            Some("abcd...".to_string())
        );
    }
}
