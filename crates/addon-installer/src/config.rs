//! Installer configuration.
//!
//! Every field has a default, so an empty document is a valid config.
//!
//! ```toml
//! progress_interval_ms = 50
//! max_module_retries = 1
//! reserved_cache_entry = "work"
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::ConfigError;

pub const DEFAULT_PROGRESS_INTERVAL_MS: u64 = 50;
pub const DEFAULT_MAX_MODULE_RETRIES: u32 = 1;
pub const DEFAULT_RESERVED_CACHE_ENTRY: &str = "work";

/// Settings for an [`InstallManager`](crate::orchestrator::InstallManager).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InstallerConfig {
    /// Minimum spacing between relayed `downloadProgress` events per session.
    pub progress_interval_ms: u64,
    /// Passed through to the engine; this layer never retries on its own.
    pub max_module_retries: u32,
    /// Cache entry that uninstall leaves in place.
    pub reserved_cache_entry: String,
}

impl Default for InstallerConfig {
    fn default() -> Self {
        Self {
            progress_interval_ms: DEFAULT_PROGRESS_INTERVAL_MS,
            max_module_retries: DEFAULT_MAX_MODULE_RETRIES,
            reserved_cache_entry: DEFAULT_RESERVED_CACHE_ENTRY.to_string(),
        }
    }
}

impl InstallerConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(source).map_err(|e| ConfigError::Parse {
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Build from a JSON value (e.g. settings forwarded by the UI process).
    pub fn from_value(value: Value) -> Result<Self, ConfigError> {
        if !value.is_object() {
            return Err(ConfigError::Parse {
                message: "config must be a JSON object".into(),
            });
        }
        let config: Self = serde_json::from_value(value).map_err(|e| ConfigError::Parse {
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let reserved = &self.reserved_cache_entry;
        if reserved.is_empty() {
            return Err(ConfigError::Invalid {
                field: "reserved_cache_entry".into(),
                message: "must not be empty".into(),
            });
        }
        if reserved.contains('/') || reserved.contains('\\') || reserved == "." || reserved == ".." {
            return Err(ConfigError::Invalid {
                field: "reserved_cache_entry".into(),
                message: format!("{reserved:?} must be a single path component"),
            });
        }
        Ok(())
    }

    pub fn progress_interval(&self) -> Duration {
        Duration::from_millis(self.progress_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = InstallerConfig::default();
        assert_eq!(config.progress_interval(), Duration::from_millis(50));
        assert_eq!(config.max_module_retries, 1);
        assert_eq!(config.reserved_cache_entry, "work");
    }

    #[test]
    fn empty_toml_uses_defaults() {
        let config = InstallerConfig::from_toml_str("").unwrap();
        assert_eq!(config, InstallerConfig::default());
    }

    #[test]
    fn toml_overrides_fields() {
        let config = InstallerConfig::from_toml_str(
            r#"
            progress_interval_ms = 250
            max_module_retries = 3
            "#,
        )
        .unwrap();
        assert_eq!(config.progress_interval_ms, 250);
        assert_eq!(config.max_module_retries, 3);
        assert_eq!(config.reserved_cache_entry, "work");
    }

    #[test]
    fn malformed_toml_is_parse_error() {
        let err = InstallerConfig::from_toml_str("progress_interval_ms = \"fast\"").unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn reserved_entry_must_be_single_component() {
        let err = InstallerConfig::from_toml_str("reserved_cache_entry = \"a/b\"").unwrap_err();
        assert!(err.to_string().contains("reserved_cache_entry"));

        let err = InstallerConfig::from_toml_str("reserved_cache_entry = \"\"").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));
    }

    #[test]
    fn from_value_requires_object() {
        assert!(InstallerConfig::from_value(serde_json::json!([1, 2])).is_err());

        let config =
            InstallerConfig::from_value(serde_json::json!({"max_module_retries": 0})).unwrap();
        assert_eq!(config.max_module_retries, 0);
    }
}
