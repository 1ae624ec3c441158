use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{GreenlightError, Result};

/// Configuration for the confirmation engine.
///
/// Loaded from a TOML file. All fields have defaults so a missing or
/// partial file still yields a working configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Default preview TTL in seconds (how long a user may take to confirm).
    pub default_ttl_seconds: u64,
    /// Per-action-type TTL overrides, keyed by `action_type`.
    pub ttl_overrides: HashMap<String, u64>,
    /// How long a claimed execution may run before the reaper recovers it.
    /// Deliberately shorter than the preview TTL.
    pub execution_timeout_seconds: u64,
    /// Maximum length of a stored preview summary, in characters.
    pub preview_max_chars: usize,
    /// Session pointers older than this are ignored by the resolution gate.
    /// `None` disables the staleness check.
    pub pointer_max_age_seconds: Option<u64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_ttl_seconds: 7200,
            ttl_overrides: HashMap::new(),
            execution_timeout_seconds: 300,
            preview_max_chars: 200,
            pointer_max_age_seconds: None,
        }
    }
}

impl EngineConfig {
    /// Load configuration from a TOML file.
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: EngineConfig = toml::from_str(&content)?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Load configuration from a TOML file, falling back to defaults if the
    /// file does not exist or cannot be parsed.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(
                    "Failed to load config from {}: {}. Using defaults.",
                    path.display(),
                    e
                );
                Self::default()
            }
        }
    }

    /// Save the current configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| GreenlightError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        info!("Configuration saved to {}", path.display());
        Ok(())
    }

    /// TTL in seconds for the given action type.
    pub fn ttl_for(&self, action_type: &str) -> u64 {
        self.ttl_overrides
            .get(action_type)
            .copied()
            .unwrap_or(self.default_ttl_seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.default_ttl_seconds, 7200);
        assert_eq!(config.execution_timeout_seconds, 300);
        assert_eq!(config.preview_max_chars, 200);
        assert!(config.ttl_overrides.is_empty());
        assert!(config.pointer_max_age_seconds.is_none());
    }

    #[test]
    fn test_ttl_for_uses_override() {
        let mut config = EngineConfig::default();
        config.ttl_overrides.insert("payment".to_string(), 600);
        assert_eq!(config.ttl_for("payment"), 600);
        assert_eq!(config.ttl_for("message"), 7200);
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("greenlight.toml");

        let mut config = EngineConfig::default();
        config.default_ttl_seconds = 3600;
        config.ttl_overrides.insert("filing".to_string(), 900);
        config.pointer_max_age_seconds = Some(1800);
        config.save(&path).unwrap();

        let loaded = EngineConfig::load(&path).unwrap();
        assert_eq!(loaded.default_ttl_seconds, 3600);
        assert_eq!(loaded.ttl_for("filing"), 900);
        assert_eq!(loaded.pointer_max_age_seconds, Some(1800));
    }

    #[test]
    fn test_load_missing_file_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nope.toml");
        assert!(EngineConfig::load(&path).is_err());
    }

    #[test]
    fn test_load_or_default_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nope.toml");
        let config = EngineConfig::load_or_default(&path);
        assert_eq!(config.default_ttl_seconds, 7200);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("partial.toml");
        std::fs::write(&path, "default_ttl_seconds = 60\n").unwrap();

        let config = EngineConfig::load(&path).unwrap();
        assert_eq!(config.default_ttl_seconds, 60);
        assert_eq!(config.execution_timeout_seconds, 300);
    }
}
