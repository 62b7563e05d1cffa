//! Loading [`GuardConfig`] from YAML text, files and the environment.

use super::GuardConfig;
use crate::{Error, ErrorContext, Result};
use std::path::Path;
use tracing::info;

/// Environment variable naming a YAML config file.
pub const CONFIG_ENV_VAR: &str = "METERGUARD_CONFIG";

impl GuardConfig {
    /// Parse and validate a YAML document. Missing sections take defaults.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let text = yaml.strip_prefix('\u{feff}').unwrap_or(yaml);
        let config: GuardConfig = if text.trim().is_empty() {
            GuardConfig::default()
        } else {
            serde_yaml::from_str(text)?
        };
        config.validate()?;
        Ok(config)
    }

    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = tokio::fs::read_to_string(path).await.map_err(|e| {
            Error::configuration_with_context(
                format!("cannot read config file: {}", e),
                ErrorContext::new()
                    .with_details(path.to_string_lossy().to_string())
                    .with_source("config_loader"),
            )
        })?;
        let config = Self::from_yaml_str(&text)?;
        info!(path = %path.display(), "Loaded guard configuration");
        Ok(config)
    }

    /// Load from the file named by `METERGUARD_CONFIG`, or defaults when unset.
    pub async fn from_env() -> Result<Self> {
        match std::env::var(CONFIG_ENV_VAR) {
            Ok(path) if !path.trim().is_empty() => Self::from_path(path.trim()).await,
            _ => Ok(Self::default()),
        }
    }

    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_is_default() {
        assert_eq!(GuardConfig::from_yaml_str("").unwrap(), GuardConfig::default());
        assert_eq!(GuardConfig::from_yaml_str("\u{feff}\n").unwrap(), GuardConfig::default());
    }

    #[test]
    fn yaml_round_trip_keeps_values() {
        let mut cfg = GuardConfig::default();
        cfg.cache.key_prefix = "edge".into();
        let yaml = cfg.to_yaml().unwrap();
        assert!(yaml.contains("min_ttl_secs"));
        assert_eq!(GuardConfig::from_yaml_str(&yaml).unwrap(), cfg);
    }

    #[test]
    fn invalid_values_fail_validation() {
        let err = GuardConfig::from_yaml_str("cache:\n  min_ttl_secs: 0\n").unwrap_err();
        assert!(matches!(err, Error::Configuration { .. }));
    }

    #[tokio::test]
    async fn missing_file_is_a_configuration_error() {
        let err = GuardConfig::from_path("/nonexistent/meterguard.yaml")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Configuration { .. }));
    }
}
