// ============================================================
// Layer 6: Configuration Store
// ============================================================
// Saves and restores the detector configuration as JSON.
//
// Every field of CtpnConfig has a default, so a partial file
// is enough:
//
//   { "backbone": "inception", "test": { "nms_threshold": 0.5 } }
//
// When the file does not exist the defaults are used. Whatever
// is loaded is validated before it is handed to a use case.
//
// Reference: serde_json documentation
//            Rust Book §9 (Error Handling)

use anyhow::{Context, Result};
use std::{fs, path::PathBuf};

use crate::domain::{config::CtpnConfig, traits::ConfigSource};

/// JSON file holding a CtpnConfig.
pub struct ConfigStore {
    path: Option<PathBuf>,
}

impl ConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: Some(path.into()) }
    }

    /// A store that always yields the built-in defaults.
    pub fn defaults() -> Self {
        Self { path: None }
    }

    /// Write `cfg` as pretty JSON, refusing invalid configurations.
    pub fn save(&self, cfg: &CtpnConfig) -> Result<()> {
        let path = self
            .path
            .as_ref()
            .context("Cannot save a configuration without a file path")?;
        cfg.validate()?;

        let json = serde_json::to_string_pretty(cfg)?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("Cannot create directory '{}'", parent.display()))?;
        }
        fs::write(path, json)
            .with_context(|| format!("Cannot write config to '{}'", path.display()))?;

        tracing::debug!("Saved config to '{}'", path.display());
        Ok(())
    }
}

impl ConfigSource for ConfigStore {
    fn load_config(&self) -> Result<CtpnConfig> {
        let cfg = match &self.path {
            Some(path) if path.exists() => {
                let json = fs::read_to_string(path)
                    .with_context(|| format!("Cannot read config from '{}'", path.display()))?;
                serde_json::from_str::<CtpnConfig>(&json)
                    .with_context(|| format!("Malformed config '{}'", path.display()))?
            }
            Some(path) => {
                tracing::warn!("Config '{}' not found, using defaults", path.display());
                CtpnConfig::default()
            }
            None => CtpnConfig::default(),
        };

        cfg.validate().context("Invalid configuration")?;
        Ok(cfg)
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::config::{BackboneKind, RegressionMode};

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("ctpn_cfg_{}_{name}.json", std::process::id()))
    }

    #[test]
    fn test_save_then_load() {
        let path = temp_path("save_then_load");
        let store = ConfigStore::new(&path);
        let cfg = CtpnConfig {
            backbone: BackboneKind::Inception,
            regression: RegressionMode::Full,
            ..Default::default()
        };

        store.save(&cfg).unwrap();
        let loaded = store.load_config().unwrap();
        fs::remove_file(&path).ok();

        assert_eq!(loaded, cfg);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let path = temp_path("partial");
        fs::write(&path, r#"{ "test": { "nms_threshold": 0.5 } }"#).unwrap();
        let loaded = ConfigStore::new(&path).load_config().unwrap();
        fs::remove_file(&path).ok();

        assert_eq!(loaded.test.nms_threshold, 0.5);
        assert_eq!(loaded.test.min_size, CtpnConfig::default().test.min_size);
        assert_eq!(loaded.anchor_heights.len(), 10);
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let loaded = ConfigStore::new(temp_path("missing")).load_config().unwrap();
        assert_eq!(loaded, CtpnConfig::default());
    }

    #[test]
    fn test_invalid_values_rejected() {
        let path = temp_path("invalid");
        fs::write(&path, r#"{ "num_classes": 3 }"#).unwrap();
        let result = ConfigStore::new(&path).load_config();
        fs::remove_file(&path).ok();
        assert!(result.is_err());
    }

    #[test]
    fn test_unknown_backbone_rejected() {
        let path = temp_path("backbone");
        fs::write(&path, r#"{ "backbone": "resnet" }"#).unwrap();
        let result = ConfigStore::new(&path).load_config();
        fs::remove_file(&path).ok();
        assert!(result.is_err());
    }

    #[test]
    fn test_defaults_store_cannot_save() {
        assert!(ConfigStore::defaults().save(&CtpnConfig::default()).is_err());
    }
}
