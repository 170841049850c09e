use crate::StorageError;
use directories::ProjectDirs;
use scanlate_core::EngineConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

const CONFIG_SCHEMA_VERSION: u32 = 1;

/// Engine configuration stored as `config.json` under a data directory
#[derive(Debug, Clone)]
pub struct ConfigStore {
    root: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ConfigEnvelope {
    version: u32,
    config: EngineConfig,
}

impl ConfigStore {
    pub fn from_default_project() -> Result<Self, StorageError> {
        let dirs = ProjectDirs::from("dev", "Scanlate", "Scanlate")
            .ok_or(StorageError::NoDataDirectory)?;

        Ok(Self { root: dirs.data_local_dir().to_path_buf() })
    }

    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config_path(&self) -> PathBuf {
        self.root.join("config.json")
    }

    /// Load the stored configuration, or the defaults when none is stored
    pub fn load(&self) -> Result<EngineConfig, StorageError> {
        let path = self.config_path();
        if !path.exists() {
            return Ok(EngineConfig::default());
        }

        let bytes = fs::read(&path)?;
        let envelope: ConfigEnvelope = serde_json::from_slice(&bytes)?;
        if envelope.version > CONFIG_SCHEMA_VERSION {
            tracing::warn!(
                version = envelope.version,
                supported = CONFIG_SCHEMA_VERSION,
                "config was written by a newer version"
            );
        }

        Ok(envelope.config)
    }

    pub fn save(&self, config: &EngineConfig) -> Result<(), StorageError> {
        fs::create_dir_all(&self.root)?;

        let envelope = ConfigEnvelope { version: CONFIG_SCHEMA_VERSION, config: config.clone() };

        let bytes = serde_json::to_vec_pretty(&envelope)?;
        fs::write(self.config_path(), bytes)?;
        tracing::info!(path = %self.config_path().display(), "saved engine config");
        Ok(())
    }

    /// Delete the stored configuration. Returns `true` if one existed.
    pub fn reset(&self) -> Result<bool, StorageError> {
        match fs::remove_file(self.config_path()) {
            Ok(()) => Ok(true),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(error) => Err(error.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn config_round_trip() {
        let temp = tempfile::tempdir().expect("temp dir should be created");
        let store = ConfigStore::with_root(temp.path());

        let config = EngineConfig::new()
            .with_iou_threshold(0.65)
            .with_merge_window(Duration::from_millis(400))
            .with_default_profile("CJK");

        store.save(&config).expect("save should succeed");
        let loaded = store.load().expect("load should succeed");

        assert_eq!(loaded, config);
    }

    #[test]
    fn load_defaults_when_file_absent() {
        let temp = tempfile::tempdir().expect("temp dir should be created");
        let store = ConfigStore::with_root(temp.path());

        let loaded = store.load().expect("load should succeed");
        assert_eq!(loaded, EngineConfig::default());
    }

    #[test]
    fn envelope_is_versioned() {
        let temp = tempfile::tempdir().expect("temp dir should be created");
        let store = ConfigStore::with_root(temp.path());
        store.save(&EngineConfig::default()).expect("save should succeed");

        let raw = fs::read_to_string(store.config_path()).expect("config file should exist");
        let value: serde_json::Value = serde_json::from_str(&raw).expect("valid json");
        assert_eq!(value["version"], 1);
        assert_eq!(value["config"]["merge"]["iou_threshold"], 0.5);
    }

    #[test]
    fn partial_config_uses_defaults() {
        let temp = tempfile::tempdir().expect("temp dir should be created");
        let store = ConfigStore::with_root(temp.path());
        fs::write(store.config_path(), r#"{"version":1,"config":{"history":{"max_depth":3}}}"#)
            .expect("write should succeed");

        let loaded = store.load().expect("load should succeed");
        assert_eq!(loaded.history.max_depth, 3);
        assert_eq!(loaded.history.merge_window_ms, 1000);
        assert_eq!(loaded.merge, EngineConfig::default().merge);
    }

    #[test]
    fn reset_removes_stored_config() {
        let temp = tempfile::tempdir().expect("temp dir should be created");
        let store = ConfigStore::with_root(temp.path());
        assert!(!store.reset().expect("reset should succeed"));

        store.save(&EngineConfig::new().with_max_history_depth(5)).expect("save should succeed");
        assert!(store.reset().expect("reset should succeed"));
        assert_eq!(store.load().expect("load should succeed"), EngineConfig::default());
    }
}
