use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use weave_codec::SnapshotFile;
use weave_types::FourCc;

use crate::error::{DocumentError, DocumentResult};

/// Settings of an editing session.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Identity of the editing user, stamped on every transaction.
    pub user_id: u64,
    /// Replica id. Must be unique among connected peers; actor 0 is
    /// reserved for the root object.
    pub actor: u32,
    pub connect_timeout_ms: u64,
    pub pull_interval_ms: u64,
    /// Snapshot file tags.
    pub vendor: String,
    pub format: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            user_id: 1,
            actor: 1,
            connect_timeout_ms: 2_000,
            pull_interval_ms: 20,
            vendor: "weav".into(),
            format: "doc1".into(),
        }
    }
}

impl EngineConfig {
    pub fn from_toml_str(s: &str) -> DocumentResult<Self> {
        let config: Self = toml::from_str(s).map_err(|e| DocumentError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> DocumentResult<Self> {
        Self::from_toml_str(&std::fs::read_to_string(path)?)
    }

    pub fn validate(&self) -> DocumentResult<()> {
        if self.actor == 0 {
            return Err(DocumentError::Config("actor 0 is reserved".into()));
        }
        self.file_tags().map(|_| ())
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn pull_interval(&self) -> Duration {
        Duration::from_millis(self.pull_interval_ms)
    }

    pub fn file_tags(&self) -> DocumentResult<SnapshotFile> {
        let tag = |s: &str| FourCc::parse(s).map_err(|e| DocumentError::Config(e.to_string()));
        Ok(SnapshotFile::new(tag(&self.vendor)?, tag(&self.format)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let c = EngineConfig::default();
        assert_eq!(c.connect_timeout(), Duration::from_secs(2));
        assert_eq!(c.pull_interval(), Duration::from_millis(20));
        assert!(c.validate().is_ok());
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let c = EngineConfig::from_toml_str("user_id = 42\nactor = 7\n").unwrap();
        assert_eq!(c.user_id, 42);
        assert_eq!(c.actor, 7);
        assert_eq!(c.pull_interval_ms, 20);
    }

    #[test]
    fn reserved_actor_is_rejected() {
        assert!(matches!(EngineConfig::from_toml_str("actor = 0"), Err(DocumentError::Config(_))));
    }

    #[test]
    fn bad_tag_is_rejected() {
        assert!(EngineConfig::from_toml_str("vendor = \"toolong\"").is_err());
    }

    #[test]
    fn load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.toml");
        std::fs::write(&path, "user_id = 3\npull_interval_ms = 5\n").unwrap();
        let c = EngineConfig::load(&path).unwrap();
        assert_eq!(c.user_id, 3);
        assert_eq!(c.pull_interval(), Duration::from_millis(5));
    }
}
