use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use weave_codec::SnapshotFile;
use weave_types::FourCc;

use crate::error::{TransportError, TransportResult};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    /// Where the document is loaded from and autosaved to. `None` keeps it
    /// in memory only.
    pub snapshot_path: Option<PathBuf>,
    pub autosave_interval_ms: u64,
    pub max_connections: usize,
    pub vendor: String,
    pub format: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 7447)),
            snapshot_path: None,
            autosave_interval_ms: 5_000,
            max_connections: 64,
            vendor: "weav".into(),
            format: "doc1".into(),
        }
    }
}

impl ServerConfig {
    pub fn from_toml_str(s: &str) -> TransportResult<Self> {
        let config: Self = toml::from_str(s).map_err(|e| TransportError::Config(e.to_string()))?;
        config.file_tags()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> TransportResult<Self> {
        Self::from_toml_str(&std::fs::read_to_string(path)?)
    }

    pub fn autosave_interval(&self) -> Duration {
        Duration::from_millis(self.autosave_interval_ms.max(1))
    }

    pub fn file_tags(&self) -> TransportResult<SnapshotFile> {
        let tag = |s: &str| FourCc::parse(s).map_err(|e| TransportError::Config(e.to_string()));
        Ok(SnapshotFile::new(tag(&self.vendor)?, tag(&self.format)?))
    }
}
