use std::fs;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use tracing::{debug, warn};

use crate::error::{HistoryError, HistoryResult};
use crate::history::HistoryState;

/// Persistence boundary for undo histories.
pub trait HistoryStore: Send + Sync {
    /// The saved history, or `None` when nothing was saved yet.
    fn load(&self) -> HistoryResult<Option<HistoryState>>;

    fn save(&self, state: &HistoryState) -> HistoryResult<()>;
}

/// In-memory store for tests and embedding.
#[derive(Default)]
pub struct MemoryHistoryStore {
    inner: RwLock<Option<HistoryState>>,
}

impl MemoryHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl HistoryStore for MemoryHistoryStore {
    fn load(&self) -> HistoryResult<Option<HistoryState>> {
        let guard = self.inner.read().map_err(|_| HistoryError::Corrupt("lock poisoned".into()))?;
        Ok(guard.clone())
    }

    fn save(&self, state: &HistoryState) -> HistoryResult<()> {
        let mut guard =
            self.inner.write().map_err(|_| HistoryError::Corrupt("lock poisoned".into()))?;
        *guard = Some(state.clone());
        Ok(())
    }
}

const MAGIC: &[u8; 4] = b"WHST";

/// Header size: magic, payload length, CRC32 of payload.
const HEADER_SIZE: usize = 12;

/// Single-file history store.
///
/// On-disk format:
/// ```text
/// [4 bytes: magic "WHST"]
/// [4 bytes: payload length (little-endian u32)]
/// [4 bytes: CRC32 of payload (little-endian u32)]
/// [N bytes: payload (bincode-serialized (schema version, HistoryState))]
/// ```
pub struct FileHistoryStore {
    path: PathBuf,
    version: String,
}

impl FileHistoryStore {
    /// A store at `path` for histories of documents with schema `version`.
    pub fn new(path: &Path, version: impl Into<String>) -> Self {
        Self { path: path.to_path_buf(), version: version.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl HistoryStore for FileHistoryStore {
    fn load(&self) -> HistoryResult<Option<HistoryState>> {
        let data = match fs::read(&self.path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        if data.len() < HEADER_SIZE || &data[0..4] != MAGIC {
            return Err(HistoryError::Corrupt("bad header".into()));
        }
        let len = u32::from_le_bytes([data[4], data[5], data[6], data[7]]) as usize;
        let stored = u32::from_le_bytes([data[8], data[9], data[10], data[11]]);
        let Some(payload) = data.get(HEADER_SIZE..HEADER_SIZE + len) else {
            warn!(path = %self.path.display(), "truncated history file");
            return Err(HistoryError::Corrupt("truncated".into()));
        };
        let computed = crc32fast::hash(payload);
        if computed != stored {
            warn!(path = %self.path.display(), stored, computed, "history CRC mismatch");
            return Err(HistoryError::Corrupt(format!(
                "crc mismatch: stored {stored:08x}, computed {computed:08x}"
            )));
        }
        let (version, state): (String, HistoryState) = bincode::deserialize(payload)
            .map_err(|e| HistoryError::Serialization(e.to_string()))?;
        if version != self.version {
            return Err(HistoryError::VersionMismatch { expected: self.version.clone(), found: version });
        }
        debug!(steps = state.steps.len(), "history loaded");
        Ok(Some(state))
    }

    fn save(&self, state: &HistoryState) -> HistoryResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let payload = bincode::serialize(&(&self.version, state))
            .map_err(|e| HistoryError::Serialization(e.to_string()))?;
        let mut buf = Vec::with_capacity(HEADER_SIZE + payload.len());
        buf.extend_from_slice(MAGIC);
        buf.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        buf.extend_from_slice(&crc32fast::hash(&payload).to_le_bytes());
        buf.extend_from_slice(&payload);
        let staging = self.path.with_extension("partial");
        fs::write(&staging, &buf)?;
        fs::rename(&staging, &self.path)?;
        debug!(steps = state.steps.len(), bytes = buf.len(), "history saved");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use weave_tx::{OpFlags, Opcode, Operation, Transaction};
    use weave_types::{Ref, TxId};

    fn state() -> HistoryState {
        let mut tx = Transaction::from_opcodes(vec![Opcode::new(
            Ref::new(0, 2),
            OpFlags::HISTORY,
            Operation::IntSet { old: 0, new: 1 },
        )]);
        tx.set_id(TxId::new(1, 1, 1));
        tx.set_label("one");
        HistoryState { steps: vec![tx.clone(), tx], first_redo: 1 }
    }

    #[test]
    fn memory_store_roundtrip() {
        let store = MemoryHistoryStore::new();
        assert_eq!(store.load().unwrap(), None);
        store.save(&state()).unwrap();
        assert_eq!(store.load().unwrap(), Some(state()));
    }

    #[test]
    fn file_store_reloads_steps() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("undo.hist");
        let store = FileHistoryStore::new(&path, "s.1");
        assert_eq!(store.load().unwrap(), None);
        store.save(&state()).unwrap();
        let reopened = FileHistoryStore::new(&path, "s.1");
        assert_eq!(reopened.load().unwrap(), Some(state()));
    }

    #[test]
    fn file_store_checks_version() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("undo.hist");
        FileHistoryStore::new(&path, "s.1").save(&state()).unwrap();
        let err = FileHistoryStore::new(&path, "s.2").load().unwrap_err();
        assert!(matches!(err, HistoryError::VersionMismatch { .. }));
    }

    #[test]
    fn file_store_detects_corruption() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("undo.hist");
        FileHistoryStore::new(&path, "s.1").save(&state()).unwrap();
        let mut data = fs::read(&path).unwrap();
        let last = data.len() - 1;
        data[last] ^= 0x55;
        fs::write(&path, &data).unwrap();
        let err = FileHistoryStore::new(&path, "s.1").load().unwrap_err();
        assert!(matches!(err, HistoryError::Corrupt(_)));

        fs::write(&path, &data[..HEADER_SIZE + 2]).unwrap();
        assert!(matches!(FileHistoryStore::new(&path, "s.1").load(), Err(HistoryError::Corrupt(_))));
    }
}
