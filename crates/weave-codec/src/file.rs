use std::fs;
use std::path::Path;
use std::sync::Arc;

use bytes::{Buf, BufMut};
use tracing::debug;
use weave_graph::{Graph, Snapshot};
use weave_schema::ClassRegistry;
use weave_types::FourCc;

use crate::binary::{decode_backend, encode_backend};
use crate::error::{SnapshotError, SnapshotResult};

/// Tagged, checksummed snapshot file.
///
/// On-disk format (integers big-endian):
/// ```text
/// [4 bytes: magic "WEAV"]
/// [4 bytes: vendor tag]
/// [4 bytes: format tag]
/// [2 bytes: version length][N bytes: schema version, UTF-8]
/// [4 bytes: payload length]
/// [4 bytes: CRC32 of payload]
/// [payload: bincode-encoded snapshot]
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SnapshotFile {
    pub vendor: FourCc,
    pub format: FourCc,
}

impl SnapshotFile {
    pub const MAGIC: FourCc = FourCc::new(b"WEAV");

    pub fn new(vendor: FourCc, format: FourCc) -> Self {
        Self { vendor, format }
    }

    pub fn encode(&self, snapshot: &Snapshot) -> SnapshotResult<Vec<u8>> {
        let payload = encode_backend(snapshot)?;
        let version = snapshot.version.as_bytes();
        let version_len =
            u16::try_from(version.len()).map_err(|_| SnapshotError::VersionMismatch {
                expected: "a version under 64 KiB".into(),
                found: format!("{} bytes", version.len()),
            })?;
        let mut buf = Vec::with_capacity(24 + version.len() + payload.len());
        buf.put_slice(Self::MAGIC.as_bytes());
        buf.put_slice(self.vendor.as_bytes());
        buf.put_slice(self.format.as_bytes());
        buf.put_u16(version_len);
        buf.put_slice(version);
        buf.put_u32(payload.len() as u32);
        buf.put_u32(crc32fast::hash(&payload));
        buf.put_slice(&payload);
        Ok(buf)
    }

    /// Decode and validate a snapshot file image against the expected
    /// schema version.
    pub fn decode(&self, data: &[u8], expected_version: &str) -> SnapshotResult<Snapshot> {
        let mut buf = data;
        let magic = take_fourcc(&mut buf)?;
        if magic != Self::MAGIC {
            return Err(SnapshotError::BadMagic);
        }
        let vendor = take_fourcc(&mut buf)?;
        let format = take_fourcc(&mut buf)?;
        if vendor != self.vendor || format != self.format {
            return Err(SnapshotError::TagMismatch {
                expected: format!("{}/{}", self.vendor, self.format),
                found: format!("{vendor}/{format}"),
            });
        }
        if buf.remaining() < 2 {
            return Err(SnapshotError::Truncated);
        }
        let version_len = buf.get_u16() as usize;
        if buf.remaining() < version_len {
            return Err(SnapshotError::Truncated);
        }
        let version = String::from_utf8_lossy(&buf[..version_len]).into_owned();
        buf.advance(version_len);
        if version != expected_version {
            return Err(SnapshotError::VersionMismatch {
                expected: expected_version.to_string(),
                found: version,
            });
        }
        if buf.remaining() < 8 {
            return Err(SnapshotError::Truncated);
        }
        let len = buf.get_u32() as usize;
        let stored = buf.get_u32();
        if buf.remaining() < len {
            return Err(SnapshotError::Truncated);
        }
        let payload = &buf[..len];
        let computed = crc32fast::hash(payload);
        if computed != stored {
            return Err(SnapshotError::Checksum { stored, computed });
        }
        Ok(decode_backend(payload)?)
    }

    /// Write atomically: the image goes to a sibling file renamed over
    /// `path`.
    pub fn write(&self, path: &Path, snapshot: &Snapshot) -> SnapshotResult<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let image = self.encode(snapshot)?;
        let staging = path.with_extension("partial");
        fs::write(&staging, &image)?;
        fs::rename(&staging, path)?;
        debug!(path = %path.display(), bytes = image.len(), "snapshot written");
        Ok(())
    }

    pub fn read(&self, path: &Path, expected_version: &str) -> SnapshotResult<Snapshot> {
        let data = fs::read(path)?;
        self.decode(&data, expected_version)
    }

    /// Save the committed baseline of `graph`.
    pub fn save(&self, path: &Path, graph: &Graph) -> SnapshotResult<()> {
        self.write(path, &graph.snapshot())
    }

    /// Load a document saved with [`SnapshotFile::save`].
    pub fn load(&self, path: &Path, registry: Arc<ClassRegistry>, actor: u32) -> SnapshotResult<Graph> {
        let snapshot = self.read(path, registry.version())?;
        Ok(Graph::from_snapshot(registry, actor, &snapshot)?)
    }
}

fn take_fourcc(buf: &mut &[u8]) -> SnapshotResult<FourCc> {
    if buf.remaining() < 4 {
        return Err(SnapshotError::Truncated);
    }
    let mut code = [0u8; 4];
    buf.copy_to_slice(&mut code);
    Ok(FourCc::new(&code))
}
