use std::fmt;
use std::fs;
use std::path::Path;

use scene::MapSnapshot;
use serde::{Deserialize, Serialize};
use tracing::debug;

pub const SNAPSHOT_FILE_VERSION: &str = "1.0";

/// A persisted [`MapSnapshot`] with a content hash over its JSON form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotFile {
    pub version: String,
    pub content_hash: String,
    pub snapshot: MapSnapshot,
}

#[derive(Debug)]
pub enum SnapshotFileError {
    Io(std::io::Error),
    Parse(serde_json::Error),
    UnsupportedVersion { found: String },
    HashMismatch { expected: String, found: String },
}

impl fmt::Display for SnapshotFileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SnapshotFileError::Io(err) => write!(f, "I/O error: {err}"),
            SnapshotFileError::Parse(err) => write!(f, "Snapshot parse error: {err}"),
            SnapshotFileError::UnsupportedVersion { found } => {
                write!(f, "Unsupported snapshot version: {found}")
            }
            SnapshotFileError::HashMismatch { expected, found } => {
                write!(f, "Snapshot hash mismatch: expected {expected}, found {found}")
            }
        }
    }
}

impl std::error::Error for SnapshotFileError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SnapshotFileError::Io(err) => Some(err),
            SnapshotFileError::Parse(err) => Some(err),
            _ => None,
        }
    }
}

/// blake3 over the snapshot's compact JSON.
pub fn snapshot_hash(snapshot: &MapSnapshot) -> Result<String, serde_json::Error> {
    let bytes = serde_json::to_vec(snapshot)?;
    Ok(blake3::hash(&bytes).to_hex().to_string())
}

impl SnapshotFile {
    pub fn new(snapshot: MapSnapshot) -> Result<Self, SnapshotFileError> {
        let content_hash = snapshot_hash(&snapshot).map_err(SnapshotFileError::Parse)?;
        Ok(Self {
            version: SNAPSHOT_FILE_VERSION.to_string(),
            content_hash,
            snapshot,
        })
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), SnapshotFileError> {
        let path = path.as_ref();
        let payload = serde_json::to_string_pretty(self).map_err(SnapshotFileError::Parse)?;
        fs::write(path, payload).map_err(SnapshotFileError::Io)?;
        debug!("saved snapshot {} to {}", self.content_hash, path.display());
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, SnapshotFileError> {
        let payload = fs::read_to_string(path.as_ref()).map_err(SnapshotFileError::Io)?;
        let file: SnapshotFile =
            serde_json::from_str(&payload).map_err(SnapshotFileError::Parse)?;

        if file.version != SNAPSHOT_FILE_VERSION {
            return Err(SnapshotFileError::UnsupportedVersion {
                found: file.version,
            });
        }

        let found = snapshot_hash(&file.snapshot).map_err(SnapshotFileError::Parse)?;
        if found != file.content_hash {
            return Err(SnapshotFileError::HashMismatch {
                expected: file.content_hash,
                found,
            });
        }

        Ok(file)
    }

    pub fn into_snapshot(self) -> MapSnapshot {
        self.snapshot
    }
}
