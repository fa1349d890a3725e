//! Setup directory persistence
//!
//! Publishing is two steps, in this order:
//! 1. Write the payload to `<output>/<id>` (create-new, synced, closed)
//! 2. Replace `<output>/version` with `<id>` (temp file + rename)
//!
//! A reader polling `version` therefore never sees an identifier whose
//! artifact is missing or incomplete. A failed step 1 may leave an orphaned
//! artifact behind; it is never referenced by the marker.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use crate::ident::{ContentId, IdError};

/// Name of the current-version marker file
pub const VERSION_MARKER: &str = "version";

/// Errors for store operations
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("cannot create output directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("artifact already exists: {path}")]
    ArtifactExists { path: PathBuf },

    #[error("cannot create artifact {path}: {source}")]
    CreateArtifact {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("cannot write artifact {path}: {source}")]
    WriteArtifact {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("cannot write version marker {path}: {source}")]
    WriteMarker {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("cannot read version marker {path}: {source}")]
    ReadMarker {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("version marker {path} is invalid: {source}")]
    InvalidMarker {
        path: PathBuf,
        #[source]
        source: IdError,
    },
}

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Output directory holding artifacts and the version marker
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create the output directory (and parents) if missing
    pub fn ensure_root(&self) -> StoreResult<()> {
        fs::create_dir_all(&self.root).map_err(|source| StoreError::CreateDir {
            path: self.root.clone(),
            source,
        })
    }

    pub fn artifact_path(&self, id: &ContentId) -> PathBuf {
        self.root.join(id.as_str())
    }

    pub fn marker_path(&self) -> PathBuf {
        self.root.join(VERSION_MARKER)
    }

    fn marker_temp_path(&self) -> PathBuf {
        self.root.join(format!(".{}.tmp", VERSION_MARKER))
    }

    /// Write `payload` to a new file named by `id`
    ///
    /// Fails if the file already exists: two runs producing the same
    /// identifier must not overwrite one another.
    pub fn write_artifact(&self, id: &ContentId, payload: &[u8]) -> StoreResult<PathBuf> {
        let path = self.artifact_path(id);

        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(|source| {
                if source.kind() == io::ErrorKind::AlreadyExists {
                    StoreError::ArtifactExists { path: path.clone() }
                } else {
                    StoreError::CreateArtifact {
                        path: path.clone(),
                        source,
                    }
                }
            })?;

        write_synced(&mut file, payload).map_err(|source| StoreError::WriteArtifact {
            path: path.clone(),
            source,
        })?;

        tracing::debug!(path = %path.display(), bytes = payload.len(), "artifact written");
        Ok(path)
    }

    /// Atomically replace the version marker with `id`
    pub fn write_marker(&self, id: &ContentId) -> StoreResult<PathBuf> {
        let final_path = self.marker_path();
        let temp_path = self.marker_temp_path();

        let result = File::create(&temp_path)
            .and_then(|mut file| write_synced(&mut file, id.as_str().as_bytes()))
            .and_then(|()| fs::rename(&temp_path, &final_path));

        if let Err(source) = result {
            let _ = fs::remove_file(&temp_path);
            return Err(StoreError::WriteMarker {
                path: final_path,
                source,
            });
        }

        tracing::debug!(path = %final_path.display(), id = %id, "version marker updated");
        Ok(final_path)
    }

    /// Identifier currently named by the version marker, if any
    pub fn current_version(&self) -> StoreResult<Option<ContentId>> {
        let path = self.marker_path();
        let contents = match fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(StoreError::ReadMarker { path, source }),
        };

        ContentId::parse(&contents)
            .map(Some)
            .map_err(|source| StoreError::InvalidMarker { path, source })
    }
}

/// Write all bytes and flush them to disk before the handle is dropped
fn write_synced(file: &mut File, bytes: &[u8]) -> io::Result<()> {
    file.write_all(bytes)?;
    file.flush()?;
    file.sync_all()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use tempfile::TempDir;

    fn id(ms: i64, payload: &[u8]) -> ContentId {
        ContentId::derive(Utc.timestamp_millis_opt(ms).unwrap(), payload, 4)
    }

    fn publish(store: &ArtifactStore, id: &ContentId, payload: &[u8]) {
        store.write_artifact(id, payload).unwrap();
        store.write_marker(id).unwrap();
    }

    #[test]
    fn test_write_artifact_then_marker() {
        let dir = TempDir::new().unwrap();
        let store = ArtifactStore::new(dir.path().to_path_buf());
        let payload = b"compressed bytes".to_vec();
        let id = id(1_700_000_000_000, &payload);

        let artifact_path = store.write_artifact(&id, &payload).unwrap();
        assert_eq!(artifact_path, dir.path().join(id.as_str()));
        assert_eq!(fs::read(&artifact_path).unwrap(), payload);
        assert_eq!(store.current_version().unwrap(), None);

        let marker_path = store.write_marker(&id).unwrap();
        assert_eq!(fs::read_to_string(&marker_path).unwrap(), id.as_str());
        assert!(!dir.path().join(".version.tmp").exists());
    }

    #[test]
    fn test_marker_replaced_and_old_artifacts_kept() {
        let dir = TempDir::new().unwrap();
        let store = ArtifactStore::new(dir.path().to_path_buf());

        let first = id(1_700_000_000_000, b"one");
        let second = id(1_700_000_000_500, b"two");
        publish(&store, &first, b"one");
        publish(&store, &second, b"two");

        assert_eq!(store.current_version().unwrap(), Some(second.clone()));
        assert!(store.artifact_path(&first).exists());
        assert!(store.artifact_path(&second).exists());
    }

    #[test]
    fn test_existing_artifact_not_overwritten() {
        let dir = TempDir::new().unwrap();
        let store = ArtifactStore::new(dir.path().to_path_buf());
        let id = id(1_700_000_000_000, b"same");

        publish(&store, &id, b"same");
        let err = store.write_artifact(&id, b"different").unwrap_err();

        assert!(matches!(err, StoreError::ArtifactExists { .. }));
        assert_eq!(fs::read(store.artifact_path(&id)).unwrap(), b"same");
    }

    #[test]
    fn test_write_artifact_without_root() {
        let dir = TempDir::new().unwrap();
        let store = ArtifactStore::new(dir.path().join("missing"));
        let id = id(1_700_000_000_000, b"payload");

        let err = store.write_artifact(&id, b"payload").unwrap_err();

        assert!(matches!(err, StoreError::CreateArtifact { .. }));
        assert!(err.to_string().contains("missing"));
        assert!(!store.root().exists());
    }

    #[test]
    fn test_current_version_absent() {
        let dir = TempDir::new().unwrap();
        let store = ArtifactStore::new(dir.path().to_path_buf());
        assert_eq!(store.current_version().unwrap(), None);
    }

    #[test]
    fn test_current_version_invalid() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(VERSION_MARKER), "not an id").unwrap();
        let store = ArtifactStore::new(dir.path().to_path_buf());

        let err = store.current_version().unwrap_err();
        assert!(matches!(err, StoreError::InvalidMarker { .. }));
    }

    #[test]
    fn test_ensure_root_creates_parents() {
        let dir = TempDir::new().unwrap();
        let store = ArtifactStore::new(dir.path().join("a/b/setup"));
        store.ensure_root().unwrap();
        assert!(store.root().is_dir());
        store.ensure_root().unwrap();
    }
}
