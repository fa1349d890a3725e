//! Staging tree archival
//!
//! Serializes a staging directory into a tar stream. Entries are collected
//! up front in component-wise lexical order, then file contents are streamed
//! straight into the destination writer, so a compressor can sit behind it
//! without the uncompressed archive ever being held in memory.

mod entry;

pub use entry::{content_bytes, ArchiveEntry, EntryType};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, File, Metadata};
use std::io::{self, Write};
use std::path::{Component, Path, PathBuf};
use std::time::UNIX_EPOCH;
use tar::{Builder, Header};
use walkdir::WalkDir;

/// How entry modification times are recorded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MtimePolicy {
    /// Record each entry's filesystem modification time
    #[default]
    Preserve,
    /// Record every entry at the Unix epoch
    Epoch,
}

/// Errors for archival operations
#[derive(Debug, thiserror::Error)]
pub enum BundleError {
    #[error("staging directory not found: {path}")]
    StagingMissing { path: PathBuf },

    #[error("staging path is not a directory: {path}")]
    StagingNotDirectory { path: PathBuf },

    #[error("staging directory is empty: {path}")]
    StagingEmpty { path: PathBuf },

    #[error("cannot read staging directory {path}: {source}")]
    StagingUnreadable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("walk error: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("cannot read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("cannot archive {path}: {source}")]
    Archive {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("symlink escapes staging root: {path}")]
    SymlinkEscapesRoot { path: PathBuf },

    #[error("unsupported file type: {path}")]
    Unsupported { path: PathBuf },
}

impl BundleError {
    /// True when the staging directory itself is unusable, as opposed to
    /// something beneath it
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            BundleError::StagingMissing { .. }
                | BundleError::StagingNotDirectory { .. }
                | BundleError::StagingEmpty { .. }
                | BundleError::StagingUnreadable { .. }
        )
    }
}

/// Archive builder for a staging directory
#[derive(Debug, Clone)]
pub struct Bundler {
    /// Staging root
    root: PathBuf,
    /// Modification time policy
    mtime: MtimePolicy,
}

impl Bundler {
    /// Create a new bundler for the given staging root
    pub fn new(root: PathBuf) -> Self {
        Self {
            root,
            mtime: MtimePolicy::default(),
        }
    }

    /// Set the modification time policy
    pub fn with_mtime(mut self, mtime: MtimePolicy) -> Self {
        self.mtime = mtime;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Check that the staging root exists, is a directory and is not empty
    pub fn check(&self) -> Result<(), BundleError> {
        let metadata = match fs::metadata(&self.root) {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(BundleError::StagingMissing {
                    path: self.root.clone(),
                });
            }
            Err(source) => {
                return Err(BundleError::StagingUnreadable {
                    path: self.root.clone(),
                    source,
                });
            }
        };

        if !metadata.is_dir() {
            return Err(BundleError::StagingNotDirectory {
                path: self.root.clone(),
            });
        }

        let mut listing = fs::read_dir(&self.root).map_err(|source| {
            BundleError::StagingUnreadable {
                path: self.root.clone(),
                source,
            }
        })?;

        match listing.next() {
            None => Err(BundleError::StagingEmpty {
                path: self.root.clone(),
            }),
            Some(Err(source)) => Err(BundleError::StagingUnreadable {
                path: self.root.clone(),
                source,
            }),
            Some(Ok(_)) => Ok(()),
        }
    }

    /// Collect every entry beneath the root, keyed by relative path
    fn collect_entries(&self) -> Result<BTreeMap<PathBuf, EntryInfo>, BundleError> {
        let canonical_root = self.root.canonicalize().map_err(|source| {
            BundleError::StagingUnreadable {
                path: self.root.clone(),
                source,
            }
        })?;

        let mut entries = BTreeMap::new();

        for entry in WalkDir::new(&self.root)
            .follow_links(false)
            .sort_by(|a, b| a.file_name().cmp(b.file_name()))
        {
            let entry = entry?;
            let path = entry.path();

            let rel_path = match path.strip_prefix(&self.root) {
                Ok(rel) if !rel.as_os_str().is_empty() => rel.to_path_buf(),
                _ => continue,
            };

            let metadata = entry.metadata()?;
            let file_type = entry.file_type();

            let info = if file_type.is_symlink() {
                let target = fs::read_link(path).map_err(|source| BundleError::Read {
                    path: path.to_path_buf(),
                    source,
                })?;

                let resolved = if target.is_absolute() {
                    target.clone()
                } else {
                    path.parent().unwrap_or(path).join(&target)
                };
                let canonical = resolved
                    .canonicalize()
                    .unwrap_or_else(|_| normalize_lexically(&resolved));
                if !canonical.starts_with(&canonical_root)
                    && !canonical.starts_with(normalize_lexically(&self.root))
                {
                    return Err(BundleError::SymlinkEscapesRoot {
                        path: path.to_path_buf(),
                    });
                }

                EntryInfo {
                    entry_type: EntryType::Symlink,
                    metadata,
                    symlink_target: Some(target),
                }
            } else if file_type.is_dir() {
                EntryInfo {
                    entry_type: EntryType::Directory,
                    metadata,
                    symlink_target: None,
                }
            } else if file_type.is_file() {
                EntryInfo {
                    entry_type: EntryType::File,
                    metadata,
                    symlink_target: None,
                }
            } else {
                return Err(BundleError::Unsupported {
                    path: path.to_path_buf(),
                });
            };

            entries.insert(rel_path, info);
        }

        Ok(entries)
    }

    /// Stream the archive into `writer`, returning the writer and the
    /// entries written, in archive order
    ///
    /// Nothing is written until the whole tree has been walked, so an
    /// unreadable directory fails before any output. A failure while
    /// streaming file contents leaves `writer` holding a partial archive;
    /// callers must discard it.
    pub fn write_to<W: Write>(&self, writer: W) -> Result<(W, Vec<ArchiveEntry>), BundleError> {
        let collected = self.collect_entries()?;

        let mut builder = Builder::new(writer);
        let mut entries = Vec::with_capacity(collected.len());

        for (rel_path, info) in &collected {
            let full_path = self.root.join(rel_path);
            let archive_err = |source| BundleError::Archive {
                path: full_path.clone(),
                source,
            };

            let mode = entry_mode(&info.metadata, info.entry_type);
            let mtime = match self.mtime {
                MtimePolicy::Preserve => modified_secs(&info.metadata),
                MtimePolicy::Epoch => 0,
            };

            let mut header = Header::new_gnu();
            header.set_mode(mode);
            header.set_mtime(mtime);
            header.set_uid(0);
            header.set_gid(0);

            let mut size = 0;
            match info.entry_type {
                EntryType::File => {
                    let file = File::open(&full_path).map_err(|source| BundleError::Read {
                        path: full_path.clone(),
                        source,
                    })?;
                    size = info.metadata.len();
                    header.set_entry_type(tar::EntryType::Regular);
                    header.set_size(size);
                    builder
                        .append_data(&mut header, rel_path, file)
                        .map_err(archive_err)?;
                }
                EntryType::Directory => {
                    header.set_entry_type(tar::EntryType::Directory);
                    header.set_size(0);
                    builder
                        .append_data(&mut header, rel_path, io::empty())
                        .map_err(archive_err)?;
                }
                EntryType::Symlink => {
                    let target = info.symlink_target.as_deref().unwrap_or(Path::new(""));
                    header.set_entry_type(tar::EntryType::Symlink);
                    header.set_size(0);
                    builder
                        .append_link(&mut header, rel_path, target)
                        .map_err(archive_err)?;
                }
            }

            tracing::debug!(
                path = %rel_path.display(),
                size,
                mode = %format!("{:o}", mode),
                "archived"
            );

            entries.push(ArchiveEntry {
                path: archive_path(rel_path),
                entry_type: info.entry_type,
                size,
                mode,
                mtime,
                symlink_target: info
                    .symlink_target
                    .as_ref()
                    .map(|t| t.to_string_lossy().to_string()),
            });
        }

        let writer = builder.into_inner().map_err(|source| BundleError::Archive {
            path: self.root.clone(),
            source,
        })?;

        Ok((writer, entries))
    }
}

/// Information about a collected entry
struct EntryInfo {
    entry_type: EntryType,
    metadata: Metadata,
    symlink_target: Option<PathBuf>,
}

/// `/`-separated form of a relative path
fn archive_path(rel_path: &Path) -> String {
    rel_path
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Resolve `.` and `..` without touching the filesystem, for dangling links
pub(crate) fn normalize_lexically(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match out.components().next_back() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => out.push(".."),
            },
            other => out.push(other.as_os_str()),
        }
    }
    out
}

fn modified_secs(metadata: &Metadata) -> u64 {
    metadata
        .modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Permission bits to record for an entry
fn entry_mode(metadata: &Metadata, entry_type: EntryType) -> u32 {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let _ = entry_type;
        metadata.permissions().mode() & 0o7777
    }
    #[cfg(not(unix))]
    {
        match entry_type {
            EntryType::Directory => 0o755,
            EntryType::Symlink => 0o777,
            EntryType::File if metadata.permissions().readonly() => 0o444,
            EntryType::File => 0o644,
        }
    }
}
