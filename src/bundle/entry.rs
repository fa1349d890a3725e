//! Archive entry records
//!
//! One record per tar entry, in archive order. The pipeline reports them so
//! a release job can see exactly what went into a setup payload.

use serde::{Deserialize, Serialize};

/// Kind of entry stored in the archive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryType {
    File,
    Directory,
    Symlink,
}

/// A single archived entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveEntry {
    /// Path relative to the staging root, `/`-separated
    pub path: String,

    /// Type of entry
    #[serde(rename = "type")]
    pub entry_type: EntryType,

    /// Content size in bytes (0 for directories and symlinks)
    pub size: u64,

    /// Permission bits recorded in the header
    pub mode: u32,

    /// Modification time recorded in the header (seconds since the epoch)
    pub mtime: u64,

    /// Link target (only present for symlinks)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub symlink_target: Option<String>,
}

impl ArchiveEntry {
    pub fn is_file(&self) -> bool {
        self.entry_type == EntryType::File
    }
}

/// Total content bytes across all regular files
pub fn content_bytes(entries: &[ArchiveEntry]) -> u64 {
    entries.iter().filter(|e| e.is_file()).map(|e| e.size).sum()
}
