//! Deployer pipeline
//!
//! One run, strictly sequential:
//! - Check the directory layout, staging directory and launcher
//! - Archive and compress the staging tree into memory
//! - Derive the content identifier
//! - Create the setup directory and write the artifact
//! - Replace the launcher copy, then the version marker
//!
//! Any failure aborts the run. Nothing under the setup directory is
//! touched before the payload exists in memory, and the marker is only
//! ever written after its artifact and launcher.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::bundle::{content_bytes, ArchiveEntry, BundleError, Bundler};
use crate::compress::{CompressError, Compressor};
use crate::config::{ConfigError, DeployConfig};
use crate::ident::ContentId;
use crate::launcher::{self, LauncherError};
use crate::store::{ArtifactStore, StoreError};

/// Pipeline errors
#[derive(Debug, Error)]
pub enum DeployError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("archival error: {0}")]
    Bundle(#[from] BundleError),

    #[error("compression error: {0}")]
    Compress(#[from] CompressError),

    #[error("launcher error: {0}")]
    Launcher(#[from] LauncherError),

    #[error("persistence error: {0}")]
    Store(#[from] StoreError),
}

impl DeployError {
    /// Get the exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            DeployError::Config(_) => 1,
            DeployError::Bundle(e) if e.is_input_error() => 2,
            DeployError::Bundle(_) => 3,
            DeployError::Compress(_) => 4,
            DeployError::Store(_) => 5,
            DeployError::Launcher(LauncherError::Missing { .. })
            | DeployError::Launcher(LauncherError::NotAFile { .. })
            | DeployError::Launcher(LauncherError::Inspect { .. }) => 2,
            DeployError::Launcher(_) => 6,
        }
    }
}

/// Result type for pipeline operations
pub type DeployResult<T> = Result<T, DeployError>;

/// A compressed staging archive held in memory
#[derive(Debug, Clone)]
pub struct PackedArchive {
    /// gzip-compressed tar bytes
    pub payload: Vec<u8>,

    /// Archived entries, in archive order
    pub entries: Vec<ArchiveEntry>,

    /// Size of the uncompressed tar stream
    pub archive_bytes: u64,
}

/// Phase timings in milliseconds
#[derive(Debug, Clone, Default, Serialize)]
pub struct PhaseTimings {
    pub launcher_ms: u64,
    pub compress_ms: u64,
    pub write_ms: u64,
}

/// Outcome of a successful run
#[derive(Debug, Clone, Serialize)]
pub struct DeployReport {
    /// Content identifier of the published artifact
    pub id: String,

    /// Instant the identifier was derived from
    pub created_at: DateTime<Utc>,

    pub artifact_path: PathBuf,
    pub marker_path: PathBuf,

    /// Published launcher copy (None when disabled)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub launcher_path: Option<PathBuf>,

    /// Number of archived entries
    pub entries: usize,

    /// Total bytes of regular files archived
    pub content_bytes: u64,

    /// Uncompressed archive size
    pub archive_bytes: u64,

    /// Compressed payload size
    pub payload_bytes: u64,

    /// SHA-256 of the payload, hex
    pub payload_sha256: String,

    pub timings: PhaseTimings,
}

/// Runs the deployer pipeline for one configuration
#[derive(Debug, Clone)]
pub struct Deployer {
    config: DeployConfig,
    compressor: Compressor,
}

impl Deployer {
    pub fn new(config: DeployConfig) -> Self {
        Self {
            config,
            compressor: Compressor::best(),
        }
    }

    pub fn config(&self) -> &DeployConfig {
        &self.config
    }

    fn bundler(&self) -> Bundler {
        Bundler::new(self.config.input.clone()).with_mtime(self.config.mtime)
    }

    fn store(&self) -> ArtifactStore {
        ArtifactStore::new(self.config.output.clone())
    }

    /// Run the pipeline, stamping the identifier with the current time
    pub fn run(&self) -> DeployResult<DeployReport> {
        self.run_with_clock(Utc::now)
    }

    /// Run the pipeline, reading the identifier's instant from `clock`
    ///
    /// `clock` is read once, after compression finishes.
    pub fn run_with_clock<F>(&self, clock: F) -> DeployResult<DeployReport>
    where
        F: FnOnce() -> DateTime<Utc>,
    {
        let bundler = self.bundler();
        let store = self.store();
        let launcher_name = self.config.launcher_name();

        // Nothing is written until every input checks out
        self.config.check_layout()?;
        bundler.check()?;
        tracing::info!(path = %bundler.root().display(), "staging directory contains files");
        if self.config.copy_launcher {
            launcher::check_launcher(&self.config.input, &launcher_name)?;
        }

        let mut timings = PhaseTimings::default();

        let start = Instant::now();
        let packed = self.pack()?;
        timings.compress_ms = millis(start.elapsed());
        tracing::info!(
            entries = packed.entries.len(),
            archive_bytes = packed.archive_bytes,
            payload_bytes = packed.payload.len(),
            elapsed_ms = timings.compress_ms,
            "staging directory compressed"
        );

        let created_at = clock();
        let id = ContentId::derive(created_at, &packed.payload, self.config.digest_len);

        store.ensure_root()?;
        tracing::info!(path = %self.config.output.display(), "output directory is ready");

        let start = Instant::now();
        let artifact_path = store.write_artifact(&id, &packed.payload)?;
        timings.write_ms = millis(start.elapsed());

        let launcher_path = if self.config.copy_launcher {
            let start = Instant::now();
            let copy = launcher::copy_launcher(
                &self.config.input,
                &self.config.output,
                &launcher_name,
            )?;
            timings.launcher_ms = millis(start.elapsed());
            tracing::info!(path = %copy.path.display(), bytes = copy.bytes, "launcher copied");
            Some(copy.path)
        } else {
            None
        };

        let start = Instant::now();
        let marker_path = store.write_marker(&id)?;
        timings.write_ms += millis(start.elapsed());
        tracing::info!(id = %id, elapsed_ms = timings.write_ms, "artifact published");

        Ok(DeployReport {
            id: id.to_string(),
            created_at,
            artifact_path,
            marker_path,
            launcher_path,
            entries: packed.entries.len(),
            content_bytes: content_bytes(&packed.entries),
            archive_bytes: packed.archive_bytes,
            payload_bytes: packed.payload.len() as u64,
            payload_sha256: hex::encode(Sha256::digest(&packed.payload)),
            timings,
        })
    }

    /// Archive and compress the staging tree without publishing anything
    pub fn pack(&self) -> DeployResult<PackedArchive> {
        let bundler = self.bundler();
        let encoder = self.compressor.encoder(Vec::new());
        let (encoder, entries) = bundler.write_to(encoder)?;
        let (payload, archive_bytes) = self.compressor.finish(encoder)?;

        if payload.is_empty() {
            return Err(CompressError::Empty.into());
        }

        Ok(PackedArchive {
            payload,
            entries,
            archive_bytes,
        })
    }

    /// Identifier currently published in the setup directory
    pub fn current_version(&self) -> DeployResult<Option<ContentId>> {
        Ok(self.store().current_version()?)
    }
}

fn millis(elapsed: Duration) -> u64 {
    u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX)
}
