//! Shared fixtures for deployer integration tests
//!
//! Builds staging trees in temp directories and unpacks published payloads
//! back into inspectable form.

#![allow(dead_code)]

use flate2::read::GzDecoder;
use std::collections::BTreeMap;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use tar::Archive;
use tempfile::TempDir;

use mercury_deployer::DeployConfig;

pub const LAUNCHER: &str = "MercuryLauncher.exe";

/// A staging and setup directory pair under one temp root
pub struct Workspace {
    pub root: TempDir,
}

impl Workspace {
    pub fn new() -> Self {
        let root = TempDir::new().unwrap();
        fs::create_dir(root.path().join("staging")).unwrap();
        Self { root }
    }

    pub fn staging(&self) -> PathBuf {
        self.root.path().join("staging")
    }

    pub fn setup(&self) -> PathBuf {
        self.root.path().join("setup")
    }

    /// Write a staging file, creating parent directories as needed
    pub fn stage(&self, rel: &str, contents: &[u8]) -> PathBuf {
        let path = self.staging().join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&path, contents).unwrap();
        path
    }

    /// Stage a typical release: launcher, binaries, assets
    pub fn stage_release(&self) {
        self.stage(LAUNCHER, b"MZ launcher stub");
        self.stage("bin/mercury.dll", &[0xAB; 2048]);
        self.stage("bin/runtime/core.dll", b"runtime core");
        self.stage("assets/readme.txt", b"Mercury release notes\n");
        fs::create_dir_all(self.staging().join("logs")).unwrap();
    }

    pub fn config(&self) -> DeployConfig {
        DeployConfig::default()
            .with_input(self.staging())
            .with_output(self.setup())
    }
}

/// An unpacked archive entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unpacked {
    pub contents: Vec<u8>,
    pub mode: u32,
    pub is_dir: bool,
}

/// Decompress and read a payload into path -> entry, in archive order
pub fn read_payload(payload: &[u8]) -> Vec<(String, Unpacked)> {
    let mut archive = Archive::new(GzDecoder::new(payload));
    let mut out = Vec::new();
    for entry in archive.entries().unwrap() {
        let mut entry = entry.unwrap();
        let path = entry
            .path()
            .unwrap()
            .to_string_lossy()
            .trim_end_matches('/')
            .to_string();
        let mode = entry.header().mode().unwrap();
        let is_dir = entry.header().entry_type().is_dir();
        let mut contents = Vec::new();
        entry.read_to_end(&mut contents).unwrap();
        out.push((
            path,
            Unpacked {
                contents,
                mode,
                is_dir,
            },
        ));
    }
    out
}

/// Extract a payload into `dest` with the tar crate's unpacker
pub fn extract_payload(payload: &[u8], dest: &Path) {
    let mut archive = Archive::new(GzDecoder::new(payload));
    archive.set_preserve_permissions(true);
    archive.unpack(dest).unwrap();
}

/// Every regular file under `root`, relative path -> contents
pub fn snapshot_files(root: &Path) -> BTreeMap<String, Vec<u8>> {
    walkdir::WalkDir::new(root)
        .into_iter()
        .map(|e| e.unwrap())
        .filter(|e| e.file_type().is_file())
        .map(|e| {
            let rel = e
                .path()
                .strip_prefix(root)
                .unwrap()
                .components()
                .map(|c| c.as_os_str().to_string_lossy().to_string())
                .collect::<Vec<_>>()
                .join("/");
            (rel, fs::read(e.path()).unwrap())
        })
        .collect()
}
