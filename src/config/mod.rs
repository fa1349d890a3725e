//! Deployer configuration
//!
//! Configuration is merged from three layers, lowest precedence first:
//! 1. Built-in defaults
//! 2. A TOML file (`deploy.toml`, or `--config PATH`)
//! 3. CLI flags

mod defaults;
mod effective;

pub use defaults::{
    DEFAULT_CONFIG_FILE, DEFAULT_INPUT, DEFAULT_NAME, DEFAULT_OUTPUT, LAUNCHER_SUFFIX,
};
pub use effective::{ConfigError, ConfigLayer, ConfigOrigin, ConfigSource, EffectiveConfig};

use serde::Serialize;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use crate::bundle::{normalize_lexically, MtimePolicy};

/// Resolved configuration for one deployer run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeployConfig {
    /// Product name; the launcher is `<name>Launcher.exe` unless overridden
    pub name: String,

    /// Staging directory to package
    pub input: PathBuf,

    /// Setup directory receiving artifacts, marker and launcher
    pub output: PathBuf,

    /// Launcher file name override
    #[serde(skip_serializing_if = "Option::is_none")]
    pub launcher_name: Option<String>,

    /// Digest length in bytes for the identifier's digest half
    pub digest_len: usize,

    /// Modification time policy for archived entries
    pub mtime: MtimePolicy,

    /// Whether to publish a copy of the launcher
    pub copy_launcher: bool,
}

impl DeployConfig {
    /// Launcher file name, relative to both staging and output directories
    pub fn launcher_name(&self) -> String {
        match &self.launcher_name {
            Some(name) => name.clone(),
            None => format!("{}{}", self.name, LAUNCHER_SUFFIX),
        }
    }

    /// Reject an output directory that resolves to the staging directory
    /// or anywhere inside it
    ///
    /// Paths are compared after resolving symlinks, `.` and `..`. An output
    /// directory that does not exist yet is resolved through its nearest
    /// existing ancestor.
    pub fn check_layout(&self) -> Result<(), ConfigError> {
        let input = resolve_path(&self.input);
        let output = resolve_path(&self.output);

        if output.starts_with(&input) {
            return Err(ConfigError::Validation {
                field: "output",
                message: format!(
                    "{} must not be inside input {}",
                    self.output.display(),
                    self.input.display()
                ),
            });
        }
        Ok(())
    }

    pub fn with_input(mut self, input: impl Into<PathBuf>) -> Self {
        self.input = input.into();
        self
    }

    pub fn with_output(mut self, output: impl Into<PathBuf>) -> Self {
        self.output = output.into();
        self
    }

    pub fn with_digest_len(mut self, digest_len: usize) -> Self {
        self.digest_len = digest_len;
        self
    }

    pub fn with_mtime(mut self, mtime: MtimePolicy) -> Self {
        self.mtime = mtime;
        self
    }

    pub fn with_copy_launcher(mut self, copy_launcher: bool) -> Self {
        self.copy_launcher = copy_launcher;
        self
    }
}

/// Absolute form of `path` with symlinks resolved as far as the path exists
fn resolve_path(path: &Path) -> PathBuf {
    let absolute = match env::current_dir() {
        Ok(cwd) if path.is_relative() => cwd.join(path),
        _ => path.to_path_buf(),
    };

    for existing in absolute.ancestors() {
        if let Ok(canonical) = fs::canonicalize(existing) {
            let tail = absolute.strip_prefix(existing).unwrap_or(Path::new(""));
            return normalize_lexically(&canonical.join(tail));
        }
    }
    normalize_lexically(&absolute)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn layout(dir: &TempDir, input: &str, output: &str) -> DeployConfig {
        DeployConfig::default()
            .with_input(dir.path().join(input))
            .with_output(dir.path().join(output))
    }

    #[test]
    fn test_layout_accepts_siblings() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("staging")).unwrap();

        assert!(layout(&dir, "staging", "setup").check_layout().is_ok());
        assert!(layout(&dir, "staging", "staging-setup").check_layout().is_ok());
        assert!(layout(&dir, "staging/../staging", "staging/../setup")
            .check_layout()
            .is_ok());
    }

    #[test]
    fn test_layout_rejects_output_inside_input() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("staging")).unwrap();

        for output in ["staging", "staging/.", "staging/setup", "staging/a/b", "setup/../staging"] {
            let err = layout(&dir, "staging", output).check_layout().unwrap_err();
            assert!(
                matches!(err, ConfigError::Validation { field: "output", .. }),
                "{:?} should be rejected",
                output
            );
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_layout_rejects_symlinked_alias() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("staging")).unwrap();
        std::os::unix::fs::symlink(dir.path().join("staging"), dir.path().join("alias")).unwrap();

        let err = layout(&dir, "staging", "alias/setup").check_layout().unwrap_err();
        assert!(err.to_string().contains("must not be inside input"));

        let err = layout(&dir, "alias", "staging/setup").check_layout().unwrap_err();
        assert!(matches!(err, ConfigError::Validation { field: "output", .. }));
    }
}
