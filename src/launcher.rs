//! Launcher copy
//!
//! The launcher executable ships inside the staging tree and is also
//! published verbatim next to the setup payloads, so clients can fetch it
//! without unpacking anything.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Errors for launcher operations
#[derive(Debug, thiserror::Error)]
pub enum LauncherError {
    #[error("launcher not found: {path}")]
    Missing { path: PathBuf },

    #[error("launcher is not a regular file: {path}")]
    NotAFile { path: PathBuf },

    #[error("cannot inspect launcher {path}: {source}")]
    Inspect {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("cannot copy launcher {from} to {to}: {source}")]
    Copy {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// A completed launcher copy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LauncherCopy {
    pub path: PathBuf,
    pub bytes: u64,
}

/// Check that `<staging>/<name>` exists and is a regular file
pub fn check_launcher(staging: &Path, name: &str) -> Result<PathBuf, LauncherError> {
    let path = staging.join(name);
    match fs::metadata(&path) {
        Ok(metadata) if metadata.is_file() => Ok(path),
        Ok(_) => Err(LauncherError::NotAFile { path }),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Err(LauncherError::Missing { path }),
        Err(source) => Err(LauncherError::Inspect { path, source }),
    }
}

/// Copy `<staging>/<name>` to `<output>/<name>`, replacing any previous copy
///
/// The copy lands in `<output>/.<name>.tmp` first and is renamed over the
/// published launcher, so `<output>/<name>` is either the old file or the
/// complete new one.
pub fn copy_launcher(staging: &Path, output: &Path, name: &str) -> Result<LauncherCopy, LauncherError> {
    let from = check_launcher(staging, name)?;
    let to = output.join(name);
    let temp = output.join(format!(".{}.tmp", name));

    let copied = fs::copy(&from, &temp).and_then(|bytes| {
        fs::rename(&temp, &to)?;
        Ok(bytes)
    });
    let bytes = match copied {
        Ok(bytes) => bytes,
        Err(source) => {
            let _ = fs::remove_file(&temp);
            return Err(LauncherError::Copy {
                from,
                to,
                source,
            });
        }
    };

    tracing::debug!(from = %from.display(), to = %to.display(), bytes, "launcher copied");
    Ok(LauncherCopy { path: to, bytes })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_copy_launcher() {
        let staging = TempDir::new().unwrap();
        let output = TempDir::new().unwrap();
        fs::write(staging.path().join("MercuryLauncher.exe"), b"MZ\x90\x00").unwrap();

        let copy = copy_launcher(staging.path(), output.path(), "MercuryLauncher.exe").unwrap();

        assert_eq!(copy.bytes, 4);
        assert_eq!(copy.path, output.path().join("MercuryLauncher.exe"));
        assert_eq!(fs::read(&copy.path).unwrap(), b"MZ\x90\x00");
    }

    #[test]
    fn test_copy_replaces_previous() {
        let staging = TempDir::new().unwrap();
        let output = TempDir::new().unwrap();
        fs::write(staging.path().join("L.exe"), b"new").unwrap();
        fs::write(output.path().join("L.exe"), b"old launcher").unwrap();

        copy_launcher(staging.path(), output.path(), "L.exe").unwrap();
        assert_eq!(fs::read(output.path().join("L.exe")).unwrap(), b"new");
        assert!(!output.path().join(".L.exe.tmp").exists());
    }

    #[test]
    fn test_failed_copy_keeps_previous() {
        let staging = TempDir::new().unwrap();
        let output = TempDir::new().unwrap();
        fs::write(staging.path().join("L.exe"), b"new").unwrap();
        fs::create_dir(output.path().join("L.exe")).unwrap();
        fs::write(output.path().join("L.exe").join("keep"), b"").unwrap();

        let err = copy_launcher(staging.path(), output.path(), "L.exe").unwrap_err();

        assert!(matches!(err, LauncherError::Copy { .. }));
        assert!(output.path().join("L.exe").join("keep").exists());
        assert!(!output.path().join(".L.exe.tmp").exists());
    }

    #[test]
    fn test_missing_launcher() {
        let staging = TempDir::new().unwrap();
        let output = TempDir::new().unwrap();

        let err = copy_launcher(staging.path(), output.path(), "L.exe").unwrap_err();
        assert!(matches!(err, LauncherError::Missing { .. }));
        assert!(err.to_string().contains("L.exe"));
        assert!(!output.path().join("L.exe").exists());
    }

    #[test]
    fn test_launcher_directory_rejected() {
        let staging = TempDir::new().unwrap();
        fs::create_dir(staging.path().join("L.exe")).unwrap();

        let err = check_launcher(staging.path(), "L.exe").unwrap_err();
        assert!(matches!(err, LauncherError::NotAFile { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn test_launcher_under_file_is_not_missing() {
        let staging = TempDir::new().unwrap();
        fs::write(staging.path().join("bin"), b"").unwrap();

        // ENOTDIR, not ENOENT
        let err = check_launcher(&staging.path().join("bin"), "L.exe").unwrap_err();
        assert!(matches!(err, LauncherError::Inspect { .. }), "{:?}", err);
        assert!(err.to_string().contains("cannot inspect"));
    }
}
