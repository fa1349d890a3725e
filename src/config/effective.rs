//! Effective configuration with provenance
//!
//! Each layer is a `ConfigLayer` of optional overrides. The effective
//! config records which sources contributed, with a SHA-256 of the raw
//! file bytes so a release log pins exactly which config was used.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use super::defaults::DEFAULT_CONFIG_FILE;
use super::DeployConfig;
use crate::bundle::MtimePolicy;
use crate::ident::MAX_DIGEST_LEN;
use crate::store::VERSION_MARKER;

/// Origin of a configuration source
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ConfigOrigin {
    Builtin,
    File,
    Cli,
}

/// A contributing config source with provenance
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConfigSource {
    /// Origin of this source
    pub origin: ConfigOrigin,

    /// File path (None for builtin/cli)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    /// SHA-256 digest of raw file bytes (None for builtin/cli)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,
}

/// One layer of optional overrides
///
/// Relative paths are taken relative to the working directory.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConfigLayer {
    pub name: Option<String>,
    pub input: Option<PathBuf>,
    pub output: Option<PathBuf>,
    pub launcher_name: Option<String>,
    pub digest_len: Option<usize>,
    pub mtime: Option<MtimePolicy>,
    pub copy_launcher: Option<bool>,
}

impl ConfigLayer {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Overwrite every field of `config` this layer sets
    fn apply_to(self, config: &mut DeployConfig) {
        if let Some(name) = self.name {
            config.name = name;
        }
        if let Some(input) = self.input {
            config.input = input;
        }
        if let Some(output) = self.output {
            config.output = output;
        }
        if let Some(launcher_name) = self.launcher_name {
            config.launcher_name = Some(launcher_name);
        }
        if let Some(digest_len) = self.digest_len {
            config.digest_len = digest_len;
        }
        if let Some(mtime) = self.mtime {
            config.mtime = mtime;
        }
        if let Some(copy_launcher) = self.copy_launcher {
            config.copy_launcher = copy_launcher;
        }
    }
}

/// Effective configuration with the sources that produced it
#[derive(Debug, Clone, Serialize)]
pub struct EffectiveConfig {
    /// The merged configuration
    pub config: DeployConfig,

    /// Contributing sources in precedence order
    pub sources: Vec<ConfigSource>,
}

impl EffectiveConfig {
    /// Build the effective config from an optional file layer and CLI overrides
    ///
    /// A `file` that is given must exist; use [`EffectiveConfig::discover`]
    /// to pick up the default file only when present.
    pub fn build(file: Option<&Path>, cli: ConfigLayer) -> Result<Self, ConfigError> {
        let mut config = DeployConfig::default();
        let mut sources = vec![ConfigSource {
            origin: ConfigOrigin::Builtin,
            path: None,
            digest: None,
        }];

        if let Some(path) = file {
            let (layer, digest) = Self::load_toml_file(path)?;
            layer.apply_to(&mut config);
            sources.push(ConfigSource {
                origin: ConfigOrigin::File,
                path: Some(path.to_string_lossy().to_string()),
                digest: Some(digest),
            });
        }

        if !cli.is_empty() {
            cli.apply_to(&mut config);
            sources.push(ConfigSource {
                origin: ConfigOrigin::Cli,
                path: None,
                digest: None,
            });
        }

        Self::validate_config(&config)?;

        Ok(Self { config, sources })
    }

    /// Config file to load: the explicit path if given, otherwise
    /// `deploy.toml` in `dir` when it exists
    pub fn discover(explicit: Option<&Path>, dir: &Path) -> Option<PathBuf> {
        if let Some(path) = explicit {
            return Some(path.to_path_buf());
        }
        let default = dir.join(DEFAULT_CONFIG_FILE);
        default.is_file().then_some(default)
    }

    /// Load and parse a TOML layer, returning it with the file's digest
    fn load_toml_file(path: &Path) -> Result<(ConfigLayer, String), ConfigError> {
        let bytes = fs::read(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let digest = hex::encode(Sha256::digest(&bytes));

        let contents = String::from_utf8(bytes).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            message: format!("invalid UTF-8: {}", e),
        })?;

        let layer: ConfigLayer = toml::from_str(&contents).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

        Ok((layer, digest))
    }

    /// Validate configuration values
    fn validate_config(config: &DeployConfig) -> Result<(), ConfigError> {
        if config.name.trim().is_empty() {
            return Err(ConfigError::Validation {
                field: "name",
                message: "must not be empty".to_string(),
            });
        }

        if config.digest_len == 0 || config.digest_len > MAX_DIGEST_LEN {
            return Err(ConfigError::Validation {
                field: "digest_len",
                message: format!("must be in [1, {}]", MAX_DIGEST_LEN),
            });
        }

        let launcher = config.launcher_name();
        if launcher.is_empty()
            || launcher == "."
            || launcher == ".."
            || launcher.contains(['/', '\\'])
        {
            return Err(ConfigError::Validation {
                field: "launcher_name",
                message: format!("must be a plain file name, got {:?}", launcher),
            });
        }
        if launcher == VERSION_MARKER {
            return Err(ConfigError::Validation {
                field: "launcher_name",
                message: format!("must not collide with the {:?} marker", VERSION_MARKER),
            });
        }

        config.check_layout()
    }

    /// Serialize to JSON
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("cannot parse config {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("invalid {field}: {message}")]
    Validation {
        field: &'static str,
        message: String,
    },
}
