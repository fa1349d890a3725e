//! Built-in defaults (layer 1)

use std::path::PathBuf;

use super::DeployConfig;
use crate::bundle::MtimePolicy;
use crate::ident::DEFAULT_DIGEST_LEN;

/// Default product name
pub const DEFAULT_NAME: &str = "Mercury";

/// Default staging directory
pub const DEFAULT_INPUT: &str = "./staging";

/// Default setup directory
pub const DEFAULT_OUTPUT: &str = "./setup";

/// Config file picked up from the working directory when present
pub const DEFAULT_CONFIG_FILE: &str = "deploy.toml";

/// Appended to the product name to form the launcher file name
pub const LAUNCHER_SUFFIX: &str = "Launcher.exe";

impl Default for DeployConfig {
    fn default() -> Self {
        Self {
            name: DEFAULT_NAME.to_string(),
            input: PathBuf::from(DEFAULT_INPUT),
            output: PathBuf::from(DEFAULT_OUTPUT),
            launcher_name: None,
            digest_len: DEFAULT_DIGEST_LEN,
            mtime: MtimePolicy::Preserve,
            copy_launcher: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = DeployConfig::default();
        assert_eq!(config.name, "Mercury");
        assert_eq!(config.input, PathBuf::from("./staging"));
        assert_eq!(config.output, PathBuf::from("./setup"));
        assert_eq!(config.digest_len, 4);
        assert_eq!(config.mtime, MtimePolicy::Preserve);
        assert!(config.copy_launcher);
    }

    #[test]
    fn test_launcher_name_derived_from_product() {
        let mut config = DeployConfig::default();
        assert_eq!(config.launcher_name(), "MercuryLauncher.exe");

        config.name = "Venus".to_string();
        assert_eq!(config.launcher_name(), "VenusLauncher.exe");

        config.launcher_name = Some("launch".to_string());
        assert_eq!(config.launcher_name(), "launch");
    }
}
