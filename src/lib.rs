//! Mercury setup deployer
//!
//! Packages a staging directory into a deterministic, gzip-compressed tar
//! archive named by a content identifier, publishes it into a setup
//! directory next to a copy of the launcher, and records the identifier
//! in a `version` marker that clients poll.

pub mod bundle;
pub mod compress;
pub mod config;
pub mod ident;
pub mod launcher;
pub mod pipeline;
pub mod store;

pub use bundle::{ArchiveEntry, BundleError, Bundler, EntryType, MtimePolicy};
pub use compress::{CompressError, Compressor};
pub use config::{ConfigError, ConfigLayer, DeployConfig, EffectiveConfig};
pub use ident::{ContentId, IdError};
pub use launcher::LauncherError;
pub use pipeline::{DeployError, DeployReport, Deployer, PackedArchive};
pub use store::{ArtifactStore, StoreError};
