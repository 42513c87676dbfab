//! ---
//! mrit_section: "03-persistence"
//! mrit_subsection: "module"
//! mrit_type: "source"
//! mrit_scope: "code"
//! mrit_description: "Site document persistence and device registry."
//! mrit_version: "v0.1.0"
//! mrit_owner: "tbd"
//! ---
#![warn(missing_docs)]
//! The site document is the single source of truth for site identity and every
//! device the gateway has been asked to command. [`ConfigStore`] owns the file,
//! [`DeviceRegistry`] owns the in-memory mirror and is the only writer.

use std::path::PathBuf;

/// Result alias used throughout the registry crate.
pub type Result<T> = std::result::Result<T, RegistryError>;

/// Error type for the site document and registry.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// The site document exists but cannot be interpreted. Fatal at startup.
    #[error("site configuration {path} is corrupt: {reason}")]
    ConfigCorrupt {
        /// File that failed to parse.
        path: PathBuf,
        /// Parser or validation detail.
        reason: String,
    },
    /// The site document could not be read.
    #[error("unable to read site configuration {path}: {source}")]
    Io {
        /// File being read.
        path: PathBuf,
        /// Underlying IO failure.
        source: std::io::Error,
    },
    /// Writing the site document back to disk failed.
    #[error("failed to persist site configuration {path}: {source}")]
    Persistence {
        /// Destination file.
        path: PathBuf,
        /// Underlying IO failure.
        source: std::io::Error,
    },
    /// The in-memory document could not be serialised.
    #[error("failed to serialise site configuration: {0}")]
    Serialize(#[from] serde_json::Error),
    /// A record was rejected before reaching the registry.
    #[error("invalid device record {device_id:?}: {reason}")]
    InvalidRecord {
        /// Identifier of the rejected record.
        device_id: String,
        /// Which invariant was violated.
        reason: String,
    },
}

pub mod model;
pub mod registry;
pub mod store;

pub use model::{DeviceEntry, DeviceRecord, SiteConfiguration, SiteMetadata, DEFAULT_DEVICE_NAME};
pub use registry::{DeviceRegistry, DeviceUpdate};
pub use store::ConfigStore;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn corrupt_error_mentions_path() {
        let err = RegistryError::ConfigCorrupt {
            path: PathBuf::from("/tmp/local_config.json"),
            reason: "expected value at line 1 column 1".into(),
        };
        assert_eq!(
            err.to_string(),
            "site configuration /tmp/local_config.json is corrupt: expected value at line 1 column 1"
        );
    }
}
