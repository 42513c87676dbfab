//! ---
//! mrit_section: "03-persistence"
//! mrit_subsection: "module"
//! mrit_type: "source"
//! mrit_scope: "code"
//! mrit_description: "Site document persistence and device registry."
//! mrit_version: "v0.1.0"
//! mrit_owner: "tbd"
//! ---
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use mrit_common::DEFAULT_SITE_NAME;
use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::model::SiteConfiguration;
use crate::{RegistryError, Result};

/// Reads and writes the JSON site document at its canonical path.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
    default_site_name: String,
}

impl ConfigStore {
    /// Environment variable consulted for the site name on first run.
    pub const SITE_NAME_ENV: &'static str = "MRIT_SITE_NAME";

    /// Create a store for the document at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            default_site_name: DEFAULT_SITE_NAME.to_owned(),
        }
    }

    /// Override the fallback used when no site name is provided on first run.
    pub fn with_default_site_name(mut self, name: impl Into<String>) -> Self {
        self.default_site_name = name.into();
        self
    }

    /// Canonical location of the site document.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the document, synthesising it on first run.
    ///
    /// The site name for a new document comes from `MRIT_SITE_NAME` when set to a
    /// non-blank value, otherwise from the configured fallback.
    pub fn load_or_create(&self) -> Result<SiteConfiguration> {
        let site_name = std::env::var(Self::SITE_NAME_ENV).ok();
        self.load_or_create_with(site_name.as_deref())
    }

    /// Same as [`ConfigStore::load_or_create`] with an explicit site name override.
    pub fn load_or_create_with(&self, site_name: Option<&str>) -> Result<SiteConfiguration> {
        match self.load() {
            Ok(config) => Ok(config),
            Err(RegistryError::Io { source, .. }) if source.kind() == ErrorKind::NotFound => {
                let site_name = site_name
                    .map(str::trim)
                    .filter(|name| !name.is_empty())
                    .unwrap_or(&self.default_site_name);
                let config = SiteConfiguration::new(site_name);
                self.save(&config)?;
                info!(config_path = %self.path.display(), site = %config.site_name, "site configuration created");
                Ok(config)
            }
            Err(err) => Err(err),
        }
    }

    /// Parse the existing document. Malformed content is [`RegistryError::ConfigCorrupt`].
    pub fn load(&self) -> Result<SiteConfiguration> {
        debug!(config_path = %self.path.display(), "loading site configuration");
        let bytes = fs::read(&self.path).map_err(|source| RegistryError::Io {
            path: self.path.clone(),
            source,
        })?;
        let config: SiteConfiguration =
            serde_json::from_slice(&bytes).map_err(|err| RegistryError::ConfigCorrupt {
                path: self.path.clone(),
                reason: err.to_string(),
            })?;
        config
            .validate()
            .map_err(|err| RegistryError::ConfigCorrupt {
                path: self.path.clone(),
                reason: err.to_string(),
            })?;
        Ok(config)
    }

    /// Replace the document on disk with `config`.
    ///
    /// The JSON is written to a temporary file next to the target and renamed over
    /// it, so readers only ever observe the previous or the new document.
    pub fn save(&self, config: &SiteConfiguration) -> Result<()> {
        let serialised = serde_json::to_vec_pretty(config)?;
        let parent = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let persistence = |source: std::io::Error| RegistryError::Persistence {
            path: self.path.clone(),
            source,
        };

        fs::create_dir_all(parent).map_err(persistence)?;
        let mut staged = NamedTempFile::new_in(parent).map_err(persistence)?;
        staged.write_all(&serialised).map_err(persistence)?;
        staged.as_file().sync_all().map_err(persistence)?;
        staged
            .persist(&self.path)
            .map_err(|err| persistence(err.error))?;
        debug!(config_path = %self.path.display(), devices = config.devices.len(), "site configuration saved");
        Ok(())
    }
}
