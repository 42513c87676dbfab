//! ---
//! mrit_section: "01-core-functionality"
//! mrit_subsection: "module"
//! mrit_type: "source"
//! mrit_scope: "code"
//! mrit_description: "Shared primitives and utilities for the gateway runtime."
//! mrit_version: "v0.1.0"
//! mrit_owner: "tbd"
//! ---
use std::fs;
use std::net::{IpAddr, Ipv4Addr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::logging::LogFormat;

/// Fallback site name used when neither the environment nor the config provide one.
pub const DEFAULT_SITE_NAME: &str = "Site Local";

/// Port written into a freshly synthesised site document.
pub const DEFAULT_HTTP_PORT: u16 = 8080;

fn default_mode() -> Mode {
    Mode::Production
}

fn default_site_config_path() -> PathBuf {
    PathBuf::from("local_config.json")
}

fn default_site_name() -> String {
    DEFAULT_SITE_NAME.to_owned()
}

fn default_api_bind() -> IpAddr {
    IpAddr::V4(Ipv4Addr::UNSPECIFIED)
}

fn default_connector_program() -> String {
    "mrit-outlet-bridge".to_owned()
}

fn default_connector_timeout() -> u64 {
    10
}

fn default_logging_directory() -> PathBuf {
    PathBuf::from("logs")
}

fn default_log_format() -> LogFormat {
    LogFormat::StructuredJson
}

fn default_status_interval() -> u64 {
    5
}

/// Runtime configuration for the gateway daemon.
///
/// This is distinct from the persisted site document: it only describes how the
/// process runs (where the site document lives, which connector to use, logging).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_mode")]
    pub mode: Mode,
    #[serde(default)]
    pub site: SiteSettings,
    #[serde(default)]
    pub api: ApiSettings,
    #[serde(default)]
    pub connector: ConnectorSettings,
    #[serde(default)]
    pub simulation: SimulationSettings,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub host: HostSettings,
}

/// Metadata describing where a [`GatewayConfig`] was loaded from.
#[derive(Debug, Clone)]
pub struct LoadedGatewayConfig {
    pub config: GatewayConfig,
    /// `None` when no file was found and defaults are in effect.
    pub source: Option<PathBuf>,
}

impl GatewayConfig {
    pub const ENV_CONFIG_PATH: &'static str = "MRIT_CONFIG";

    /// Load configuration from disk, respecting the `MRIT_CONFIG` override.
    ///
    /// An explicit path (CLI flag or environment) must exist. Candidate paths are
    /// optional; when none of them exist the built-in defaults are used.
    pub fn load_with_source<P: AsRef<Path>>(
        explicit: Option<&Path>,
        candidates: &[P],
    ) -> Result<LoadedGatewayConfig> {
        if let Some(path) = explicit {
            return Self::loaded_from(path.to_path_buf());
        }

        if let Ok(env_path) = std::env::var(Self::ENV_CONFIG_PATH) {
            if !env_path.trim().is_empty() {
                return Self::loaded_from(PathBuf::from(env_path));
            }
        }

        for candidate in candidates {
            if candidate.as_ref().exists() {
                return Self::loaded_from(candidate.as_ref().to_path_buf());
            }
        }

        debug!(
            inspected = %candidates
                .iter()
                .map(|p| p.as_ref().display().to_string())
                .collect::<Vec<_>>()
                .join(", "),
            "no runtime configuration found; using defaults"
        );
        Ok(LoadedGatewayConfig {
            config: Self::default(),
            source: None,
        })
    }

    fn loaded_from(path: PathBuf) -> Result<LoadedGatewayConfig> {
        let config = Self::from_path(&path)?;
        Ok(LoadedGatewayConfig {
            config,
            source: Some(path),
        })
    }

    fn from_path(path: &Path) -> Result<Self> {
        debug!(config_path = %path.display(), "loading runtime configuration");
        let contents = fs::read_to_string(path)
            .with_context(|| format!("unable to read config file {}", path.display()))?;
        let config = toml::from_str::<GatewayConfig>(&contents)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate structural invariants.
    pub fn validate(&self) -> Result<()> {
        if self.site.config_path.as_os_str().is_empty() {
            return Err(anyhow!("site.config_path must not be empty"));
        }
        if self.site.default_name.trim().is_empty() {
            return Err(anyhow!("site.default_name must not be blank"));
        }
        self.connector.validate()?;
        if self.host.status_interval_seconds == 0 {
            return Err(anyhow!("host.status_interval_seconds must be at least 1"));
        }
        Ok(())
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            mode: default_mode(),
            site: SiteSettings::default(),
            api: ApiSettings::default(),
            connector: ConnectorSettings::default(),
            simulation: SimulationSettings::default(),
            logging: LoggingConfig::default(),
            host: HostSettings::default(),
        }
    }
}

impl std::str::FromStr for GatewayConfig {
    type Err = anyhow::Error;

    fn from_str(content: &str) -> std::result::Result<Self, Self::Err> {
        let config: GatewayConfig =
            toml::from_str(content).with_context(|| "failed to parse configuration")?;
        config.validate()?;
        Ok(config)
    }
}

/// Selects how power commands reach devices.
#[derive(Debug, Copy, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Commands go through the external device-protocol client.
    #[default]
    Production,
    /// Commands are answered by in-memory outlets.
    Simulation,
}

impl Mode {
    pub fn is_simulation(&self) -> bool {
        matches!(self, Mode::Simulation)
    }
}

impl std::str::FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "production" => Ok(Mode::Production),
            "simulation" => Ok(Mode::Simulation),
            other => Err(format!("unknown mode: {other}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteSettings {
    /// Location of the persisted JSON site document.
    #[serde(default = "default_site_config_path")]
    pub config_path: PathBuf,
    /// Site name used on first run when `MRIT_SITE_NAME` is unset.
    #[serde(default = "default_site_name")]
    pub default_name: String,
}

impl Default for SiteSettings {
    fn default() -> Self {
        Self {
            config_path: default_site_config_path(),
            default_name: default_site_name(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiSettings {
    /// Interface address; the port comes from the site document.
    #[serde(default = "default_api_bind")]
    pub bind: IpAddr,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            bind: default_api_bind(),
        }
    }
}

/// External device-protocol client invoked once per power command.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectorSettings {
    #[serde(default = "default_connector_program")]
    pub program: String,
    /// Extra arguments placed before the per-command arguments.
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default = "default_connector_timeout")]
    pub timeout_seconds: u64,
}

impl ConnectorSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    pub fn validate(&self) -> Result<()> {
        if self.program.trim().is_empty() {
            return Err(anyhow!("connector.program must not be empty"));
        }
        if self.timeout_seconds == 0 {
            return Err(anyhow!("connector.timeout_seconds must be at least 1"));
        }
        Ok(())
    }
}

impl Default for ConnectorSettings {
    fn default() -> Self {
        Self {
            program: default_connector_program(),
            args: Vec::new(),
            timeout_seconds: default_connector_timeout(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SimulationSettings {
    /// Device identifiers the simulated connector refuses to reach.
    #[serde(default)]
    pub unreachable: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_logging_directory")]
    pub directory: PathBuf,
    #[serde(default = "default_log_format")]
    pub format: LogFormat,
    #[serde(default)]
    pub file_prefix: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            directory: default_logging_directory(),
            format: default_log_format(),
            file_prefix: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostSettings {
    /// How often the daemon checks that the API worker is still alive.
    #[serde(default = "default_status_interval")]
    pub status_interval_seconds: u64,
}

impl HostSettings {
    pub fn status_interval(&self) -> Duration {
        Duration::from_secs(self.status_interval_seconds)
    }
}

impl Default for HostSettings {
    fn default() -> Self {
        Self {
            status_interval_seconds: default_status_interval(),
        }
    }
}
