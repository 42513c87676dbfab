//! ---
//! mrit_section: "01-core-functionality"
//! mrit_subsection: "module"
//! mrit_type: "source"
//! mrit_scope: "code"
//! mrit_description: "Shared primitives and utilities for the gateway runtime."
//! mrit_version: "v0.1.0"
//! mrit_owner: "tbd"
//! ---
//! Shared primitives for the MRIT gateway workspace.
//! This crate exposes runtime configuration loading and tracing setup
//! consumed by the daemon and the control CLI.

pub mod config;
pub mod logging;

pub use config::{
    ApiSettings, ConnectorSettings, GatewayConfig, HostSettings, LoadedGatewayConfig,
    LoggingConfig, Mode, SimulationSettings, SiteSettings, DEFAULT_HTTP_PORT, DEFAULT_SITE_NAME,
};
pub use logging::{
    command_log_name, init_cli_tracing, init_tracing, LogFormat, COMMAND_LOG_TARGETS,
};
