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

use anyhow::{Context, Result};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::daily;
use tracing_subscriber::filter::{EnvFilter, LevelFilter, Targets};
use tracing_subscriber::fmt::{self, time::UtcTime};
use tracing_subscriber::layer::{Layer, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;

use crate::config::LoggingConfig;

const LOG_ENV: &str = "MRIT_LOG";
const DEFAULT_DIRECTIVE: &str = "info";

/// Crates whose events form the command log. They are recorded at `info`
/// regardless of the console filter.
pub const COMMAND_LOG_TARGETS: [&str; 3] = ["mrit_api", "mrit_device", "mrit_registry"];

struct LogGuards {
    _console: WorkerGuard,
    _commands: WorkerGuard,
}

static GUARDS: OnceCell<LogGuards> = OnceCell::new();

/// Available console formats for the daemon.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum LogFormat {
    #[default]
    StructuredJson,
    Pretty,
}

/// Base name of the daily command log; the appender appends the date.
pub fn command_log_name(service_name: &str, config: &LoggingConfig) -> String {
    let prefix = config.file_prefix.as_deref().unwrap_or(service_name);
    format!("{prefix}-commands.log")
}

/// Install the daemon subscriber.
///
/// The console follows `MRIT_LOG`, then `RUST_LOG`, then `info`, in the configured
/// format. The command log is a daily JSON file in `config.directory` holding every
/// registration, dispatch and device reply, each line flattened so the `site`,
/// `device_id` and `action` fields sit at the top level.
pub fn init_tracing(service_name: &str, config: &LoggingConfig) -> Result<()> {
    fs::create_dir_all(&config.directory).with_context(|| {
        format!(
            "unable to create log directory {}",
            config.directory.display()
        )
    })?;
    let command_log = command_log_name(service_name, config);
    let (commands, commands_guard) =
        tracing_appender::non_blocking(daily(&config.directory, &command_log));
    let (console, console_guard) = tracing_appender::non_blocking(std::io::stdout());

    let console_layer = match config.format {
        LogFormat::StructuredJson => fmt::layer()
            .json()
            .with_target(false)
            .with_timer(UtcTime::rfc_3339())
            .with_writer(console)
            .with_filter(env_filter())
            .boxed(),
        LogFormat::Pretty => fmt::layer()
            .with_timer(UtcTime::rfc_3339())
            .with_writer(console)
            .with_filter(env_filter())
            .boxed(),
    };
    let command_layer = fmt::layer()
        .json()
        .flatten_event(true)
        .with_current_span(false)
        .with_span_list(false)
        .with_timer(UtcTime::rfc_3339())
        .with_writer(commands)
        .with_filter(command_log_filter());

    let installed = tracing_subscriber::registry()
        .with(console_layer)
        .with(command_layer)
        .try_init()
        .is_ok();
    if !installed {
        return Ok(());
    }
    let _ = GUARDS.set(LogGuards {
        _console: console_guard,
        _commands: commands_guard,
    });

    info!(
        service = %service_name,
        command_log = %config.directory.join(&command_log).display(),
        format = ?config.format,
        "tracing initialised"
    );
    Ok(())
}

/// Initialize a stderr-only subscriber for short-lived CLI tools.
pub fn init_cli_tracing() {
    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr).with_filter(env_filter()))
        .try_init();
}

fn command_log_filter() -> Targets {
    COMMAND_LOG_TARGETS
        .iter()
        .fold(Targets::new(), |targets, target| {
            targets.with_target(*target, LevelFilter::INFO)
        })
}

fn env_filter() -> EnvFilter {
    match std::env::var(LOG_ENV) {
        Ok(directive) => EnvFilter::try_new(directive).unwrap_or_else(|err| {
            eprintln!("invalid {LOG_ENV} directive ({err}); defaulting to {DEFAULT_DIRECTIVE}");
            EnvFilter::new(DEFAULT_DIRECTIVE)
        }),
        Err(_) => EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVE)),
    }
}
