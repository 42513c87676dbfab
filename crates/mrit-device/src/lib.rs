//! ---
//! mrit_section: "05-networking-external-interfaces"
//! mrit_subsection: "module"
//! mrit_type: "source"
//! mrit_scope: "code"
//! mrit_description: "Outlet connectivity and power command dispatch."
//! mrit_version: "v0.1.0"
//! mrit_owner: "tbd"
//! ---
#![warn(missing_docs)]
//! The vendor protocol lives outside this workspace. Connectors open an
//! [`OutletSession`] to one device; the [`CommandDispatcher`] drives a session and
//! folds every outcome into a [`CommandResult`].

use std::time::Duration;

pub mod bridge;
pub mod dispatcher;
pub mod session;
pub mod simulated;

pub use bridge::BridgeConnector;
pub use dispatcher::{CommandDispatcher, CommandResult, PowerCommand};
pub use session::{OutletConnector, OutletSession, OutletTarget, PowerAction};
pub use simulated::SimulatedConnector;

/// Protocol version assumed when the caller does not supply a usable one.
pub const DEFAULT_PROTOCOL_VERSION: f64 = 3.3;

/// Failure talking to a device or to the external protocol client.
#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    /// The client program could not be started.
    #[error("failed to launch device client {program}: {source}")]
    Launch {
        /// Program that failed to start.
        program: String,
        /// Underlying IO failure.
        source: std::io::Error,
    },
    /// No reply within the client timeout.
    #[error("device {device_id} at {lan_ip} did not respond within {timeout:?}")]
    Timeout {
        /// Target device.
        device_id: String,
        /// Target address.
        lan_ip: String,
        /// Timeout that elapsed.
        timeout: Duration,
    },
    /// The client ran but reported failure.
    #[error("device client exited with {status}: {stderr}")]
    ClientFailed {
        /// Exit status description.
        status: String,
        /// Trimmed stderr of the client.
        stderr: String,
    },
    /// The client reply was not JSON.
    #[error("malformed device reply: {0}")]
    MalformedReply(String),
    /// The device could not be reached over the LAN.
    #[error("device {device_id} at {lan_ip} is unreachable")]
    Unreachable {
        /// Target device.
        device_id: String,
        /// Target address.
        lan_ip: String,
    },
    /// The device rejected the local key.
    #[error("authentication with device {0} failed")]
    Authentication(String),
}

/// Render a protocol version the way vendor clients expect it (`3.3`, `3.0`).
pub fn format_version(version: f64) -> String {
    if version.fract() == 0.0 {
        format!("{version:.1}")
    } else {
        version.to_string()
    }
}
