//! ---
//! mrit_section: "05-networking-external-interfaces"
//! mrit_subsection: "module"
//! mrit_type: "source"
//! mrit_scope: "code"
//! mrit_description: "Outlet connectivity and power command dispatch."
//! mrit_version: "v0.1.0"
//! mrit_owner: "tbd"
//! ---
use std::fmt;

use async_trait::async_trait;
use serde_json::Value;

use crate::DeviceError;

/// Requested power state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerAction {
    /// Switch the outlet on.
    On,
    /// Switch the outlet off.
    Off,
}

impl PowerAction {
    /// Interpret a request action. Only `on` (any case) switches on; anything else is `Off`.
    pub fn from_request(action: &str) -> Self {
        if action.eq_ignore_ascii_case("on") {
            Self::On
        } else {
            Self::Off
        }
    }

    /// Wire spelling passed to protocol clients.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::On => "on",
            Self::Off => "off",
        }
    }
}

/// Address and credentials of one outlet.
#[derive(Clone, PartialEq, Eq)]
pub struct OutletTarget {
    /// Vendor device identifier.
    pub device_id: String,
    /// Shared secret for the local session.
    pub local_key: String,
    /// LAN address.
    pub lan_ip: String,
}

impl fmt::Debug for OutletTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutletTarget")
            .field("device_id", &self.device_id)
            .field("local_key", &"<redacted>")
            .field("lan_ip", &self.lan_ip)
            .finish()
    }
}

/// An open session to one outlet.
///
/// Replies are passed through untouched; interpreting them is the dispatcher's job.
#[async_trait]
pub trait OutletSession: Send {
    /// Select the vendor protocol version for subsequent commands.
    fn set_protocol_version(&mut self, version: f64);

    /// Switch the outlet on and return the raw reply.
    async fn turn_on(&mut self) -> Result<Value, DeviceError>;

    /// Switch the outlet off and return the raw reply.
    async fn turn_off(&mut self) -> Result<Value, DeviceError>;
}

/// Factory for [`OutletSession`]s.
pub trait OutletConnector: Send + Sync + 'static {
    /// Open a session to `target`.
    fn open(&self, target: &OutletTarget) -> Result<Box<dyn OutletSession>, DeviceError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_on_switches_on() {
        assert_eq!(PowerAction::from_request("on"), PowerAction::On);
        assert_eq!(PowerAction::from_request("ON"), PowerAction::On);
        assert_eq!(PowerAction::from_request("off"), PowerAction::Off);
        assert_eq!(PowerAction::from_request("toggle"), PowerAction::Off);
        assert_eq!(PowerAction::from_request(" on"), PowerAction::Off);
    }

    #[test]
    fn debug_hides_local_key() {
        let target = OutletTarget {
            device_id: "d1".into(),
            local_key: "s3cret".into(),
            lan_ip: "10.0.0.5".into(),
        };
        let rendered = format!("{target:?}");
        assert!(!rendered.contains("s3cret"));
        assert!(rendered.contains("d1"));
    }
}
