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
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{error, info};

use crate::session::{OutletConnector, OutletTarget, PowerAction};
use crate::{format_version, DeviceError};

/// One power command as accepted from the API.
#[derive(Clone, PartialEq)]
pub struct PowerCommand {
    /// Vendor device identifier.
    pub device_id: String,
    /// Requested action as received; see [`PowerAction::from_request`].
    pub action: String,
    /// Shared secret for the local session.
    pub local_key: String,
    /// LAN address.
    pub lan_ip: String,
    /// Display name echoed back on success.
    pub device_name: String,
    /// Vendor protocol version.
    pub version: f64,
}

impl fmt::Debug for PowerCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PowerCommand")
            .field("device_id", &self.device_id)
            .field("action", &self.action)
            .field("lan_ip", &self.lan_ip)
            .field("device_name", &self.device_name)
            .field("version", &self.version)
            .finish_non_exhaustive()
    }
}

/// Normalised outcome of a power command.
///
/// Serialises as `{success: true, message, device_name}` or `{success: false, error}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandResult {
    /// Whether the device acknowledged the command.
    pub success: bool,
    /// Confirmation text on success.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Echo of the device display name on success.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_name: Option<String>,
    /// Failure description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CommandResult {
    /// Successful outcome.
    pub fn succeeded(message: impl Into<String>, device_name: impl Into<String>) -> Self {
        Self {
            success: true,
            message: Some(message.into()),
            device_name: Some(device_name.into()),
            error: None,
        }
    }

    /// Failed outcome.
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            message: None,
            device_name: None,
            error: Some(error.into()),
        }
    }
}

/// Sends power commands through a connector, one attempt each.
#[derive(Clone)]
pub struct CommandDispatcher {
    connector: Arc<dyn OutletConnector>,
    site_name: String,
}

impl CommandDispatcher {
    /// `site_name` tags every operational log line.
    pub fn new(connector: Arc<dyn OutletConnector>, site_name: impl Into<String>) -> Self {
        Self {
            connector,
            site_name: site_name.into(),
        }
    }

    /// Site name used in log lines.
    pub fn site_name(&self) -> &str {
        &self.site_name
    }

    /// Deliver `command`. Never fails: every error becomes a failed [`CommandResult`].
    pub async fn send(&self, command: &PowerCommand) -> CommandResult {
        let action = PowerAction::from_request(&command.action);
        info!(
            site = %self.site_name,
            device_id = %command.device_id,
            device_name = %command.device_name,
            lan_ip = %command.lan_ip,
            version = %format_version(command.version),
            action = %command.action,
            "sending power command"
        );

        match self.deliver(command, action).await {
            Ok(reply) => {
                info!(site = %self.site_name, device_id = %command.device_id, reply = %reply, "device replied");
                if reply_succeeded(&reply) {
                    CommandResult::succeeded(
                        format!("Command {} sent successfully", command.action),
                        command.device_name.clone(),
                    )
                } else {
                    CommandResult::failed(reply.to_string())
                }
            }
            Err(err) => {
                error!(site = %self.site_name, device_id = %command.device_id, error = %err, "power command failed");
                CommandResult::failed(err.to_string())
            }
        }
    }

    async fn deliver(
        &self,
        command: &PowerCommand,
        action: PowerAction,
    ) -> Result<Value, DeviceError> {
        let target = OutletTarget {
            device_id: command.device_id.clone(),
            local_key: command.local_key.clone(),
            lan_ip: command.lan_ip.clone(),
        };
        let mut session = self.connector.open(&target)?;
        session.set_protocol_version(command.version);
        match action {
            PowerAction::On => session.turn_on().await,
            PowerAction::Off => session.turn_off().await,
        }
    }
}

impl fmt::Debug for CommandDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandDispatcher")
            .field("site_name", &self.site_name)
            .finish_non_exhaustive()
    }
}

/// A reply counts as success only when it is an object with a truthy `success`.
fn reply_succeeded(reply: &Value) -> bool {
    match reply.get("success") {
        Some(Value::Bool(flag)) => *flag,
        Some(Value::Number(n)) => n.as_f64().is_some_and(|v| v != 0.0),
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Array(items)) => !items.is_empty(),
        Some(Value::Object(map)) => !map.is_empty(),
        Some(Value::Null) | None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::OutletSession;
    use crate::SimulatedConnector;
    use async_trait::async_trait;
    use serde_json::json;

    fn command(device_id: &str, action: &str) -> PowerCommand {
        PowerCommand {
            device_id: device_id.into(),
            action: action.into(),
            local_key: "k".into(),
            lan_ip: "10.0.0.5".into(),
            device_name: "Lamp".into(),
            version: 3.3,
        }
    }

    struct FixedReply(Value);

    struct FixedSession(Value);

    #[async_trait]
    impl OutletSession for FixedSession {
        fn set_protocol_version(&mut self, _version: f64) {}

        async fn turn_on(&mut self) -> Result<Value, DeviceError> {
            Ok(self.0.clone())
        }

        async fn turn_off(&mut self) -> Result<Value, DeviceError> {
            Ok(self.0.clone())
        }
    }

    impl OutletConnector for FixedReply {
        fn open(&self, _target: &OutletTarget) -> Result<Box<dyn OutletSession>, DeviceError> {
            Ok(Box::new(FixedSession(self.0.clone())))
        }
    }

    struct RefusingConnector;

    impl OutletConnector for RefusingConnector {
        fn open(&self, target: &OutletTarget) -> Result<Box<dyn OutletSession>, DeviceError> {
            Err(DeviceError::Authentication(target.device_id.clone()))
        }
    }

    #[tokio::test]
    async fn success_echoes_action_and_name() {
        let connector = SimulatedConnector::new();
        let dispatcher = CommandDispatcher::new(Arc::new(connector.clone()), "Site A");

        let result = dispatcher.send(&command("d1", "ON")).await;
        assert_eq!(
            serde_json::to_value(&result).unwrap(),
            json!({"success": true, "message": "Command ON sent successfully", "device_name": "Lamp"})
        );
        assert_eq!(connector.power_state("d1"), Some(true));
    }

    #[tokio::test]
    async fn unknown_action_switches_off() {
        let connector = SimulatedConnector::new();
        let dispatcher = CommandDispatcher::new(Arc::new(connector.clone()), "Site A");
        let result = dispatcher.send(&command("d1", "toggle")).await;
        assert!(result.success);
        assert_eq!(connector.power_state("d1"), Some(false));
    }

    #[tokio::test]
    async fn unreachable_device_is_normalised() {
        let connector = SimulatedConnector::new().with_unreachable(["d1"]);
        let dispatcher = CommandDispatcher::new(Arc::new(connector), "Site A");
        let result = dispatcher.send(&command("d1", "on")).await;
        assert!(!result.success);
        assert_eq!(
            result.error.as_deref(),
            Some("device d1 at 10.0.0.5 is unreachable")
        );
        assert_eq!(
            serde_json::to_value(&result).unwrap(),
            json!({"success": false, "error": "device d1 at 10.0.0.5 is unreachable"})
        );
    }

    #[tokio::test]
    async fn open_failure_is_normalised() {
        let dispatcher = CommandDispatcher::new(Arc::new(RefusingConnector), "Site A");
        let result = dispatcher.send(&command("d1", "off")).await;
        assert_eq!(
            result.error.as_deref(),
            Some("authentication with device d1 failed")
        );
    }

    #[tokio::test]
    async fn non_success_reply_is_stringified() {
        let reply = json!({"Error": "Device Unreachable", "Err": "905"});
        let dispatcher = CommandDispatcher::new(Arc::new(FixedReply(reply.clone())), "Site A");
        let result = dispatcher.send(&command("d1", "on")).await;
        assert!(!result.success);
        assert_eq!(result.error, Some(reply.to_string()));
    }

    #[test]
    fn truthiness_follows_reply_shape() {
        assert!(reply_succeeded(&json!({"success": true})));
        assert!(reply_succeeded(&json!({"success": 1})));
        assert!(!reply_succeeded(&json!({"success": false})));
        assert!(!reply_succeeded(&json!({"success": ""})));
        assert!(!reply_succeeded(&json!({"dps": {"1": true}})));
        assert!(!reply_succeeded(&json!(true)));
        assert!(!reply_succeeded(&json!(null)));
    }
}
