//! ---
//! mrit_section: "05-networking-external-interfaces"
//! mrit_subsection: "module"
//! mrit_type: "source"
//! mrit_scope: "code"
//! mrit_description: "Outlet connectivity and power command dispatch."
//! mrit_version: "v0.1.0"
//! mrit_owner: "tbd"
//! ---
//! Connector that delegates the vendor protocol to an external client program.
//!
//! Each command runs the program once as
//! `<program> [args..] <device_id> <lan_ip> <version> <on|off>` with the local key
//! in `MRIT_LOCAL_KEY`. The program prints a JSON reply on stdout and exits 0.

use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::process::Command;
use tracing::debug;

use crate::session::{OutletConnector, OutletSession, OutletTarget, PowerAction};
use crate::{format_version, DeviceError, DEFAULT_PROTOCOL_VERSION};

/// Environment variable carrying the local key to the client program.
pub const LOCAL_KEY_ENV: &str = "MRIT_LOCAL_KEY";

#[derive(Debug)]
struct BridgeProgram {
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

/// Opens sessions backed by an external protocol client.
#[derive(Debug, Clone)]
pub struct BridgeConnector {
    program: Arc<BridgeProgram>,
}

impl BridgeConnector {
    /// `timeout` bounds each client invocation; it is fixed for the connector's lifetime.
    pub fn new(program: impl Into<String>, args: Vec<String>, timeout: Duration) -> Self {
        Self {
            program: Arc::new(BridgeProgram {
                program: program.into(),
                args,
                timeout,
            }),
        }
    }
}

impl OutletConnector for BridgeConnector {
    fn open(&self, target: &OutletTarget) -> Result<Box<dyn OutletSession>, DeviceError> {
        Ok(Box::new(BridgeSession {
            program: Arc::clone(&self.program),
            target: target.clone(),
            version: DEFAULT_PROTOCOL_VERSION,
        }))
    }
}

struct BridgeSession {
    program: Arc<BridgeProgram>,
    target: OutletTarget,
    version: f64,
}

impl BridgeSession {
    async fn invoke(&self, action: PowerAction) -> Result<Value, DeviceError> {
        let bridge = &self.program;
        let mut command = Command::new(&bridge.program);
        command
            .args(&bridge.args)
            .arg(&self.target.device_id)
            .arg(&self.target.lan_ip)
            .arg(format_version(self.version))
            .arg(action.as_str())
            .env(LOCAL_KEY_ENV, &self.target.local_key)
            .stdin(Stdio::null())
            .kill_on_drop(true);

        debug!(program = %bridge.program, device_id = %self.target.device_id, action = action.as_str(), "invoking device client");
        let output = tokio::time::timeout(bridge.timeout, command.output())
            .await
            .map_err(|_| DeviceError::Timeout {
                device_id: self.target.device_id.clone(),
                lan_ip: self.target.lan_ip.clone(),
                timeout: bridge.timeout,
            })?
            .map_err(|source| DeviceError::Launch {
                program: bridge.program.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(DeviceError::ClientFailed {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_owned(),
            });
        }
        serde_json::from_slice(&output.stdout)
            .map_err(|err| DeviceError::MalformedReply(err.to_string()))
    }
}

#[async_trait]
impl OutletSession for BridgeSession {
    fn set_protocol_version(&mut self, version: f64) {
        self.version = version;
    }

    async fn turn_on(&mut self) -> Result<Value, DeviceError> {
        self.invoke(PowerAction::On).await
    }

    async fn turn_off(&mut self) -> Result<Value, DeviceError> {
        self.invoke(PowerAction::Off).await
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use serde_json::json;

    fn target() -> OutletTarget {
        OutletTarget {
            device_id: "d1".into(),
            local_key: "s3cret".into(),
            lan_ip: "10.0.0.5".into(),
        }
    }

    fn shell(script: &str, timeout: Duration) -> BridgeConnector {
        // `sh -c script name args..` binds the per-command arguments to $1..$4
        BridgeConnector::new(
            "sh",
            vec!["-c".into(), script.into(), "bridge".into()],
            timeout,
        )
    }

    #[tokio::test]
    async fn passes_arguments_and_key() {
        let connector = shell(
            r#"printf '{"success": true, "id": "%s", "ip": "%s", "ver": "%s", "act": "%s", "key": "%s"}' "$1" "$2" "$3" "$4" "$MRIT_LOCAL_KEY""#,
            Duration::from_secs(5),
        );
        let mut session = connector.open(&target()).unwrap();
        session.set_protocol_version(3.4);
        let reply = session.turn_on().await.unwrap();
        assert_eq!(
            reply,
            json!({"success": true, "id": "d1", "ip": "10.0.0.5", "ver": "3.4", "act": "on", "key": "s3cret"})
        );

        let reply = session.turn_off().await.unwrap();
        assert_eq!(reply["act"], "off");
    }

    #[tokio::test]
    async fn non_zero_exit_is_client_failure() {
        let connector = shell("echo 'device unreachable' >&2; exit 3", Duration::from_secs(5));
        let mut session = connector.open(&target()).unwrap();
        let err = session.turn_on().await.unwrap_err();
        match err {
            DeviceError::ClientFailed { stderr, .. } => assert_eq!(stderr, "device unreachable"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn non_json_reply_is_malformed() {
        let connector = shell("echo not-json", Duration::from_secs(5));
        let mut session = connector.open(&target()).unwrap();
        assert!(matches!(
            session.turn_off().await,
            Err(DeviceError::MalformedReply(_))
        ));
    }

    #[tokio::test]
    async fn slow_client_times_out() {
        let connector = shell("sleep 5", Duration::from_millis(100));
        let mut session = connector.open(&target()).unwrap();
        assert!(matches!(
            session.turn_on().await,
            Err(DeviceError::Timeout { .. })
        ));
    }

    #[tokio::test]
    async fn missing_program_is_launch_failure() {
        let connector = BridgeConnector::new(
            "/nonexistent/mrit-outlet-bridge",
            Vec::new(),
            Duration::from_secs(1),
        );
        let mut session = connector.open(&target()).unwrap();
        assert!(matches!(
            session.turn_on().await,
            Err(DeviceError::Launch { .. })
        ));
    }
}
