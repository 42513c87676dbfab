//! ---
//! mrit_section: "05-networking-external-interfaces"
//! mrit_subsection: "module"
//! mrit_type: "source"
//! mrit_scope: "code"
//! mrit_description: "Outlet connectivity and power command dispatch."
//! mrit_version: "v0.1.0"
//! mrit_owner: "tbd"
//! ---
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};

use crate::session::{OutletConnector, OutletSession, OutletTarget, PowerAction};
use crate::{format_version, DeviceError, DEFAULT_PROTOCOL_VERSION};

/// In-memory outlets used in simulation mode and tests.
///
/// Every reachable device accepts any local key and remembers its last power state.
#[derive(Debug, Clone, Default)]
pub struct SimulatedConnector {
    outlets: Arc<Mutex<HashMap<String, bool>>>,
    unreachable: Arc<HashSet<String>>,
}

impl SimulatedConnector {
    /// Create a connector where every device is reachable.
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark the given device identifiers as unreachable.
    pub fn with_unreachable<I, S>(mut self, device_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.unreachable = Arc::new(device_ids.into_iter().map(Into::into).collect());
        self
    }

    /// Last power state commanded for `device_id`, if any.
    pub fn power_state(&self, device_id: &str) -> Option<bool> {
        self.outlets.lock().get(device_id).copied()
    }
}

impl OutletConnector for SimulatedConnector {
    fn open(&self, target: &OutletTarget) -> Result<Box<dyn OutletSession>, DeviceError> {
        Ok(Box::new(SimulatedSession {
            outlets: Arc::clone(&self.outlets),
            reachable: !self.unreachable.contains(&target.device_id),
            target: target.clone(),
            version: DEFAULT_PROTOCOL_VERSION,
        }))
    }
}

struct SimulatedSession {
    outlets: Arc<Mutex<HashMap<String, bool>>>,
    reachable: bool,
    target: OutletTarget,
    version: f64,
}

impl SimulatedSession {
    fn switch(&self, action: PowerAction) -> Result<Value, DeviceError> {
        if !self.reachable {
            return Err(DeviceError::Unreachable {
                device_id: self.target.device_id.clone(),
                lan_ip: self.target.lan_ip.clone(),
            });
        }
        let on = action == PowerAction::On;
        self.outlets
            .lock()
            .insert(self.target.device_id.clone(), on);
        Ok(json!({
            "success": true,
            "devId": self.target.device_id,
            "version": format_version(self.version),
            "dps": { "1": on },
        }))
    }
}

#[async_trait]
impl OutletSession for SimulatedSession {
    fn set_protocol_version(&mut self, version: f64) {
        self.version = version;
    }

    async fn turn_on(&mut self) -> Result<Value, DeviceError> {
        self.switch(PowerAction::On)
    }

    async fn turn_off(&mut self) -> Result<Value, DeviceError> {
        self.switch(PowerAction::Off)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target(device_id: &str) -> OutletTarget {
        OutletTarget {
            device_id: device_id.into(),
            local_key: "k".into(),
            lan_ip: "10.0.0.5".into(),
        }
    }

    #[tokio::test]
    async fn remembers_power_state() {
        let connector = SimulatedConnector::new();
        let mut session = connector.open(&target("d1")).unwrap();
        session.set_protocol_version(3.4);

        let reply = session.turn_on().await.unwrap();
        assert_eq!(reply["dps"]["1"], true);
        assert_eq!(reply["version"], "3.4");
        assert_eq!(connector.power_state("d1"), Some(true));

        session.turn_off().await.unwrap();
        assert_eq!(connector.power_state("d1"), Some(false));
        assert_eq!(connector.power_state("d2"), None);
    }

    #[tokio::test]
    async fn unreachable_devices_fail() {
        let connector = SimulatedConnector::new().with_unreachable(["dead"]);
        let mut session = connector.open(&target("dead")).unwrap();
        assert!(matches!(
            session.turn_on().await,
            Err(DeviceError::Unreachable { .. })
        ));
        assert_eq!(connector.power_state("dead"), None);
    }
}
