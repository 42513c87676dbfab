//! ---
//! mrit_section: "03-persistence"
//! mrit_subsection: "module"
//! mrit_type: "source"
//! mrit_scope: "code"
//! mrit_description: "Site document persistence and device registry."
//! mrit_version: "v0.1.0"
//! mrit_owner: "tbd"
//! ---
use std::fmt;

use parking_lot::{Mutex, RwLock};
use tracing::{error, info};

use crate::model::{DeviceEntry, DeviceRecord, SiteConfiguration, SiteMetadata};
use crate::store::ConfigStore;
use crate::Result;

/// Full replacement for one device record.
#[derive(Clone, PartialEq)]
pub struct DeviceUpdate {
    /// Vendor device identifier.
    pub device_id: String,
    /// Display name.
    pub name: String,
    /// Shared secret for the local protocol session.
    pub local_key: String,
    /// LAN address.
    pub lan_ip: String,
    /// Vendor protocol version.
    pub version: f64,
}

impl fmt::Debug for DeviceUpdate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceUpdate")
            .field("device_id", &self.device_id)
            .field("name", &self.name)
            .field("lan_ip", &self.lan_ip)
            .field("version", &self.version)
            .finish_non_exhaustive()
    }
}

/// In-memory mirror of the site document and its only writer.
///
/// Readers take the `RwLock` briefly and never wait on disk. Writers additionally
/// hold `write_lock` across mutation and save, so saves land in the same order as
/// the mutations they carry.
pub struct DeviceRegistry {
    store: ConfigStore,
    state: RwLock<SiteConfiguration>,
    write_lock: Mutex<()>,
}

impl DeviceRegistry {
    /// Wrap an already loaded document.
    pub fn new(store: ConfigStore, config: SiteConfiguration) -> Self {
        Self {
            store,
            state: RwLock::new(config),
            write_lock: Mutex::new(()),
        }
    }

    /// Load (or create) the document behind `store` and wrap it.
    pub fn open(store: ConfigStore) -> Result<Self> {
        let config = store.load_or_create()?;
        Ok(Self::new(store, config))
    }

    /// Store backing this registry.
    pub fn store(&self) -> &ConfigStore {
        &self.store
    }

    /// Overwrite the record for `update.device_id` and persist the document.
    ///
    /// Returns `false` when the record was rejected or the save failed. A failed save
    /// is logged; the in-memory mirror keeps the new record either way.
    pub fn upsert(&self, update: DeviceUpdate) -> bool {
        let device_id = update.device_id.clone();
        match self.try_upsert(update) {
            Ok(_) => true,
            Err(err) => {
                error!(device_id = %device_id, error = %err, "failed to save device");
                false
            }
        }
    }

    /// Fallible form of [`DeviceRegistry::upsert`].
    pub fn try_upsert(&self, update: DeviceUpdate) -> Result<DeviceRecord> {
        let DeviceUpdate {
            device_id,
            name,
            local_key,
            lan_ip,
            version,
        } = update;
        let record = DeviceRecord::stamped(name, local_key, lan_ip, version);
        record.validate(&device_id)?;

        let _writer = self.write_lock.lock();
        let snapshot = {
            let mut state = self.state.write();
            state.devices.insert(device_id.clone(), record.clone());
            state.clone()
        };
        self.store.save(&snapshot)?;
        info!(
            site = %snapshot.site_name,
            device_id = %device_id,
            name = %record.name,
            version = record.version,
            "device saved"
        );
        Ok(record)
    }

    /// Registered devices with identifiers attached, in persisted order.
    pub fn list(&self) -> Vec<DeviceEntry> {
        self.state
            .read()
            .devices
            .iter()
            .map(|(id, record)| DeviceEntry {
                tuya_device_id: id.clone(),
                record: record.clone(),
            })
            .collect()
    }

    /// Look up a single record.
    pub fn get(&self, device_id: &str) -> Option<DeviceRecord> {
        self.state.read().devices.get(device_id).cloned()
    }

    /// Number of registered devices.
    pub fn len(&self) -> usize {
        self.state.read().devices.len()
    }

    /// True when no device has been registered yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Site identity and device count for status reporting.
    pub fn site_metadata(&self) -> SiteMetadata {
        let state = self.state.read();
        SiteMetadata {
            site_name: state.site_name.clone(),
            http_port: state.http_port,
            device_count: state.devices.len(),
        }
    }

    /// Clone of the whole in-memory document.
    pub fn snapshot(&self) -> SiteConfiguration {
        self.state.read().clone()
    }
}

impl fmt::Debug for DeviceRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceRegistry")
            .field("path", &self.store.path())
            .field("devices", &self.len())
            .finish_non_exhaustive()
    }
}
