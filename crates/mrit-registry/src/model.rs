//! ---
//! mrit_section: "03-persistence"
//! mrit_subsection: "module"
//! mrit_type: "source"
//! mrit_scope: "code"
//! mrit_description: "Site document persistence and device registry."
//! mrit_version: "v0.1.0"
//! mrit_owner: "tbd"
//! ---
use chrono::Local;
use indexmap::IndexMap;
use mrit_common::{DEFAULT_HTTP_PORT, DEFAULT_SITE_NAME};
use serde::{Deserialize, Deserializer, Serialize};

use crate::{RegistryError, Result};

/// Format of [`DeviceRecord::last_updated`].
pub const LAST_UPDATED_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Display name stored when a request does not carry one.
pub const DEFAULT_DEVICE_NAME: &str = "Device";

fn default_site_name() -> String {
    DEFAULT_SITE_NAME.to_owned()
}

fn default_http_port() -> u16 {
    DEFAULT_HTTP_PORT
}

/// The persisted site document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SiteConfiguration {
    /// Human readable site identity, used to tag operational logs.
    #[serde(default = "default_site_name")]
    pub site_name: String,
    /// Port the HTTP API listens on.
    #[serde(default = "default_http_port")]
    pub http_port: u16,
    /// Device records keyed by vendor device identifier, in persisted order.
    #[serde(default)]
    pub devices: IndexMap<String, DeviceRecord>,
}

impl SiteConfiguration {
    /// Build an empty document for a new installation.
    pub fn new(site_name: impl Into<String>) -> Self {
        Self {
            site_name: site_name.into(),
            http_port: DEFAULT_HTTP_PORT,
            devices: IndexMap::new(),
        }
    }

    /// Check every device record, reporting the first violation.
    pub fn validate(&self) -> Result<()> {
        for (device_id, record) in &self.devices {
            record.validate(device_id)?;
        }
        Ok(())
    }
}

impl Default for SiteConfiguration {
    fn default() -> Self {
        Self::new(DEFAULT_SITE_NAME)
    }
}

/// Addressing and authentication data for one outlet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceRecord {
    /// Display name. Older documents may hold `null` or `""`; both load as
    /// [`DEFAULT_DEVICE_NAME`].
    #[serde(default = "default_device_name", deserialize_with = "device_name_or_default")]
    pub name: String,
    /// Shared secret for the device's local protocol session.
    pub local_key: String,
    /// LAN address of the device.
    pub lan_ip: String,
    /// Vendor protocol version, e.g. `3.3`.
    pub version: f64,
    /// Local wall-clock time of the last upsert.
    #[serde(default)]
    pub last_updated: String,
}

impl DeviceRecord {
    /// Build a record stamped with the current local time.
    pub fn stamped(
        name: impl Into<String>,
        local_key: impl Into<String>,
        lan_ip: impl Into<String>,
        version: f64,
    ) -> Self {
        Self {
            name: name.into(),
            local_key: local_key.into(),
            lan_ip: lan_ip.into(),
            version,
            last_updated: Local::now().format(LAST_UPDATED_FORMAT).to_string(),
        }
    }

    /// Every field except `last_updated` must be present and non-empty.
    pub fn validate(&self, device_id: &str) -> Result<()> {
        let invalid = |reason: &str| RegistryError::InvalidRecord {
            device_id: device_id.to_owned(),
            reason: reason.to_owned(),
        };
        if device_id.is_empty() {
            return Err(invalid("device identifier must not be empty"));
        }
        if self.name.is_empty() {
            return Err(invalid("name must not be empty"));
        }
        if self.local_key.is_empty() {
            return Err(invalid("local_key must not be empty"));
        }
        if self.lan_ip.is_empty() {
            return Err(invalid("lan_ip must not be empty"));
        }
        if !self.version.is_finite() {
            return Err(invalid("version must be a finite number"));
        }
        Ok(())
    }
}

fn default_device_name() -> String {
    DEFAULT_DEVICE_NAME.to_owned()
}

fn device_name_or_default<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let name = Option::<String>::deserialize(deserializer)?;
    Ok(name
        .filter(|name| !name.is_empty())
        .unwrap_or_else(default_device_name))
}

/// A record with its identifier attached, as served by `GET /devices`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceEntry {
    /// Vendor device identifier.
    pub tuya_device_id: String,
    /// Stored record fields, flattened next to the identifier.
    #[serde(flatten)]
    pub record: DeviceRecord,
}

/// Read-only projection used for status reporting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SiteMetadata {
    /// Configured site name.
    pub site_name: String,
    /// Configured HTTP port.
    pub http_port: u16,
    /// Number of registered devices.
    pub device_count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn missing_keys_take_defaults() {
        let config: SiteConfiguration = serde_json::from_value(json!({})).unwrap();
        assert_eq!(config.site_name, "Site Local");
        assert_eq!(config.http_port, 8080);
        assert!(config.devices.is_empty());
    }

    #[test]
    fn stamped_record_uses_local_timestamp_format() {
        let record = DeviceRecord::stamped("Lamp", "key", "10.0.0.5", 3.3);
        assert!(
            chrono::NaiveDateTime::parse_from_str(&record.last_updated, LAST_UPDATED_FORMAT)
                .is_ok()
        );
        record.validate("d1").unwrap();
    }

    #[test]
    fn empty_fields_are_rejected() {
        let record = DeviceRecord::stamped("", "key", "10.0.0.5", 3.3);
        let err = record.validate("d1").unwrap_err();
        assert!(err.to_string().contains("name"));

        let record = DeviceRecord::stamped("Lamp", "key", "10.0.0.5", 3.3);
        assert!(record.validate("").is_err());

        let record = DeviceRecord::stamped("Lamp", "key", "", 3.3);
        assert!(record.validate("d1").is_err());
    }

    #[test]
    fn any_finite_version_is_accepted() {
        for version in [0.0, -3.3, 1.0, 3.5] {
            DeviceRecord::stamped("Lamp", "key", "10.0.0.5", version)
                .validate("d1")
                .unwrap();
        }
        let record = DeviceRecord::stamped("Lamp", "key", "10.0.0.5", f64::NAN);
        assert!(record.validate("d1").is_err());
    }

    #[test]
    fn null_or_missing_name_loads_as_default() {
        let config: SiteConfiguration = serde_json::from_value(json!({
            "devices": {
                "d1": {"name": null, "local_key": "k", "lan_ip": "10.0.0.5", "version": 3.3},
                "d2": {"local_key": "k", "lan_ip": "10.0.0.6", "version": 3.3},
                "d3": {"name": "", "local_key": "k", "lan_ip": "10.0.0.7", "version": 3.3}
            }
        }))
        .unwrap();
        config.validate().unwrap();
        for record in config.devices.values() {
            assert_eq!(record.name, DEFAULT_DEVICE_NAME);
        }
    }

    #[test]
    fn entry_serialises_flat() {
        let entry = DeviceEntry {
            tuya_device_id: "d1".into(),
            record: DeviceRecord {
                name: "Lamp".into(),
                local_key: "k".into(),
                lan_ip: "10.0.0.5".into(),
                version: 3.4,
                last_updated: "2026-10-15 08:00:00".into(),
            },
        };
        assert_eq!(
            serde_json::to_value(&entry).unwrap(),
            json!({
                "tuya_device_id": "d1",
                "name": "Lamp",
                "local_key": "k",
                "lan_ip": "10.0.0.5",
                "version": 3.4,
                "last_updated": "2026-10-15 08:00:00"
            })
        );
    }
}
