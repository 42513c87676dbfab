//! ---
//! mrit_section: "05-networking-external-interfaces"
//! mrit_subsection: "module"
//! mrit_type: "source"
//! mrit_scope: "code"
//! mrit_description: "Networking API surface for LAN clients."
//! mrit_version: "v0.1.0"
//! mrit_owner: "tbd"
//! ---
//! Validation of `POST /command` bodies.

use mrit_device::{PowerCommand, DEFAULT_PROTOCOL_VERSION};
use mrit_registry::DEFAULT_DEVICE_NAME;
use serde_json::{Map, Value};

const REQUIRED_FIELDS: [&str; 4] = ["tuya_device_id", "action", "local_key", "lan_ip"];

/// Caller input that cannot be turned into a [`PowerCommand`]. Reported as HTTP 400.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("empty request body")]
    EmptyBody,
    #[error("invalid JSON: {0}")]
    InvalidJson(String),
    #[error("request body must be a JSON object")]
    NotAnObject,
    #[error("missing or empty field: {0}")]
    MissingField(&'static str),
    #[error("field must be a string: {0}")]
    NotAString(&'static str),
}

/// Parse and validate a raw request body.
pub fn parse_command(body: &[u8]) -> Result<PowerCommand, ValidationError> {
    if body.is_empty() {
        return Err(ValidationError::EmptyBody);
    }
    let value: Value = serde_json::from_slice(body)
        .map_err(|err| ValidationError::InvalidJson(err.to_string()))?;
    let Value::Object(fields) = value else {
        return Err(ValidationError::NotAnObject);
    };

    for name in REQUIRED_FIELDS {
        if is_blank(fields.get(name)) {
            return Err(ValidationError::MissingField(name));
        }
    }

    Ok(PowerCommand {
        device_id: required_text(&fields, "tuya_device_id")?,
        action: required_text(&fields, "action")?,
        local_key: required_text(&fields, "local_key")?,
        lan_ip: required_text(&fields, "lan_ip")?,
        device_name: device_name(fields.get("device_name")),
        version: protocol_version(fields.get("version")),
    })
}

/// Absent, `null`, `""` and `[]` all count as missing.
fn is_blank(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.is_empty(),
        Some(Value::Array(items)) => items.is_empty(),
        Some(_) => false,
    }
}

fn required_text(fields: &Map<String, Value>, name: &'static str) -> Result<String, ValidationError> {
    match fields.get(name) {
        Some(Value::String(s)) => Ok(s.clone()),
        Some(Value::Number(n)) => Ok(n.to_string()),
        Some(Value::Bool(b)) => Ok(b.to_string()),
        _ => Err(ValidationError::NotAString(name)),
    }
}

fn device_name(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) if !s.is_empty() => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => DEFAULT_DEVICE_NAME.to_owned(),
    }
}

/// Any value that does not read as a finite number falls back to 3.3 without error.
fn protocol_version(value: Option<&Value>) -> f64 {
    let parsed = match value {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        Some(Value::Bool(b)) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    };
    parsed
        .filter(|v| v.is_finite())
        .unwrap_or(DEFAULT_PROTOCOL_VERSION)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn body(value: Value) -> Vec<u8> {
        serde_json::to_vec(&value).unwrap()
    }

    fn minimal() -> Value {
        json!({"tuya_device_id": "d1", "action": "on", "local_key": "k", "lan_ip": "10.0.0.5"})
    }

    #[test]
    fn minimal_body_takes_defaults() {
        let command = parse_command(&body(minimal())).unwrap();
        assert_eq!(command.device_id, "d1");
        assert_eq!(command.action, "on");
        assert_eq!(command.device_name, DEFAULT_DEVICE_NAME);
        assert_eq!(command.version, 3.3);
    }

    #[test]
    fn reports_first_missing_field() {
        let mut value = minimal();
        value["local_key"] = json!("");
        value["lan_ip"] = Value::Null;
        assert_eq!(
            parse_command(&body(value)),
            Err(ValidationError::MissingField("local_key"))
        );

        let mut value = minimal();
        value.as_object_mut().unwrap().remove("tuya_device_id");
        let err = parse_command(&body(value)).unwrap_err();
        assert_eq!(err.to_string(), "missing or empty field: tuya_device_id");

        let mut value = minimal();
        value["action"] = json!([]);
        assert_eq!(
            parse_command(&body(value)),
            Err(ValidationError::MissingField("action"))
        );
    }

    #[test]
    fn structured_values_are_rejected() {
        let mut value = minimal();
        value["lan_ip"] = json!({"addr": "10.0.0.5"});
        assert_eq!(
            parse_command(&body(value)),
            Err(ValidationError::NotAString("lan_ip"))
        );
    }

    #[test]
    fn numeric_identifiers_become_text() {
        let mut value = minimal();
        value["tuya_device_id"] = json!(12345);
        assert_eq!(parse_command(&body(value)).unwrap().device_id, "12345");
    }

    #[test]
    fn version_parsing_falls_back_silently() {
        let cases = [
            (json!(3.4), 3.4),
            (json!("3.1"), 3.1),
            (json!(" 3.5 "), 3.5),
            (json!("abc"), 3.3),
            (json!(null), 3.3),
            (json!({"v": 1}), 3.3),
            (json!("NaN"), 3.3),
            (json!(true), 1.0),
            (json!(false), 0.0),
            (json!(0), 0.0),
            (json!(-3.3), -3.3),
        ];
        for (raw, expected) in cases {
            let mut value = minimal();
            value["version"] = raw.clone();
            assert_eq!(
                parse_command(&body(value)).unwrap().version,
                expected,
                "version {raw}"
            );
        }
    }

    #[test]
    fn empty_device_name_uses_default() {
        let mut value = minimal();
        value["device_name"] = json!("");
        assert_eq!(parse_command(&body(value)).unwrap().device_name, "Device");
        let mut value = minimal();
        value["device_name"] = json!("Kitchen");
        assert_eq!(parse_command(&body(value)).unwrap().device_name, "Kitchen");
    }

    #[test]
    fn rejects_non_object_and_bad_json() {
        assert_eq!(parse_command(b""), Err(ValidationError::EmptyBody));
        assert_eq!(parse_command(b"[1, 2]"), Err(ValidationError::NotAnObject));
        let err = parse_command(b"{\"tuya_device_id\": ").unwrap_err();
        assert!(err.to_string().starts_with("invalid JSON:"));
    }
}
