// ============================================
// File: crates/mowlink-core/src/telemetry.rs
// ============================================
//! # Thing Telemetry Model
//!
//! ## Creation Reason
//! Inbound broker messages are JSON documents whose shape depends on the
//! `method` field and, for events, on `params.identifier`. This module
//! turns them into closed Rust enums so the router can `match` instead of
//! probing maps.
//!
//! ## Main Functionality
//! - `ThingMessage::parse()`: one entry point for every inbound payload
//! - `ThingEvent`: typed event payloads with an explicit `Unknown`
//! - `PropertySnapshot`: the property items the controller reads
//!
//! ## Message Shapes
//! ```text
//! thing.properties  {params: {iotId, items: {batteryPercentage: {time, value}}}}
//! thing.events      {params: {iotId, identifier, value: {...}}}
//! thing.status      {params: {iotId, status: {time, value}}}
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - Unknown `method` or `identifier` values are NOT errors
//! - Only a document that is not JSON, or a known message that lacks
//!   `params.iotId`, is rejected
//!
//! ## Last Modified
//! v0.1.0 - Initial telemetry model

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde_json::Value;

use crate::error::{CoreError, Result};

// ============================================
// Constants
// ============================================

/// Method of property snapshot messages.
pub const METHOD_PROPERTIES: &str = "thing.properties";
/// Method of event messages.
pub const METHOD_EVENTS: &str = "thing.events";
/// Method of connectivity messages.
pub const METHOD_STATUS: &str = "thing.status";

/// Identifier of events that carry a binary device message.
pub const EVENT_DEVICE_PROTOBUF: &str = "device_protobuf_msg_event";

/// Status value reported for an online device.
const STATUS_ONLINE: i64 = 1;

// ============================================
// PropertySnapshot
// ============================================

/// One timestamped property value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PropertyItem<T> {
    /// Device-side time in unix milliseconds
    pub time: i64,
    /// Value
    pub value: T,
}

/// The property items the controller consumes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertySnapshot {
    /// Reporting device
    pub iot_id: String,
    /// Battery percentage, when present in this snapshot
    pub battery: Option<PropertyItem<u8>>,
}

// ============================================
// ThingEvent
// ============================================

/// Payload of a `thing.events` message, selected by its identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ThingEvent {
    /// Binary device message, already base64-decoded
    DeviceProtobuf {
        /// Raw protobuf bytes
        content: Vec<u8>,
    },
    /// Device warning
    Warning {
        /// Warning code
        code: i64,
    },
    /// Device notification or warning-code notification
    Notification {
        /// Opaque notification data
        data: String,
    },
    /// Business request raised by the device
    BusinessRequest {
        /// Request type
        biz_type: String,
        /// Request id
        biz_id: String,
        /// Opaque parameters
        params: String,
    },
    /// Configuration request raised by the device
    ConfigurationRequest {
        /// Request id
        biz_id: String,
        /// Opaque parameters
        params: String,
    },
    /// Identifier this controller does not know
    Unknown {
        /// The identifier as received
        identifier: String,
    },
}

impl ThingEvent {
    /// Decodes an event from its identifier and `params.value` object.
    ///
    /// # Errors
    /// Returns a decode error only when a device protobuf event carries
    /// content that is not valid base64.
    pub fn from_parts(identifier: &str, value: &Value) -> Result<Self> {
        let event = match identifier {
            EVENT_DEVICE_PROTOBUF => {
                let content = str_field(value, "content");
                Self::DeviceProtobuf {
                    content: BASE64.decode(content)?,
                }
            }
            "device_warning_event" => Self::Warning {
                code: value.get("code").and_then(Value::as_i64).unwrap_or_default(),
            },
            "device_notification_event" | "device_warning_code_event" => Self::Notification {
                data: str_field(value, "data").to_string(),
            },
            "device_biz_req_event" => Self::BusinessRequest {
                biz_type: str_field(value, "bizType").to_string(),
                biz_id: str_field(value, "bizId").to_string(),
                params: str_field(value, "params").to_string(),
            },
            "device_config_req_event" => Self::ConfigurationRequest {
                biz_id: str_field(value, "bizId").to_string(),
                params: str_field(value, "params").to_string(),
            },
            other => Self::Unknown {
                identifier: other.to_string(),
            },
        };
        Ok(event)
    }

    /// Short name used in logs.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::DeviceProtobuf { .. } => "device_protobuf",
            Self::Warning { .. } => "warning",
            Self::Notification { .. } => "notification",
            Self::BusinessRequest { .. } => "business_request",
            Self::ConfigurationRequest { .. } => "configuration_request",
            Self::Unknown { .. } => "unknown",
        }
    }
}

// ============================================
// ThingMessage
// ============================================

/// An inbound broker message, classified by `method`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ThingMessage {
    /// `thing.properties`
    Properties(PropertySnapshot),
    /// `thing.events`
    Event {
        /// Reporting device
        iot_id: String,
        /// Typed payload
        event: ThingEvent,
    },
    /// `thing.status`
    Status {
        /// Reporting device
        iot_id: String,
        /// Whether the device is online
        online: bool,
    },
    /// Any other method
    Unknown {
        /// The method as received, empty if absent
        method: String,
    },
}

impl ThingMessage {
    /// Parses a raw broker payload.
    ///
    /// # Errors
    /// Returns `MalformedJson` for a payload that is not JSON,
    /// `MissingField` when a known message has no `params.iotId`, and a
    /// decode error for undecodable protobuf content.
    pub fn parse(payload: &[u8]) -> Result<Self> {
        let doc: Value = serde_json::from_slice(payload)
            .map_err(|e| CoreError::malformed_json("telemetry", e))?;
        Self::from_value(&doc)
    }

    /// Classifies an already-parsed JSON document.
    ///
    /// # Errors
    /// See [`ThingMessage::parse`].
    pub fn from_value(doc: &Value) -> Result<Self> {
        let method = doc.get("method").and_then(Value::as_str).unwrap_or_default();
        let params = doc.get("params").unwrap_or(&Value::Null);

        let message = match method {
            METHOD_PROPERTIES => Self::Properties(PropertySnapshot {
                iot_id: iot_id(params)?,
                battery: params
                    .pointer("/items/batteryPercentage")
                    .and_then(battery_item),
            }),
            METHOD_EVENTS => {
                let identifier = params
                    .get("identifier")
                    .and_then(Value::as_str)
                    .unwrap_or_default();
                let value = params.get("value").unwrap_or(&Value::Null);
                Self::Event {
                    iot_id: iot_id(params)?,
                    event: ThingEvent::from_parts(identifier, value)?,
                }
            }
            METHOD_STATUS => Self::Status {
                iot_id: iot_id(params)?,
                online: params
                    .pointer("/status/value")
                    .and_then(int_value)
                    .is_some_and(|v| v == STATUS_ONLINE),
            },
            other => Self::Unknown {
                method: other.to_string(),
            },
        };
        Ok(message)
    }

    /// Device the message concerns, if known.
    #[must_use]
    pub fn iot_id(&self) -> Option<&str> {
        match self {
            Self::Properties(snapshot) => Some(&snapshot.iot_id),
            Self::Event { iot_id, .. } | Self::Status { iot_id, .. } => Some(iot_id),
            Self::Unknown { .. } => None,
        }
    }
}

// ============================================
// Helper Functions
// ============================================

fn iot_id(params: &Value) -> Result<String> {
    params
        .get("iotId")
        .and_then(Value::as_str)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .ok_or_else(|| CoreError::missing("params.iotId"))
}

fn str_field<'a>(value: &'a Value, key: &str) -> &'a str {
    value.get(key).and_then(Value::as_str).unwrap_or_default()
}

/// Accepts integers, floats and numeric strings.
#[allow(clippy::cast_possible_truncation)]
fn int_value(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.round() as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn battery_item(item: &Value) -> Option<PropertyItem<u8>> {
    let value = item.get("value").and_then(int_value)?;
    Some(PropertyItem {
        time: item.get("time").and_then(int_value).unwrap_or_default(),
        value: u8::try_from(value.clamp(0, 100)).ok()?,
    })
}

// ============================================
// Tests
// ============================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(doc: &Value) -> ThingMessage {
        ThingMessage::parse(doc.to_string().as_bytes()).unwrap()
    }

    #[test]
    fn test_properties_battery() {
        let msg = parse(&json!({
            "method": "thing.properties",
            "params": {
                "iotId": "dev-1",
                "items": {"batteryPercentage": {"time": 1_700_000_000_000_i64, "value": 76}}
            }
        }));
        let ThingMessage::Properties(snapshot) = msg else {
            panic!("expected properties");
        };
        assert_eq!(snapshot.iot_id, "dev-1");
        assert_eq!(
            snapshot.battery,
            Some(PropertyItem {
                time: 1_700_000_000_000,
                value: 76
            })
        );
    }

    #[test]
    fn test_properties_without_battery() {
        let msg = parse(&json!({
            "method": "thing.properties",
            "params": {"iotId": "dev-1", "items": {"knifeHeight": {"time": 1, "value": 40}}}
        }));
        assert!(matches!(msg, ThingMessage::Properties(PropertySnapshot { battery: None, .. })));
    }

    #[test]
    fn test_protobuf_event_decoded() {
        let msg = parse(&json!({
            "method": "thing.events",
            "params": {
                "iotId": "dev-1",
                "identifier": "device_protobuf_msg_event",
                "value": {"content": BASE64.encode([8u8, 244, 1])}
            }
        }));
        assert_eq!(
            msg,
            ThingMessage::Event {
                iot_id: "dev-1".into(),
                event: ThingEvent::DeviceProtobuf {
                    content: vec![8, 244, 1]
                }
            }
        );
    }

    #[test]
    fn test_typed_events() {
        let warning = ThingEvent::from_parts("device_warning_event", &json!({"code": 1002})).unwrap();
        assert_eq!(warning, ThingEvent::Warning { code: 1002 });

        let note = ThingEvent::from_parts("device_warning_code_event", &json!({"data": "x"})).unwrap();
        assert_eq!(note, ThingEvent::Notification { data: "x".into() });

        let biz = ThingEvent::from_parts(
            "device_biz_req_event",
            &json!({"bizType": "t", "bizId": "b", "params": "{}"}),
        )
        .unwrap();
        assert_eq!(biz.kind(), "business_request");

        let cfg = ThingEvent::from_parts("device_config_req_event", &json!({"bizId": "b"})).unwrap();
        assert!(matches!(cfg, ThingEvent::ConfigurationRequest { .. }));
    }

    #[test]
    fn test_unknown_identifier_is_not_an_error() {
        let event = ThingEvent::from_parts("device_lawn_event", &Value::Null).unwrap();
        assert_eq!(
            event,
            ThingEvent::Unknown {
                identifier: "device_lawn_event".into()
            }
        );
    }

    #[test]
    fn test_unknown_method_is_not_an_error() {
        let msg = parse(&json!({"method": "thing.lifecycle", "params": {}}));
        assert_eq!(
            msg,
            ThingMessage::Unknown {
                method: "thing.lifecycle".into()
            }
        );
        assert!(msg.iot_id().is_none());

        let msg = parse(&json!({"id": "1"}));
        assert!(matches!(msg, ThingMessage::Unknown { .. }));
    }

    #[test]
    fn test_status() {
        let msg = parse(&json!({
            "method": "thing.status",
            "params": {"iotId": "dev-1", "status": {"time": 1, "value": "1"}}
        }));
        assert_eq!(
            msg,
            ThingMessage::Status {
                iot_id: "dev-1".into(),
                online: true
            }
        );

        let msg = parse(&json!({
            "method": "thing.status",
            "params": {"iotId": "dev-1", "status": {"time": 2, "value": 3}}
        }));
        assert!(matches!(msg, ThingMessage::Status { online: false, .. }));
    }

    #[test]
    fn test_malformed_payloads() {
        let err = ThingMessage::parse(b"not json").unwrap_err();
        assert!(err.is_decode_error());

        let err = ThingMessage::parse(br#"{"method":"thing.properties","params":{}}"#).unwrap_err();
        assert!(matches!(err, CoreError::MissingField { .. }));

        let err = ThingMessage::parse(
            br#"{"method":"thing.events","params":{"iotId":"d","identifier":"device_protobuf_msg_event","value":{"content":"!!"}}}"#,
        )
        .unwrap_err();
        assert!(err.is_decode_error());
    }
}
