//! Wire format for gateway frames.
//!
//! Every frame in both directions is one JSON envelope: a `type` tag, a
//! free-form `data` payload, and an optional `groups` routing list that only
//! ever appears on inbound echo frames. Unknown fields are ignored so older
//! clients keep working when the payloads grow.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ApiError;

// Inbound message types.
pub const TYPE_ECHO: &str = "echo.message";
pub const TYPE_CREATE_TRIP: &str = "create.trip";
pub const TYPE_UPDATE_TRIP: &str = "update.trip";

// Outbound message types.
pub const TYPE_TRIP_CREATED: &str = "trip.created";
pub const TYPE_TRIP_UPDATED: &str = "trip.updated";
pub const TYPE_ERROR: &str = "error.message";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: String,
    /// Payload shape depends on `kind`; echo frames may carry any JSON value
    /// here, including a bare string.
    #[serde(default)]
    pub data: Value,
    /// Target groups for an echo republish. Stripped before delivery and
    /// never set on server-originated frames.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub groups: Option<Vec<String>>,
}

impl Envelope {
    pub fn new(kind: &str, data: Value) -> Self {
        Self {
            kind: kind.to_string(),
            data,
            groups: None,
        }
    }

    /// Render an `ApiError` as an `error.message` frame. The data payload
    /// mirrors the HTTP error body so clients share one error decoder.
    pub fn error(err: &ApiError) -> Self {
        let mut data = serde_json::Map::new();
        data.insert("code".to_string(), Value::String(err.code.clone()));
        data.insert("message".to_string(), Value::String(err.message.clone()));
        if let Some(details) = &err.details {
            data.insert(
                "details".to_string(),
                serde_json::to_value(details).unwrap_or(Value::Null),
            );
        }
        Self::new(TYPE_ERROR, Value::Object(data))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn groups_field_is_omitted_when_absent() {
        let envelope = Envelope::new(TYPE_ECHO, json!("hello"));
        let wire = serde_json::to_string(&envelope).unwrap();
        assert_eq!(wire, r#"{"type":"echo.message","data":"hello"}"#);
    }

    #[test]
    fn parses_echo_with_groups_and_bare_string_data() {
        let wire = r#"{"type":"echo.message","data":"ping","groups":["drivers"]}"#;
        let envelope: Envelope = serde_json::from_str(wire).unwrap();
        assert_eq!(envelope.kind, TYPE_ECHO);
        assert_eq!(envelope.data, json!("ping"));
        assert_eq!(envelope.groups, Some(vec!["drivers".to_string()]));
    }

    #[test]
    fn missing_data_defaults_to_null() {
        let envelope: Envelope = serde_json::from_str(r#"{"type":"echo.message"}"#).unwrap();
        assert!(envelope.data.is_null());
        assert!(envelope.groups.is_none());
    }

    #[test]
    fn error_frame_carries_code_and_message() {
        let err = ApiError::not_found("Trip not found");
        let envelope = Envelope::error(&err);
        assert_eq!(envelope.kind, TYPE_ERROR);
        assert_eq!(envelope.data["code"], "NOT_FOUND");
        assert_eq!(envelope.data["message"], "Trip not found");
        assert!(envelope.data.get("details").is_none());
    }

    #[test]
    fn error_frame_includes_validation_details() {
        let err = ApiError::validation(vec![crate::error::FieldError {
            field: "pick_up_address".to_string(),
            message: "Pick-up address is required".to_string(),
        }]);
        let envelope = Envelope::error(&err);
        assert_eq!(envelope.data["code"], "VALIDATION_ERROR");
        assert_eq!(envelope.data["details"][0]["field"], "pick_up_address");
    }
}
