//! The versioned wire envelope.
//!
//! Every message in either direction is `{version, type, payload}`.
//! Decoding enforces the presence of `version` and `type`; a violation
//! is a [`ProtocolError`] carrying enough context for the outbound
//! `error` event, and the connection stays open.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Wire protocol version tag.
pub const VERSION: &str = "v1";

/// Status code reported for malformed envelopes (invalid payload data).
pub const CODE_INVALID_PAYLOAD: u16 = 1007;

/// Status code reported for unknown or unprocessable message types.
pub const CODE_UNSUPPORTED_DATA: u16 = 1003;

/// The `{version, type, payload}` message unit.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Protocol version tag, `"v1"`.
    #[serde(default)]
    pub version: String,
    /// Type tag selecting the payload shape.
    #[serde(rename = "type", default)]
    pub kind: String,
    /// Type-specific payload, opaque at this layer.
    #[serde(default)]
    pub payload: Value,
}

/// Malformed inbound traffic. Recoverable: surfaced to the offending
/// client as an `error` event, never fatal to the connection.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum ProtocolError {
    /// `version` field empty or missing.
    #[error("message 'version' empty or missing")]
    MissingVersion,
    /// `type` field empty or missing.
    #[error("message 'type' empty or missing")]
    MissingType,
    /// The frame was not valid JSON at all.
    #[error("invalid JSON: {0}")]
    Json(String),
    /// The payload did not match the shape its type tag promises.
    #[error("invalid '{kind}' payload: {reason}")]
    Payload {
        /// Type tag of the offending envelope.
        kind: String,
        /// Deserializer diagnostic.
        reason: String,
    },
}

impl ProtocolError {
    /// The status code carried in the outbound `error` payload.
    pub fn code(&self) -> u16 {
        CODE_INVALID_PAYLOAD
    }
}

impl Envelope {
    /// Wrap a payload into a v1 envelope.
    ///
    /// Serialization of our own payload types cannot fail; a `Null`
    /// payload is substituted if it somehow does.
    pub fn v1<T: Serialize>(kind: &str, payload: &T) -> Self {
        Self {
            version: VERSION.to_string(),
            kind: kind.to_string(),
            payload: serde_json::to_value(payload).unwrap_or(Value::Null),
        }
    }

    /// Decode an inbound text frame, enforcing `version` and `type`.
    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        let envelope: Envelope =
            serde_json::from_str(text).map_err(|e| ProtocolError::Json(e.to_string()))?;
        if envelope.version.is_empty() {
            return Err(ProtocolError::MissingVersion);
        }
        if envelope.kind.is_empty() {
            return Err(ProtocolError::MissingType);
        }
        Ok(envelope)
    }

    /// Serialize to a text frame.
    pub fn encode(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }

    /// Parse the payload into the typed structure its kind promises.
    pub fn parse_payload<T: serde::de::DeserializeOwned>(&self) -> Result<T, ProtocolError> {
        serde_json::from_value(self.payload.clone()).map_err(|e| ProtocolError::Payload {
            kind: self.kind.clone(),
            reason: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use serde_json::json;

    use super::*;
    use crate::payload::PlayMove;

    #[test]
    fn decode_accepts_well_formed_frame() {
        let env =
            Envelope::decode(r#"{"version":"v1","type":"playMove","payload":{"column":3}}"#)
                .unwrap();
        assert_eq!(env.version, VERSION);
        assert_eq!(env.kind, "playMove");
        let mv: PlayMove = env.parse_payload().unwrap();
        assert_eq!(mv.column, 3);
    }

    #[test]
    fn decode_rejects_missing_version() {
        assert_matches!(
            Envelope::decode(r#"{"type":"playMove","payload":{}}"#),
            Err(ProtocolError::MissingVersion)
        );
        assert_matches!(
            Envelope::decode(r#"{"version":"","type":"playMove"}"#),
            Err(ProtocolError::MissingVersion)
        );
    }

    #[test]
    fn decode_rejects_missing_type() {
        assert_matches!(
            Envelope::decode(r#"{"version":"v1","payload":{}}"#),
            Err(ProtocolError::MissingType)
        );
        assert_matches!(
            Envelope::decode(r#"{"version":"v1","type":""}"#),
            Err(ProtocolError::MissingType)
        );
    }

    #[test]
    fn decode_rejects_non_json() {
        assert_matches!(Envelope::decode("not json"), Err(ProtocolError::Json(_)));
    }

    #[test]
    fn missing_payload_defaults_to_null() {
        let env = Envelope::decode(r#"{"version":"v1","type":"chatMessage"}"#).unwrap();
        assert_eq!(env.payload, Value::Null);
    }

    #[test]
    fn v1_round_trips_through_encode_decode() {
        let env = Envelope::v1("playMove", &PlayMove { column: 6 });
        let back = Envelope::decode(&env.encode()).unwrap();
        assert_eq!(back, env);
        assert_eq!(back.payload, json!({"column": 6}));
    }

    #[test]
    fn parse_payload_reports_shape_mismatch() {
        let env = Envelope::decode(r#"{"version":"v1","type":"playMove","payload":{"column":"x"}}"#)
            .unwrap();
        let err = env.parse_payload::<PlayMove>().unwrap_err();
        assert_matches!(err, ProtocolError::Payload { ref kind, .. } if kind == "playMove");
        assert_eq!(err.code(), CODE_INVALID_PAYLOAD);
    }
}
