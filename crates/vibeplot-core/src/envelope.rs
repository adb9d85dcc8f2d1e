//! Wire envelope exchanged with the viewer.
//!
//! Every message is a single JSON object in one WebSocket text frame, tagged
//! by its `type` field:
//!
//! ```text
//! {"type": "load_model", "data": "<opaque string>"}
//! {"type": "reset_zoom"}
//! {"type": "reset_rotation"}
//! {"type": "ack", "success": true|false, "error": "<optional>"}
//! ```
//!
//! Unknown `type` values decode successfully as [`Inbound::Unrecognized`] so
//! the receiver can ignore them; only malformed framing is a [`DecodeError`].

use std::fmt;

use serde::Deserialize;
use serde_json::{Value, json};

use crate::errors::DecodeError;

/// The fixed set of envelope kinds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EnvelopeKind {
    /// Replace the displayed model.
    LoadModel,
    /// Reset the camera zoom.
    ResetZoom,
    /// Reset the model rotation.
    ResetRotation,
    /// Peer acknowledgement of a previous command.
    Ack,
}

impl EnvelopeKind {
    /// Every kind, in wire order.
    pub const ALL: [Self; 4] = [Self::LoadModel, Self::ResetZoom, Self::ResetRotation, Self::Ack];

    /// Tag value used in the `type` field.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::LoadModel => "load_model",
            Self::ResetZoom => "reset_zoom",
            Self::ResetRotation => "reset_rotation",
            Self::Ack => "ack",
        }
    }

    /// Parse a `type` tag. Returns `None` for tags outside the fixed set.
    #[must_use]
    pub fn from_wire(tag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == tag)
    }
}

impl fmt::Display for EnvelopeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A message with a kind from the fixed set.
///
/// Immutable once constructed. Outbound commands are built with the
/// constructor helpers; inbound frames come through [`Envelope::decode`].
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Envelope {
    /// Opaque model text for the viewer to render.
    LoadModel {
        /// Model payload, passed through untouched.
        data: String,
    },
    /// Reset zoom to the default.
    ResetZoom,
    /// Reset rotation to the default.
    ResetRotation,
    /// Acknowledgement sent back by the viewer.
    Ack {
        /// Whether the acknowledged command succeeded.
        success: bool,
        /// Failure description, if any.
        #[serde(default)]
        error: Option<String>,
    },
}

/// Result of decoding one inbound frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Inbound {
    /// A frame with a recognized kind.
    Envelope(Envelope),
    /// A well-formed object whose `type` is missing or not in the fixed set.
    Unrecognized {
        /// The raw `type` tag, if one was present as a string.
        kind: Option<String>,
    },
}

impl Envelope {
    /// `load_model` carrying `data`.
    pub fn load_model(data: impl Into<String>) -> Self {
        Self::LoadModel { data: data.into() }
    }

    /// `reset_zoom`.
    #[must_use]
    pub const fn reset_zoom() -> Self {
        Self::ResetZoom
    }

    /// `reset_rotation`.
    #[must_use]
    pub const fn reset_rotation() -> Self {
        Self::ResetRotation
    }

    /// Successful `ack`.
    #[must_use]
    pub const fn ack_ok() -> Self {
        Self::Ack {
            success: true,
            error: None,
        }
    }

    /// Failed `ack` with a reason.
    pub fn ack_failed(error: impl Into<String>) -> Self {
        Self::Ack {
            success: false,
            error: Some(error.into()),
        }
    }

    /// The envelope's kind.
    #[must_use]
    pub const fn kind(&self) -> EnvelopeKind {
        match self {
            Self::LoadModel { .. } => EnvelopeKind::LoadModel,
            Self::ResetZoom => EnvelopeKind::ResetZoom,
            Self::ResetRotation => EnvelopeKind::ResetRotation,
            Self::Ack { .. } => EnvelopeKind::Ack,
        }
    }

    /// JSON object form.
    #[must_use]
    pub fn to_value(&self) -> Value {
        let kind = self.kind().as_str();
        match self {
            Self::LoadModel { data } => json!({ "type": kind, "data": data }),
            Self::ResetZoom | Self::ResetRotation => json!({ "type": kind }),
            Self::Ack { success, error } => match error {
                Some(error) => json!({ "type": kind, "success": success, "error": error }),
                None => json!({ "type": kind, "success": success }),
            },
        }
    }

    /// Text frame payload.
    #[must_use]
    pub fn encode(&self) -> String {
        self.to_value().to_string()
    }

    /// Decode one text frame.
    ///
    /// Fails only on malformed framing: invalid JSON, a non-object value, or
    /// a known `type` whose fields do not fit. Unknown or missing `type`
    /// tags yield [`Inbound::Unrecognized`]. Extra fields are ignored.
    pub fn decode(text: &str) -> Result<Inbound, DecodeError> {
        let value: Value = serde_json::from_str(text)?;
        if !value.is_object() {
            return Err(DecodeError::NotAnObject);
        }

        let tag = value.get("type").and_then(Value::as_str).map(str::to_owned);
        match tag.as_deref().and_then(EnvelopeKind::from_wire) {
            Some(kind) => serde_json::from_value(value)
                .map(Inbound::Envelope)
                .map_err(|source| DecodeError::InvalidFields { kind, source }),
            None => Ok(Inbound::Unrecognized { kind: tag }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn load_model_round_trip() {
        let env = Envelope::load_model("cube-data");
        let Inbound::Envelope(env) = Envelope::decode(&env.encode()).unwrap() else {
            panic!("load_model decoded as unrecognized");
        };
        assert_eq!(env.kind(), EnvelopeKind::LoadModel);
        assert_eq!(env, Envelope::LoadModel { data: "cube-data".into() });
    }

    #[test]
    fn load_model_wire_shape() {
        let text = Envelope::load_model("X").encode();
        let parsed: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed, json!({"type": "load_model", "data": "X"}));
    }

    #[test]
    fn reset_commands_have_no_payload() {
        assert_eq!(Envelope::reset_zoom().encode(), r#"{"type":"reset_zoom"}"#);
        assert_eq!(Envelope::reset_rotation().encode(), r#"{"type":"reset_rotation"}"#);
    }

    #[test]
    fn ack_omits_absent_error() {
        let value = Envelope::ack_ok().to_value();
        assert_eq!(value["success"], true);
        assert!(value.get("error").is_none());

        let value = Envelope::ack_failed("parse failed").to_value();
        assert_eq!(value["success"], false);
        assert_eq!(value["error"], "parse failed");
    }

    #[test]
    fn decode_not_json_fails() {
        assert_matches!(Envelope::decode("not json"), Err(DecodeError::InvalidJson(_)));
        assert_matches!(Envelope::decode(""), Err(DecodeError::InvalidJson(_)));
    }

    #[test]
    fn decode_non_object_fails() {
        assert_matches!(Envelope::decode("[1,2,3]"), Err(DecodeError::NotAnObject));
        assert_matches!(Envelope::decode("\"ack\""), Err(DecodeError::NotAnObject));
    }

    #[test]
    fn decode_unknown_kind_is_unrecognized() {
        let decoded = Envelope::decode(r#"{"type":"unknown_kind"}"#).unwrap();
        assert_eq!(
            decoded,
            Inbound::Unrecognized {
                kind: Some("unknown_kind".into())
            }
        );
    }

    #[test]
    fn decode_missing_type_is_unrecognized() {
        let decoded = Envelope::decode(r#"{"success":true}"#).unwrap();
        assert_eq!(decoded, Inbound::Unrecognized { kind: None });
    }

    #[test]
    fn decode_known_kind_with_bad_fields_fails() {
        let err = Envelope::decode(r#"{"type":"load_model"}"#).unwrap_err();
        assert_matches!(
            err,
            DecodeError::InvalidFields {
                kind: EnvelopeKind::LoadModel,
                ..
            }
        );

        let err = Envelope::decode(r#"{"type":"ack","success":"yes"}"#).unwrap_err();
        assert_matches!(err, DecodeError::InvalidFields { kind: EnvelopeKind::Ack, .. });
    }

    #[test]
    fn decode_ack_variants() {
        let ok = Envelope::decode(r#"{"type":"ack","success":true}"#).unwrap();
        assert_eq!(ok, Inbound::Envelope(Envelope::ack_ok()));

        let failed =
            Envelope::decode(r#"{"type":"ack","success":false,"error":"bad model"}"#).unwrap();
        assert_eq!(failed, Inbound::Envelope(Envelope::ack_failed("bad model")));

        let null_error =
            Envelope::decode(r#"{"type":"ack","success":true,"error":null}"#).unwrap();
        assert_eq!(null_error, Inbound::Envelope(Envelope::ack_ok()));
    }

    #[test]
    fn decode_ignores_extra_fields() {
        let decoded = Envelope::decode(r#"{"type":"reset_zoom","extra":1}"#).unwrap();
        assert_eq!(decoded, Inbound::Envelope(Envelope::ResetZoom));
    }

    #[test]
    fn kind_tags_round_trip() {
        for kind in EnvelopeKind::ALL {
            assert_eq!(EnvelopeKind::from_wire(kind.as_str()), Some(kind));
            assert_eq!(kind.to_string(), kind.as_str());
        }
        assert_eq!(EnvelopeKind::from_wire("LOAD_MODEL"), None);
    }

    #[test]
    fn payload_is_opaque() {
        let data = "v 0 0 0\nf 1 2 3\n\"quoted\" \\ unicode é";
        let decoded = Envelope::decode(&Envelope::load_model(data).encode()).unwrap();
        assert_eq!(decoded, Inbound::Envelope(Envelope::load_model(data)));
    }
}
