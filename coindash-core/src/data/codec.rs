//! Bundle wire codec.
//!
//! MessagePack (named fields) is the canonical byte form: it is what the server
//! prefers to send and what the persistent cache stores. JSON responses are
//! parsed and re-encoded so everything downstream sees the same bytes.

use super::provider::{BundlePayload, DataError};
use crate::domain::Bundle;

pub const MSGPACK_CONTENT_TYPE: &str = "application/x-msgpack";

/// `Accept` header sent with bundle requests.
pub const BUNDLE_ACCEPT: &str = "application/x-msgpack, application/json;q=0.9";

/// True for any of the MessagePack media types servers use in the wild.
pub fn is_msgpack(content_type: &str) -> bool {
    let mime = content_type
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase();
    matches!(
        mime.as_str(),
        "application/x-msgpack" | "application/msgpack" | "application/vnd.msgpack"
    )
}

pub fn encode_bundle(bundle: &Bundle) -> Result<Vec<u8>, DataError> {
    rmp_serde::to_vec_named(bundle).map_err(|e| DataError::Encode(e.to_string()))
}

/// Decode canonical bundle bytes. Pure; used on network bodies and cache reads.
pub fn decode_bundle_bytes(bytes: &[u8]) -> Result<Bundle, DataError> {
    rmp_serde::from_slice(bytes).map_err(|e| DataError::Decode(format!("msgpack: {e}")))
}

pub fn decode_bundle_json(bytes: &[u8]) -> Result<Bundle, DataError> {
    serde_json::from_slice(bytes).map_err(|e| DataError::Decode(format!("json: {e}")))
}

impl BundlePayload {
    /// Build a payload from a raw HTTP body according to its content type.
    pub fn from_response(content_type: &str, body: Vec<u8>) -> Result<Self, DataError> {
        if is_msgpack(content_type) {
            let bundle = decode_bundle_bytes(&body)?;
            return Ok(Self {
                bundle,
                bytes: body,
                content_type: content_type.to_string(),
            });
        }

        let bundle = decode_bundle_json(&body)?;
        let bytes = encode_bundle(&bundle)?;
        Ok(Self {
            bundle,
            bytes,
            content_type: content_type.to_string(),
        })
    }

    /// Payload for a bundle produced locally (tests, fixtures).
    pub fn from_bundle(bundle: Bundle) -> Result<Self, DataError> {
        let bytes = encode_bundle(&bundle)?;
        Ok(Self {
            bundle,
            bytes,
            content_type: MSGPACK_CONTENT_TYPE.to_string(),
        })
    }
}
