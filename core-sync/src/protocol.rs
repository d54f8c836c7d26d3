//! Wire protocol shared by the client channel and the remote responder.
//!
//! Every message is a JSON envelope `{ "operation": string, "payload": T }`.
//! A reply carries the same `operation` as its request; that name is the
//! only correlation key.
//!
//! | operation            | request payload        | reply payload                      |
//! |----------------------|------------------------|------------------------------------|
//! | `check-files-update` | snapshot fingerprint   | `{ "update": bool }`               |
//! | `get-file-diff`      | array of file entries  | `{ toUpload, toUpdate, toDownload }` |

use crate::{Result, SyncError};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Ask whether the remote side differs from a snapshot fingerprint.
pub const CHECK_FILES_UPDATE: &str = "check-files-update";

/// Ask for the three-way diff of a full local snapshot.
pub const GET_FILE_DIFF: &str = "get-file-diff";

/// Message envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub operation: String,
    pub payload: T,
}

/// Envelope whose payload has not been interpreted yet.
pub type RawEnvelope = Envelope<Value>;

/// Reply to [`CHECK_FILES_UPDATE`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateStatus {
    pub update: bool,
}

/// Serialize `payload` under `operation`.
pub fn encode<T: Serialize + ?Sized>(operation: &str, payload: &T) -> Result<String> {
    let envelope = Envelope {
        operation: operation.to_string(),
        payload,
    };
    Ok(serde_json::to_string(&envelope)?)
}

/// Parse an inbound message, leaving the payload raw.
pub fn decode(text: &str) -> Result<RawEnvelope> {
    serde_json::from_str(text).map_err(|e| SyncError::Serialization(e.to_string()))
}

/// Interpret a raw payload as the reply type of `operation`.
pub fn payload_as<T: serde::de::DeserializeOwned>(operation: &str, payload: Value) -> Result<T> {
    serde_json::from_value(payload).map_err(|e| SyncError::Protocol {
        operation: operation.to_string(),
        message: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_envelope_shape() {
        let text = encode(CHECK_FILES_UPDATE, "abc123").unwrap();
        let value: Value = serde_json::from_str(&text).unwrap();

        assert_eq!(value["operation"], "check-files-update");
        assert_eq!(value["payload"], "abc123");
    }

    #[test]
    fn test_decode_keeps_raw_payload() {
        let envelope = decode(r#"{"operation":"check-files-update","payload":{"update":true}}"#)
            .unwrap();

        assert_eq!(envelope.operation, CHECK_FILES_UPDATE);
        let status: UpdateStatus = payload_as(CHECK_FILES_UPDATE, envelope.payload).unwrap();
        assert!(status.update);
    }

    #[test]
    fn test_decode_rejects_malformed() {
        assert!(matches!(decode("not json"), Err(SyncError::Serialization(_))));
        assert!(matches!(
            decode(r#"{"payload":1}"#),
            Err(SyncError::Serialization(_))
        ));
    }

    #[test]
    fn test_payload_type_mismatch_is_protocol_error() {
        let result: Result<UpdateStatus> = payload_as(CHECK_FILES_UPDATE, Value::from("yes"));
        assert!(matches!(result, Err(SyncError::Protocol { .. })));
    }
}
