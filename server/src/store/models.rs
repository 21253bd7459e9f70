/// Envelope records and wire payloads.
/// Covers the persisted entity, the client->server and server->receiver
/// WebSocket frames, and the HTTP DTOs of the history endpoint.
use crate::auth::Identity;
use serde::{Deserialize, Serialize};

/// Envelope as handed to the store, before it has a row id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewEnvelope {
    pub sender: Identity,
    pub receiver: Identity,
    pub ciphertext: String,
    pub iv: String,
    /// Server-assigned; the store stamps it when absent
    pub timestamp: Option<i64>,
}

/// Persisted envelope. Immutable once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub id: i64,
    pub sender: Identity,
    pub receiver: Identity,
    pub ciphertext: String,
    pub iv: String,
    /// Milliseconds since the Unix epoch
    pub timestamp: i64,
}

/// Client -> server frame
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundEnvelope {
    pub receiver: String,
    #[serde(alias = "encryptedContent")]
    pub ciphertext: String,
    pub iv: String,
}

/// Server -> receiver frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForwardedEnvelope {
    pub sender: Identity,
    pub ciphertext: String,
    pub iv: String,
}

impl From<&Envelope> for ForwardedEnvelope {
    fn from(envelope: &Envelope) -> Self {
        ForwardedEnvelope {
            sender: envelope.sender.clone(),
            ciphertext: envelope.ciphertext.clone(),
            iv: envelope.iv.clone(),
        }
    }
}

// Request/Response DTOs
#[derive(Debug, Serialize, Deserialize)]
pub struct SendEnvelopeResponse {
    pub id: i64,
    pub timestamp: i64,
    pub delivered: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub online: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inbound_requires_all_fields() {
        let missing_receiver = r#"{"ciphertext":"abc","iv":"00"}"#;
        assert!(serde_json::from_str::<InboundEnvelope>(missing_receiver).is_err());

        let wrong_type = r#"{"receiver":42,"ciphertext":"abc","iv":"00"}"#;
        assert!(serde_json::from_str::<InboundEnvelope>(wrong_type).is_err());
    }

    #[test]
    fn test_inbound_accepts_legacy_content_field() {
        let legacy = r#"{"receiver":"bob","encryptedContent":"abc","iv":"00"}"#;
        let parsed: InboundEnvelope = serde_json::from_str(legacy).expect("Legacy field name");
        assert_eq!(parsed.ciphertext, "abc");
    }

    #[test]
    fn test_forwarded_envelope_shape() {
        let envelope = Envelope {
            id: 7,
            sender: Identity::from("alice"),
            receiver: Identity::from("bob"),
            ciphertext: "c2VjcmV0".to_string(),
            iv: "a1b2".to_string(),
            timestamp: 1_700_000_000_000,
        };

        let value = serde_json::to_value(ForwardedEnvelope::from(&envelope)).unwrap();
        assert_eq!(
            value,
            serde_json::json!({"sender": "alice", "ciphertext": "c2VjcmV0", "iv": "a1b2"})
        );
        assert!(value.get("receiver").is_none());
    }
}
