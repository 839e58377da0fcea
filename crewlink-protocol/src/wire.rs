//! Wire protocol for the persistent push socket
//!
//! Frames are single-line JSON texts. Message kinds are tagged with `type`;
//! field names are camelCase on the wire. Unknown `type` tags fail to decode
//! and are dropped (with a log line) by the connection manager.

use serde::{Deserialize, Serialize};

use crate::types::UpdatePayload;

/// A message on the push socket.
///
/// `Subscribe`/`Unsubscribe` are outbound, `ThreadUpdate`/`Error` are
/// inbound, `Heartbeat` flows both ways.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum WireMessage {
    Subscribe {
        thread_id: String,
    },
    Unsubscribe {
        thread_id: String,
    },
    Heartbeat,
    ThreadUpdate {
        thread_id: String,
        updates: UpdatePayload,
    },
    Error {
        error: String,
    },
}

impl WireMessage {
    /// Encode as a single-line JSON frame (no trailing newline)
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Decode a JSON frame
    pub fn decode(frame: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Release;

    #[test]
    fn subscribe_frame_shape() {
        let frame = WireMessage::Subscribe {
            thread_id: "12345".into(),
        }
        .encode()
        .unwrap();
        assert_eq!(frame, r#"{"type":"subscribe","threadId":"12345"}"#);
    }

    #[test]
    fn heartbeat_frame_shape() {
        let frame = WireMessage::Heartbeat.encode().unwrap();
        assert_eq!(frame, r#"{"type":"heartbeat"}"#);
    }

    #[test]
    fn thread_update_decodes() {
        let frame = r#"{"type":"thread_update","threadId":"12345","updates":{"newReleases":[{"title":"S01E01"}],"timestamp":1700000000000}}"#;
        let msg = WireMessage::decode(frame).unwrap();
        match msg {
            WireMessage::ThreadUpdate { thread_id, updates } => {
                assert_eq!(thread_id, "12345");
                assert_eq!(
                    updates.new_releases,
                    Some(vec![Release::titled("S01E01")])
                );
            }
            other => panic!("expected thread_update, got {other:?}"),
        }
    }

    #[test]
    fn unknown_type_fails_to_decode() {
        let frame = r#"{"type":"mystery","threadId":"1"}"#;
        assert!(WireMessage::decode(frame).is_err());
    }

    #[test]
    fn error_frame_decodes() {
        let frame = r#"{"type":"error","error":"subscription limit reached"}"#;
        let msg = WireMessage::decode(frame).unwrap();
        assert!(matches!(msg, WireMessage::Error { ref error } if error.contains("limit")));
    }

    #[test]
    fn roundtrip_all_variants() {
        let messages = vec![
            WireMessage::Subscribe {
                thread_id: "a".into(),
            },
            WireMessage::Unsubscribe {
                thread_id: "a".into(),
            },
            WireMessage::Heartbeat,
            WireMessage::ThreadUpdate {
                thread_id: "a".into(),
                updates: UpdatePayload::default(),
            },
            WireMessage::Error {
                error: "boom".into(),
            },
        ];
        for msg in messages {
            let frame = msg.encode().unwrap();
            assert_eq!(WireMessage::decode(&frame).unwrap(), msg);
        }
    }
}
