//! Request/response envelope between UI surfaces and the coordinator
//!
//! Every request carries an `action` tag; every reply is a
//! `{success, data|error}` envelope. Pushes from the coordinator to surfaces
//! are fire-and-forget and use their own `type`-tagged message.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::UpdatePayload;

/// A request dispatched by a UI surface to the coordinator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum Request {
    /// Store the bearer token and open the push connection
    Authenticate { token: String },
    /// Search the backend for releases
    Search {
        query: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        season: Option<u32>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        episode: Option<u32>,
    },
    /// Thread status and like information
    GetStatus { thread_id: String },
    /// Like a thread (state-changing, needs a fresh anti-forgery token)
    Like { thread_id: String },
    /// Unlike a thread (state-changing, needs a fresh anti-forgery token)
    Unlike { thread_id: String },
    /// Re-scrape a thread's cached data on the backend
    RefreshThread { thread_id: String },
    /// Append an analytics event (capped at the last 100)
    RecordEvent {
        name: String,
        #[serde(default)]
        data: Value,
    },
    /// Receive push updates for a thread
    Subscribe { thread_id: String },
    /// Stop receiving push updates for a thread
    Unsubscribe { thread_id: String },
    /// Current push connection state
    ConnectionStatus,
    /// Mark a thread's updates as read (drops the persisted ledger entry)
    MarkRead { thread_id: String },
    /// All currently-unread ledger entries, for surface startup hydration
    GetUnread,
}

/// Reply envelope for every request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Response {
    /// Successful reply carrying data
    pub fn ok(data: Value) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    /// Successful reply with no payload
    pub fn ok_empty() -> Self {
        Self {
            success: true,
            data: None,
            error: None,
        }
    }

    /// Failed reply
    pub fn err(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

/// Fire-and-forget push from the coordinator to a registered surface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum PushMessage {
    ThreadUpdate {
        thread_id: String,
        updates: UpdatePayload,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_action_tags() {
        let json = serde_json::to_value(Request::MarkRead {
            thread_id: "7".into(),
        })
        .unwrap();
        assert_eq!(json["action"], "mark_read");
        assert_eq!(json["threadId"], "7");
    }

    #[test]
    fn unit_actions_roundtrip() {
        for req in [Request::ConnectionStatus, Request::GetUnread] {
            let json = serde_json::to_string(&req).unwrap();
            assert_eq!(serde_json::from_str::<Request>(&json).unwrap(), req);
        }
    }

    #[test]
    fn response_err_shape() {
        let resp = Response::err("no bearer token");
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["error"], "no bearer token");
        assert!(json.get("data").is_none());
    }

    #[test]
    fn response_ok_shape() {
        let resp = Response::ok(serde_json::json!({"likeCount": 4}));
        assert!(resp.success);
        assert!(resp.error.is_none());
    }

    #[test]
    fn push_message_shape() {
        let push = PushMessage::ThreadUpdate {
            thread_id: "12345".into(),
            updates: UpdatePayload::default(),
        };
        let json = serde_json::to_value(&push).unwrap();
        assert_eq!(json["type"], "thread_update");
        assert_eq!(json["threadId"], "12345");
    }

    #[test]
    fn unknown_action_rejected() {
        let err = serde_json::from_str::<Request>(r#"{"action":"self_destruct"}"#);
        assert!(err.is_err());
    }
}
