//! Data types shared between the coordinator and UI surfaces

use serde::{Deserialize, Serialize};

/// A single downloadable item belonging to a thread.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Release {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seeders: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub download_link: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub season: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub episode: Option<u32>,
}

impl Release {
    /// Minimal release with just a title (common in push payloads)
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            size: None,
            seeders: None,
            download_link: None,
            season: None,
            episode: None,
        }
    }
}

/// Payload attached to a thread update.
///
/// Every field except the producer timestamp is optional; a payload with
/// `new_releases` set is what triggers an OS-level notification downstream.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_releases: Option<Vec<Release>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub like_count: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Producer timestamp, milliseconds since the Unix epoch
    #[serde(default)]
    pub timestamp: i64,
}

impl UpdatePayload {
    /// Number of newly-available releases carried by this payload
    pub fn release_count(&self) -> usize {
        self.new_releases.as_ref().map_or(0, Vec::len)
    }
}

/// One entry of the persisted unread ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnreadEntry {
    pub thread_id: String,
    pub update: UpdatePayload,
    /// Coordinator-side receipt timestamp, milliseconds since the Unix epoch
    pub timestamp: i64,
    pub unread: bool,
}

/// Connection manager lifecycle state, as reported to surfaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
    /// Terminal: reconnection attempts exhausted, caller must intervene
    Failed,
}

/// Thread status as returned by the backend API.
///
/// The backend emits snake_case keys; surfaces speak camelCase. Aliases
/// accept both on the way in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreadStatus {
    #[serde(alias = "thread_id")]
    pub thread_id: String,
    #[serde(alias = "like_count")]
    pub like_count: u64,
    #[serde(default, alias = "user_liked", skip_serializing_if = "Option::is_none")]
    pub user_liked: Option<bool>,
    #[serde(default, alias = "last_updated", skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<String>,
}
