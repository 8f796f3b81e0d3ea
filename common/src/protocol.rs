//! JSON types for the `cc_rosbag_recorder` endpoint.
//!
//! Field names follow the service definition (`startRecording`,
//! `recordingActive`, ...) so existing callers keep working.

use serde::{Deserialize, Serialize};

/// Name the recording endpoint is registered under.
pub const ENDPOINT_NAME: &str = "cc_rosbag_recorder";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordingRequest {
    /// `true` starts a new recording, `false` stops the running one.
    pub start_recording: bool,
    /// Ignore `topics_to_record` and use the configured default list.
    #[serde(default)]
    pub use_default_topics: bool,
    #[serde(default)]
    pub topics_to_record: Vec<String>,
}

impl RecordingRequest {
    pub fn start_default() -> Self {
        Self {
            start_recording: true,
            use_default_topics: true,
            topics_to_record: Vec::new(),
        }
    }

    pub fn start_topics<I, S>(topics: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            start_recording: true,
            use_default_topics: false,
            topics_to_record: topics.into_iter().map(Into::into).collect(),
        }
    }

    pub fn stop() -> Self {
        Self::default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordingResponse {
    pub recording_active: bool,
    pub recording_status: String,
    /// Set when the launch or the node cleanup failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recording_error: Option<String>,
}

/// Health-check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub uptime_secs: u64,
}

/// Snapshot of the controller, served by `GET /api/status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub recording_active: bool,
    pub active_bag_file_name: String,
    pub output_directory: String,
}
