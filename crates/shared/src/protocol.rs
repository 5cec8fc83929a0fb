use serde::{Deserialize, Serialize};

use crate::domain::ActionKind;

/// One decoded frame from the engine push channel. Transient: folded into
/// derived state and not retained.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecognitionEvent {
    pub prediction: String,
    pub is_recording: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recording_progress: Option<f32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GestureListResponse {
    pub gestures: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionUpdateRequest {
    pub label: String,
    pub action_type: ActionKind,
    pub command: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordRequest {
    pub label: String,
    pub num_frames: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineStatus {
    pub status: String,
}
