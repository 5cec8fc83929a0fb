use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle of the console's event-stream connection to the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    Connecting,
    Connected,
    Errored,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Predefined,
    Custom,
}

/// Action bound to a gesture label. The engine stores one binding per label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionBinding {
    #[serde(rename = "type")]
    pub kind: ActionKind,
    pub command: String,
}

/// One recognized-gesture onset. Entries are immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: Uuid,
    pub label: String,
    pub observed_at: DateTime<Utc>,
}

impl HistoryEntry {
    pub fn new(label: impl Into<String>, observed_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            label: label.into(),
            observed_at,
        }
    }
}

/// Operator-selectable registry of predefined action labels.
pub const PREDEFINED_ACTIONS: &[&str] = &[
    "Volume Up",
    "Volume Down",
    "Mute",
    "Unmute",
    "Play",
    "Pause",
    "Next Track",
    "Previous Track",
    "Screenshot",
    "Tab Switch",
    "Neutral",
];

/// Derives the engine command for a predefined binding from its label.
pub fn predefined_command(label: &str) -> String {
    label.to_ascii_lowercase().replace(' ', "_")
}
