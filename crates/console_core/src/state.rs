//! Derived UI-facing state folded from the engine event stream.

use chrono::{DateTime, Utc};
use shared::{domain::HistoryEntry, protocol::RecognitionEvent};
use tokio::{
    sync::{broadcast, watch},
    task::JoinHandle,
};
use tracing::warn;

/// Label the engine emits when no gesture is detected.
pub const IDLE_LABEL: &str = "No Hand";
pub const HISTORY_CAP: usize = 10;

/// Immutable snapshot of the console's derived state. Each inbound event
/// produces the next snapshot through [`ActivitySnapshot::apply`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ActivitySnapshot {
    pub current_label: String,
    pub is_capturing: bool,
    pub recording_progress: Option<f32>,
    /// Newest first, one entry per onset of a non-idle gesture, at most
    /// [`HISTORY_CAP`] entries.
    pub history: Vec<HistoryEntry>,
    last_onset: Option<String>,
}

impl ActivitySnapshot {
    /// Pure fold step: label, capture flag, and progress are taken from the
    /// event unconditionally; history records label *transitions* only.
    ///
    /// An idle (or empty) label resets the onset cursor, so a gesture that
    /// re-appears after idle is logged again even if it repeats the previous
    /// label. Repeats of a held gesture never touch history: that keeps the
    /// bounded log from being flooded by per-frame duplicates.
    pub fn apply(
        &self,
        event: &RecognitionEvent,
        idle_label: &str,
        observed_at: DateTime<Utc>,
    ) -> Self {
        let mut next = self.clone();
        next.current_label = event.prediction.clone();
        next.is_capturing = event.is_recording;
        next.recording_progress = event.recording_progress;

        let label = event.prediction.as_str();
        if label.is_empty() || label == idle_label {
            next.last_onset = None;
        } else if next.last_onset.as_deref() != Some(label) {
            next.history.insert(0, HistoryEntry::new(label, observed_at));
            next.history.truncate(HISTORY_CAP);
            next.last_onset = Some(label.to_string());
        }
        next
    }
}

/// Single consumer folding the decoded event stream into a watch channel.
/// Events arrive in engine-emission order from one producer, so the fold
/// needs no locking.
pub struct ActivityStore {
    snapshot_rx: watch::Receiver<ActivitySnapshot>,
    task: JoinHandle<()>,
}

impl ActivityStore {
    pub fn spawn(
        mut events: broadcast::Receiver<RecognitionEvent>,
        idle_label: impl Into<String>,
    ) -> Self {
        let idle_label = idle_label.into();
        let (snapshot_tx, snapshot_rx) = watch::channel(ActivitySnapshot::default());
        let task = tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => {
                        let current = snapshot_tx.borrow().clone();
                        let next = current.apply(&event, &idle_label, Utc::now());
                        if snapshot_tx.send(next).is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "activity store lagged behind engine events");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
        Self { snapshot_rx, task }
    }

    pub fn subscribe(&self) -> watch::Receiver<ActivitySnapshot> {
        self.snapshot_rx.clone()
    }

    pub fn close(&self) {
        self.task.abort();
    }
}

#[cfg(test)]
#[path = "tests/state_tests.rs"]
mod tests;
