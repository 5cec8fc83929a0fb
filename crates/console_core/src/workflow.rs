//! Operator workflow orchestration: gesture capture and model training.
//!
//! Both workflows pair remote engine calls with a locally simulated
//! progress timeline. The cosmetic timeline and the authoritative remote
//! outcome are kept as independent signals and joined only at the terminal
//! transition.

use std::{sync::Arc, time::Duration};

use anyhow::ensure;
use chrono::{DateTime, Utc};
use shared::{
    domain::{predefined_command, ActionKind},
    protocol::{ActionUpdateRequest, RecordRequest},
};
use thiserror::Error;
use tokio::{
    sync::{broadcast, watch, Mutex},
    task::JoinHandle,
};
use tracing::{info, warn};

use crate::gateway::{fetch_catalog, Catalog, EngineApi};

/// The engine records for a fixed, known duration, so a local timer stands
/// in for a completion acknowledgment. A future engine-pushed "capture
/// complete" event would tighten this.
pub const CAPTURE_DURATION: Duration = Duration::from_millis(4500);
pub const CAPTURE_FRAMES: u32 = 40;
pub const TRAINING_STEP_INTERVAL: Duration = Duration::from_millis(600);

/// Cosmetic training timeline. Real progress of the remote run is not
/// observable; these phases only give the operator continuous feedback.
pub const TRAINING_STEPS: &[&str] = &[
    "preparing trainer",
    "loading landmark samples",
    "normalizing features",
    "fitting classifier",
    "calibrating distance metrics",
    "writing model weights",
    "finalizing",
];

const NOTICE_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CapturePhase {
    #[default]
    Idle,
    Registering,
    Capturing,
    Settled,
    Failed,
}

impl CapturePhase {
    fn is_active(self) -> bool {
        matches!(self, CapturePhase::Registering | CapturePhase::Capturing)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TrainingPhase {
    #[default]
    Idle,
    Running,
    Succeeded,
    Failed,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CaptureState {
    pub phase: CapturePhase,
    pub label: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrainingState {
    pub phase: TrainingPhase,
    pub step_index: usize,
    pub started_at: Option<DateTime<Utc>>,
}

impl TrainingState {
    pub fn step_name(&self) -> &'static str {
        TRAINING_STEPS[self.step_index.min(TRAINING_STEPS.len() - 1)]
    }
}

/// Operator choice of the action bound to a captured gesture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GestureBinding {
    Predefined,
    Custom { command: String },
}

/// Precondition violations, rejected before any remote call is made.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WorkflowError {
    #[error("gesture label must not be empty")]
    EmptyLabel,
    #[error("custom binding command must not be empty")]
    EmptyCommand,
    #[error("a gesture capture is already in progress")]
    CaptureActive,
    #[error("a training run is already in progress")]
    TrainingActive,
}

/// What to tell the operator and when. Rendering is the caller's concern.
#[derive(Debug, Clone, PartialEq)]
pub enum WorkflowNotice {
    CaptureStarted { label: String },
    CaptureSettled { label: String },
    CaptureFailed { label: String, reason: String },
    TrainingStarted,
    TrainingSucceeded,
    TrainingFailed { reason: String },
    CatalogRefreshed,
}

pub struct WorkflowOrchestrator {
    engine: Arc<dyn EngineApi>,
    capture_tx: watch::Sender<CaptureState>,
    training_tx: watch::Sender<TrainingState>,
    catalog_tx: watch::Sender<Catalog>,
    notices: broadcast::Sender<WorkflowNotice>,
    runs: Mutex<Vec<JoinHandle<()>>>,
    capture_duration: Duration,
    training_step_interval: Duration,
}

impl WorkflowOrchestrator {
    pub fn new(engine: Arc<dyn EngineApi>) -> Arc<Self> {
        Self::with_timings(engine, CAPTURE_DURATION, TRAINING_STEP_INTERVAL)
    }

    fn with_timings(
        engine: Arc<dyn EngineApi>,
        capture_duration: Duration,
        training_step_interval: Duration,
    ) -> Arc<Self> {
        let (notices, _) = broadcast::channel(NOTICE_CHANNEL_CAPACITY);
        Arc::new(Self {
            engine,
            capture_tx: watch::channel(CaptureState::default()).0,
            training_tx: watch::channel(TrainingState::default()).0,
            catalog_tx: watch::channel(Catalog::default()).0,
            notices,
            runs: Mutex::new(Vec::new()),
            capture_duration,
            training_step_interval,
        })
    }

    pub fn capture_state(&self) -> watch::Receiver<CaptureState> {
        self.capture_tx.subscribe()
    }

    pub fn training_state(&self) -> watch::Receiver<TrainingState> {
        self.training_tx.subscribe()
    }

    pub fn catalog(&self) -> watch::Receiver<Catalog> {
        self.catalog_tx.subscribe()
    }

    pub fn subscribe_notices(&self) -> broadcast::Receiver<WorkflowNotice> {
        self.notices.subscribe()
    }

    /// Starts the gesture-capture workflow: persist the action binding,
    /// trigger engine recording, then settle on the local capture timer.
    ///
    /// Rejected synchronously (no remote call) on invalid input or while a
    /// capture run is active; a new run is never queued behind one.
    pub async fn start_capture(
        self: &Arc<Self>,
        label: &str,
        binding: GestureBinding,
    ) -> Result<(), WorkflowError> {
        let label = label.trim();
        if label.is_empty() {
            return Err(WorkflowError::EmptyLabel);
        }
        let (action_kind, command) = match &binding {
            GestureBinding::Predefined => (ActionKind::Predefined, predefined_command(label)),
            GestureBinding::Custom { command } => {
                let command = command.trim();
                if command.is_empty() {
                    return Err(WorkflowError::EmptyCommand);
                }
                (ActionKind::Custom, command.to_string())
            }
        };

        let mut runs = self.runs.lock().await;
        let active = self.capture_tx.borrow().phase.is_active();
        if active {
            return Err(WorkflowError::CaptureActive);
        }

        self.capture_tx.send_replace(CaptureState {
            phase: CapturePhase::Registering,
            label: Some(label.to_string()),
            started_at: Some(Utc::now()),
        });
        let orchestrator = Arc::clone(self);
        let label = label.to_string();
        runs.retain(|run| !run.is_finished());
        runs.push(tokio::spawn(async move {
            orchestrator.run_capture(label, action_kind, command).await;
        }));
        Ok(())
    }

    async fn run_capture(self: Arc<Self>, label: String, action_kind: ActionKind, command: String) {
        let _ = self.notices.send(WorkflowNotice::CaptureStarted {
            label: label.clone(),
        });

        let registration = ActionUpdateRequest {
            label: label.clone(),
            action_type: action_kind,
            command,
        };
        if let Err(err) = self.engine.upsert_action(&registration).await {
            self.fail_capture(&label, format!("action binding rejected: {err}"));
            return;
        }

        self.capture_tx
            .send_modify(|state| state.phase = CapturePhase::Capturing);
        let recording = RecordRequest {
            label: label.clone(),
            num_frames: CAPTURE_FRAMES,
        };
        if let Err(err) = self.engine.start_recording(&recording).await {
            self.fail_capture(&label, format!("recording trigger rejected: {err}"));
            return;
        }

        // The timer, not the engine, is the completion trigger.
        tokio::time::sleep(self.capture_duration).await;

        if let Err(err) = self.refresh_catalog().await {
            warn!(%label, error = %err, "catalog refresh after capture failed");
        }
        self.capture_tx
            .send_modify(|state| state.phase = CapturePhase::Settled);
        info!(%label, "gesture capture settled");
        let _ = self.notices.send(WorkflowNotice::CaptureSettled { label });
    }

    fn fail_capture(&self, label: &str, reason: String) {
        warn!(label, %reason, "gesture capture failed");
        self.capture_tx
            .send_modify(|state| state.phase = CapturePhase::Failed);
        let _ = self.notices.send(WorkflowNotice::CaptureFailed {
            label: label.to_string(),
            reason,
        });
    }

    /// Starts the training workflow. The step sequencer only animates the
    /// run; the terminal state is decided solely by the request outcome.
    pub async fn start_training(self: &Arc<Self>) -> Result<(), WorkflowError> {
        let mut runs = self.runs.lock().await;
        let running = self.training_tx.borrow().phase == TrainingPhase::Running;
        if running {
            return Err(WorkflowError::TrainingActive);
        }

        self.training_tx.send_replace(TrainingState {
            phase: TrainingPhase::Running,
            step_index: 0,
            started_at: Some(Utc::now()),
        });
        let orchestrator = Arc::clone(self);
        runs.retain(|run| !run.is_finished());
        runs.push(tokio::spawn(async move {
            orchestrator.run_training().await;
        }));
        Ok(())
    }

    async fn run_training(self: Arc<Self>) {
        let _ = self.notices.send(WorkflowNotice::TrainingStarted);

        let last_step = TRAINING_STEPS.len() - 1;
        let mut request = self.engine.trigger_training();
        let outcome = loop {
            tokio::select! {
                result = &mut request => break result,
                _ = tokio::time::sleep(self.training_step_interval) => {
                    // Monotone, clamped at the last phase; never restarts.
                    self.training_tx.send_modify(|state| {
                        if state.step_index < last_step {
                            state.step_index += 1;
                        }
                    });
                }
            }
        };

        match outcome {
            Ok(()) => {
                self.training_tx
                    .send_modify(|state| state.phase = TrainingPhase::Succeeded);
                info!("model training succeeded");
                let _ = self.notices.send(WorkflowNotice::TrainingSucceeded);
            }
            Err(err) => {
                let reason = err.to_string();
                warn!(%reason, "model training failed");
                self.training_tx
                    .send_modify(|state| state.phase = TrainingPhase::Failed);
                let _ = self.notices.send(WorkflowNotice::TrainingFailed { reason });
            }
        }
    }

    /// Deletes a gesture and its binding, then re-reads both collections.
    pub async fn delete_gesture(&self, label: &str) -> anyhow::Result<()> {
        ensure!(!label.trim().is_empty(), "gesture label must not be empty");
        self.engine.delete_gesture(label).await?;
        self.refresh_catalog().await
    }

    /// Replaces the read-through cache with a fresh whole-collection read.
    pub async fn refresh_catalog(&self) -> anyhow::Result<()> {
        let catalog = fetch_catalog(self.engine.as_ref()).await?;
        self.catalog_tx.send_replace(catalog);
        let _ = self.notices.send(WorkflowNotice::CatalogRefreshed);
        Ok(())
    }

    /// Abandons in-flight runs on console teardown. Pending timers are
    /// cancelled; already-issued remote mutations complete orphaned.
    pub async fn shutdown(&self) {
        let mut runs = self.runs.lock().await;
        for run in runs.drain(..) {
            run.abort();
        }
    }
}

#[cfg(test)]
#[path = "tests/workflow_tests.rs"]
mod tests;
