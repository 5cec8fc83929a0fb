use super::*;
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use shared::domain::ActionBinding;
use shared::protocol::EngineStatus;
use std::collections::HashMap;
use std::time::Instant;
use tokio::time::timeout;

#[derive(Default)]
struct ScriptedEngine {
    gestures: Vec<String>,
    fail_upsert: Option<String>,
    fail_record: Option<String>,
    fail_training: Option<String>,
    training_delay: Duration,
    upserts: Mutex<Vec<shared::protocol::ActionUpdateRequest>>,
    recordings: Mutex<Vec<shared::protocol::RecordRequest>>,
    deletions: Mutex<Vec<String>>,
    train_calls: Mutex<u32>,
}

impl ScriptedEngine {
    fn ok() -> Arc<Self> {
        Arc::new(Self {
            gestures: vec!["Fist".to_string()],
            ..Self::default()
        })
    }
}

#[async_trait]
impl EngineApi for ScriptedEngine {
    async fn health(&self) -> Result<EngineStatus> {
        Ok(EngineStatus {
            status: "ok".to_string(),
        })
    }

    async fn list_gestures(&self) -> Result<Vec<String>> {
        Ok(self.gestures.clone())
    }

    async fn list_actions(&self) -> Result<HashMap<String, ActionBinding>> {
        Ok(HashMap::new())
    }

    async fn upsert_action(&self, request: &shared::protocol::ActionUpdateRequest) -> Result<()> {
        if let Some(err) = &self.fail_upsert {
            return Err(anyhow!(err.clone()));
        }
        self.upserts.lock().await.push(request.clone());
        Ok(())
    }

    async fn start_recording(&self, request: &shared::protocol::RecordRequest) -> Result<()> {
        if let Some(err) = &self.fail_record {
            return Err(anyhow!(err.clone()));
        }
        self.recordings.lock().await.push(request.clone());
        Ok(())
    }

    async fn delete_gesture(&self, label: &str) -> Result<()> {
        self.deletions.lock().await.push(label.to_string());
        Ok(())
    }

    async fn trigger_training(&self) -> Result<()> {
        *self.train_calls.lock().await += 1;
        tokio::time::sleep(self.training_delay).await;
        if let Some(err) = &self.fail_training {
            return Err(anyhow!(err.clone()));
        }
        Ok(())
    }
}

fn orchestrator(engine: Arc<ScriptedEngine>) -> Arc<WorkflowOrchestrator> {
    WorkflowOrchestrator::with_timings(
        engine,
        Duration::from_millis(100),
        Duration::from_millis(20),
    )
}

async fn wait_capture(rx: &mut watch::Receiver<CaptureState>, phase: CapturePhase) -> CaptureState {
    timeout(Duration::from_secs(3), rx.wait_for(|s| s.phase == phase))
        .await
        .unwrap_or_else(|_| panic!("timed out waiting for capture {phase:?}"))
        .expect("capture channel closed")
        .clone()
}

async fn wait_training(
    rx: &mut watch::Receiver<TrainingState>,
    phase: TrainingPhase,
) -> TrainingState {
    timeout(Duration::from_secs(3), rx.wait_for(|s| s.phase == phase))
        .await
        .unwrap_or_else(|_| panic!("timed out waiting for training {phase:?}"))
        .expect("training channel closed")
        .clone()
}

#[tokio::test]
async fn rejects_empty_label_before_any_remote_call() {
    let engine = ScriptedEngine::ok();
    let orchestrator = orchestrator(Arc::clone(&engine));

    let err = orchestrator
        .start_capture("  ", GestureBinding::Predefined)
        .await
        .expect_err("must reject");
    assert_eq!(err, WorkflowError::EmptyLabel);
    assert!(engine.upserts.lock().await.is_empty());
}

#[tokio::test]
async fn rejects_empty_custom_command_before_any_remote_call() {
    let engine = ScriptedEngine::ok();
    let orchestrator = orchestrator(Arc::clone(&engine));

    let err = orchestrator
        .start_capture(
            "Launch Terminal",
            GestureBinding::Custom {
                command: " ".to_string(),
            },
        )
        .await
        .expect_err("must reject");
    assert_eq!(err, WorkflowError::EmptyCommand);
    assert!(engine.upserts.lock().await.is_empty());
}

#[tokio::test]
async fn rejects_second_capture_while_one_is_active() {
    let engine = ScriptedEngine::ok();
    let orchestrator = orchestrator(Arc::clone(&engine));
    let mut capture = orchestrator.capture_state();

    orchestrator
        .start_capture("Fist", GestureBinding::Predefined)
        .await
        .expect("first start");
    wait_capture(&mut capture, CapturePhase::Capturing).await;

    let err = orchestrator
        .start_capture("Palm", GestureBinding::Predefined)
        .await
        .expect_err("must reject re-entry");
    assert_eq!(err, WorkflowError::CaptureActive);
    assert_eq!(engine.upserts.lock().await.len(), 1);
    orchestrator.shutdown().await;
}

#[tokio::test]
async fn registration_failure_fails_run_without_recording() {
    let engine = Arc::new(ScriptedEngine {
        fail_upsert: Some("engine offline".to_string()),
        ..ScriptedEngine::default()
    });
    let orchestrator = orchestrator(Arc::clone(&engine));
    let mut notices = orchestrator.subscribe_notices();
    let mut capture = orchestrator.capture_state();

    orchestrator
        .start_capture("Fist", GestureBinding::Predefined)
        .await
        .expect("start");
    wait_capture(&mut capture, CapturePhase::Failed).await;

    assert!(engine.recordings.lock().await.is_empty());
    let failure = timeout(Duration::from_secs(2), async {
        loop {
            if let WorkflowNotice::CaptureFailed { reason, .. } =
                notices.recv().await.expect("notice")
            {
                break reason;
            }
        }
    })
    .await
    .expect("failure notice");
    assert!(failure.contains("engine offline"));
}

#[tokio::test]
async fn recording_failure_fails_run_after_registration() {
    let engine = Arc::new(ScriptedEngine {
        fail_record: Some("already recording".to_string()),
        ..ScriptedEngine::default()
    });
    let orchestrator = orchestrator(Arc::clone(&engine));
    let mut capture = orchestrator.capture_state();

    orchestrator
        .start_capture("Fist", GestureBinding::Predefined)
        .await
        .expect("start");
    wait_capture(&mut capture, CapturePhase::Failed).await;
    assert_eq!(engine.upserts.lock().await.len(), 1);

    // The failed run released its slot; a retry starts fresh.
    orchestrator
        .start_capture("Fist", GestureBinding::Predefined)
        .await
        .expect("retry accepted");
    orchestrator.shutdown().await;
}

#[tokio::test]
async fn capture_settles_no_sooner_than_the_capture_duration() {
    let engine = ScriptedEngine::ok();
    let orchestrator = orchestrator(Arc::clone(&engine));
    let mut capture = orchestrator.capture_state();
    let started = Instant::now();

    orchestrator
        .start_capture("Volume Up", GestureBinding::Predefined)
        .await
        .expect("start");
    let settled = wait_capture(&mut capture, CapturePhase::Settled).await;

    assert!(
        started.elapsed() >= Duration::from_millis(100),
        "settled before the capture timer expired"
    );
    assert_eq!(settled.label.as_deref(), Some("Volume Up"));

    let upserts = engine.upserts.lock().await;
    assert_eq!(upserts[0].command, "volume_up");
    assert_eq!(upserts[0].action_type, shared::domain::ActionKind::Predefined);
    let recordings = engine.recordings.lock().await;
    assert_eq!(recordings[0].num_frames, CAPTURE_FRAMES);

    // Settling refreshed the read-through cache.
    assert_eq!(orchestrator.catalog().borrow().gestures, ["Fist"]);
}

#[tokio::test]
async fn custom_binding_registers_the_operator_command() {
    let engine = ScriptedEngine::ok();
    let orchestrator = orchestrator(Arc::clone(&engine));
    let mut capture = orchestrator.capture_state();

    orchestrator
        .start_capture(
            "Launch Terminal",
            GestureBinding::Custom {
                command: "x-terminal-emulator".to_string(),
            },
        )
        .await
        .expect("start");
    wait_capture(&mut capture, CapturePhase::Settled).await;

    let upserts = engine.upserts.lock().await;
    assert_eq!(upserts[0].action_type, shared::domain::ActionKind::Custom);
    assert_eq!(upserts[0].command, "x-terminal-emulator");
}

#[tokio::test]
async fn training_outcome_follows_request_even_if_sequencer_is_behind() {
    let engine = Arc::new(ScriptedEngine {
        training_delay: Duration::from_millis(30),
        ..ScriptedEngine::default()
    });
    // Step interval far longer than the request: the sequencer never fires.
    let orchestrator = WorkflowOrchestrator::with_timings(
        engine.clone(),
        Duration::from_millis(100),
        Duration::from_secs(60),
    );
    let mut training = orchestrator.training_state();

    orchestrator.start_training().await.expect("start");
    let terminal = wait_training(&mut training, TrainingPhase::Succeeded).await;
    assert_eq!(terminal.step_index, 0);
}

#[tokio::test]
async fn training_failure_wins_even_after_sequencer_reaches_last_phase() {
    let engine = Arc::new(ScriptedEngine {
        training_delay: Duration::from_millis(300),
        fail_training: Some("Training failed (no data?)".to_string()),
        ..ScriptedEngine::default()
    });
    let orchestrator = WorkflowOrchestrator::with_timings(
        engine.clone(),
        Duration::from_millis(100),
        Duration::from_millis(10),
    );
    let mut training = orchestrator.training_state();
    let mut notices = orchestrator.subscribe_notices();

    orchestrator.start_training().await.expect("start");
    let terminal = wait_training(&mut training, TrainingPhase::Failed).await;

    // Clamped at the last cosmetic phase, never beyond it.
    assert_eq!(terminal.step_index, TRAINING_STEPS.len() - 1);
    let failure = timeout(Duration::from_secs(2), async {
        loop {
            if let WorkflowNotice::TrainingFailed { reason } = notices.recv().await.expect("notice")
            {
                break reason;
            }
        }
    })
    .await
    .expect("failure notice");
    assert!(failure.contains("Training failed"));
}

#[tokio::test]
async fn second_training_start_is_rejected_while_running() {
    let engine = Arc::new(ScriptedEngine {
        training_delay: Duration::from_millis(200),
        ..ScriptedEngine::default()
    });
    let orchestrator = orchestrator(Arc::clone(&engine));
    let mut training = orchestrator.training_state();

    orchestrator.start_training().await.expect("first start");
    let err = orchestrator
        .start_training()
        .await
        .expect_err("must reject re-entry");
    assert_eq!(err, WorkflowError::TrainingActive);

    wait_training(&mut training, TrainingPhase::Succeeded).await;
    assert_eq!(*engine.train_calls.lock().await, 1);

    // Terminal states allow a fresh run.
    orchestrator.start_training().await.expect("second run");
    wait_training(&mut training, TrainingPhase::Succeeded).await;
    assert_eq!(*engine.train_calls.lock().await, 2);
}

#[tokio::test]
async fn delete_gesture_replaces_the_catalog_snapshot() {
    let engine = ScriptedEngine::ok();
    let orchestrator = orchestrator(Arc::clone(&engine));
    let mut notices = orchestrator.subscribe_notices();

    orchestrator.delete_gesture("Palm").await.expect("delete");

    assert_eq!(engine.deletions.lock().await.clone(), vec!["Palm".to_string()]);
    assert_eq!(orchestrator.catalog().borrow().gestures, ["Fist"]);
    let notice = notices.recv().await.expect("notice");
    assert_eq!(notice, WorkflowNotice::CatalogRefreshed);
}

#[tokio::test]
async fn shutdown_abandons_an_active_run_without_settling_it() {
    let engine = ScriptedEngine::ok();
    let orchestrator = WorkflowOrchestrator::with_timings(
        engine.clone(),
        Duration::from_secs(60),
        Duration::from_millis(20),
    );
    let mut capture = orchestrator.capture_state();

    orchestrator
        .start_capture("Fist", GestureBinding::Predefined)
        .await
        .expect("start");
    wait_capture(&mut capture, CapturePhase::Capturing).await;
    orchestrator.shutdown().await;

    tokio::time::sleep(Duration::from_millis(50)).await;
    // Abandoned, not rolled back: the issued mutations stand, the run's
    // state is simply left where it was.
    assert_eq!(capture.borrow().phase, CapturePhase::Capturing);
    assert_eq!(engine.recordings.lock().await.len(), 1);
}
