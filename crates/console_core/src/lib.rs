//! Live-state synchronization and workflow orchestration for the gesture
//! engine operator console.
//!
//! The console performs no recognition itself: it renders state pushed by
//! the remote engine and issues commands to it. This crate owns the
//! persistent event-stream connection, the derived activity state, the
//! command gateway, and the capture/training workflow orchestration.
//! Presentation (layout, theming, toast rendering) lives with the caller.

use std::sync::Arc;

use anyhow::Result;
use shared::{domain::ConnectionStatus, protocol::EngineStatus};
use tokio::sync::{broadcast, watch};

pub mod config;
pub mod gateway;
pub mod state;
pub mod stream;
pub mod workflow;

pub use config::{derive_stream_url, load_settings, Settings};
pub use gateway::{Catalog, EngineApi, EngineGateway};
pub use state::{ActivitySnapshot, ActivityStore, HISTORY_CAP, IDLE_LABEL};
pub use stream::EventStreamClient;
pub use workflow::{
    CapturePhase, CaptureState, GestureBinding, TrainingPhase, TrainingState, WorkflowError,
    WorkflowNotice, WorkflowOrchestrator, TRAINING_STEPS,
};

/// One mounted operator console: stream client, derived state, and
/// workflow orchestration wired together.
///
/// Stream-side failures and workflow failures are independent; neither is
/// ever fatal to the console.
pub struct GestureConsole {
    settings: Settings,
    engine: Arc<dyn EngineApi>,
    stream: Arc<EventStreamClient>,
    activity: ActivityStore,
    orchestrator: Arc<WorkflowOrchestrator>,
}

impl GestureConsole {
    /// Connects the event stream and prepares the command side. The stream
    /// keeps retrying in the background until the engine is reachable.
    pub fn connect(settings: Settings) -> Self {
        let engine: Arc<dyn EngineApi> = Arc::new(EngineGateway::new(&*settings.api_base_url));
        Self::with_engine(settings, engine)
    }

    fn with_engine(settings: Settings, engine: Arc<dyn EngineApi>) -> Self {
        let stream = EventStreamClient::connect(&*settings.stream_base_url);
        let activity = ActivityStore::spawn(stream.subscribe(), IDLE_LABEL);
        let orchestrator = WorkflowOrchestrator::new(Arc::clone(&engine));
        Self {
            settings,
            engine,
            stream,
            activity,
            orchestrator,
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn video_feed_url(&self) -> String {
        self.settings.video_feed_url()
    }

    pub fn connection_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.stream.status()
    }

    pub fn activity(&self) -> watch::Receiver<ActivitySnapshot> {
        self.activity.subscribe()
    }

    pub fn capture_state(&self) -> watch::Receiver<CaptureState> {
        self.orchestrator.capture_state()
    }

    pub fn training_state(&self) -> watch::Receiver<TrainingState> {
        self.orchestrator.training_state()
    }

    pub fn catalog(&self) -> watch::Receiver<Catalog> {
        self.orchestrator.catalog()
    }

    pub fn notices(&self) -> broadcast::Receiver<WorkflowNotice> {
        self.orchestrator.subscribe_notices()
    }

    pub async fn engine_health(&self) -> Result<EngineStatus> {
        self.engine.health().await
    }

    pub async fn refresh_catalog(&self) -> Result<()> {
        self.orchestrator.refresh_catalog().await
    }

    pub async fn start_capture(
        &self,
        label: &str,
        binding: GestureBinding,
    ) -> Result<(), WorkflowError> {
        self.orchestrator.start_capture(label, binding).await
    }

    pub async fn start_training(&self) -> Result<(), WorkflowError> {
        self.orchestrator.start_training().await
    }

    pub async fn delete_gesture(&self, label: &str) -> Result<()> {
        self.orchestrator.delete_gesture(label).await
    }

    /// Tears the console down: closes the stream, stops the state fold,
    /// and abandons in-flight workflow runs without rolling back remote
    /// mutations they already issued.
    pub async fn close(&self) {
        self.stream.close().await;
        self.activity.close();
        self.orchestrator.shutdown().await;
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
