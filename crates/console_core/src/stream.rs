//! Supervised event-stream connection to the engine push channel.

use std::{sync::Arc, time::Duration};

use futures::StreamExt;
use shared::{domain::ConnectionStatus, protocol::RecognitionEvent};
use tokio::{
    sync::{broadcast, watch, Mutex},
    task::JoinHandle,
};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{info, warn};

pub const RECONNECT_DELAY: Duration = Duration::from_secs(3);
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// One logical persistent connection to the engine's push channel.
///
/// Transport errors are never fatal to the caller: they are absorbed into
/// [`ConnectionStatus`] and an indefinite fixed-delay retry loop. Engine
/// availability is intermittent during device startup, so there is no
/// backoff growth and no retry ceiling.
pub struct EventStreamClient {
    events: broadcast::Sender<RecognitionEvent>,
    status_rx: watch::Receiver<ConnectionStatus>,
    supervisor: Mutex<Option<JoinHandle<()>>>,
}

impl EventStreamClient {
    /// Establishes the stream connection and starts the supervisor task.
    pub fn connect(stream_base_url: impl Into<String>) -> Arc<Self> {
        Self::connect_with_delay(stream_base_url, RECONNECT_DELAY)
    }

    pub(crate) fn connect_with_delay(
        stream_base_url: impl Into<String>,
        reconnect_delay: Duration,
    ) -> Arc<Self> {
        let stream_base_url = stream_base_url.into();
        let ws_url = format!("{}/ws", stream_base_url.trim_end_matches('/'));
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let (status_tx, status_rx) = watch::channel(ConnectionStatus::Connecting);
        let supervisor = tokio::spawn(run_stream(
            ws_url,
            events.clone(),
            status_tx,
            reconnect_delay,
        ));
        Arc::new(Self {
            events,
            status_rx,
            supervisor: Mutex::new(Some(supervisor)),
        })
    }

    /// Registers a consumer for decoded recognition events.
    pub fn subscribe(&self) -> broadcast::Receiver<RecognitionEvent> {
        self.events.subscribe()
    }

    pub fn status(&self) -> watch::Receiver<ConnectionStatus> {
        self.status_rx.clone()
    }

    /// Scoped teardown: releases the connection and cancels any pending
    /// reconnect timer. No event is delivered after this returns.
    pub async fn close(&self) {
        let task = self.supervisor.lock().await.take();
        if let Some(task) = task {
            task.abort();
            let _ = task.await;
        }
    }
}

async fn run_stream(
    ws_url: String,
    events: broadcast::Sender<RecognitionEvent>,
    status_tx: watch::Sender<ConnectionStatus>,
    reconnect_delay: Duration,
) {
    loop {
        let _ = status_tx.send(ConnectionStatus::Connecting);
        match connect_async(&ws_url).await {
            Ok((ws_stream, _)) => {
                info!(url = %ws_url, "engine event stream connected");
                let _ = status_tx.send(ConnectionStatus::Connected);
                let (_, mut reader) = ws_stream.split();
                while let Some(frame) = reader.next().await {
                    match frame {
                        Ok(Message::Text(text)) => {
                            match serde_json::from_str::<RecognitionEvent>(&text) {
                                Ok(event) => {
                                    let _ = events.send(event);
                                }
                                // Malformed frames are dropped without
                                // touching connection status.
                                Err(err) => warn!(%err, "dropping undecodable engine frame"),
                            }
                        }
                        Ok(Message::Close(_)) => break,
                        Ok(_) => {}
                        Err(err) => {
                            warn!(%err, "engine event stream receive failed");
                            break;
                        }
                    }
                }
            }
            Err(err) => warn!(url = %ws_url, %err, "engine event stream connect failed"),
        }
        let _ = status_tx.send(ConnectionStatus::Errored);
        tokio::time::sleep(reconnect_delay).await;
    }
}

#[cfg(test)]
#[path = "tests/stream_tests.rs"]
mod tests;
