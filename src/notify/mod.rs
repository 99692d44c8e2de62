//! Outbound notifications.
//!
//! `NotificationChannel` is the fire-and-forget interface the engine
//! talks to. `Notifier` implements it on top of any `MessageSink`:
//! priority messages go out immediately on their own task, everything
//! else is queued and drained by a worker at a fixed pace so the sink
//! is never flooded.

pub mod messages;
pub mod telegram;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info};

/// Pause between queued (non-priority) messages.
pub const QUEUE_PACING: Duration = Duration::from_millis(500);

/// Fire-and-forget message sink used by the engine. Never blocks.
pub trait NotificationChannel: Send + Sync {
    fn enqueue(&self, text: String, priority: bool);
}

/// Destination that actually delivers a message.
#[async_trait]
pub trait MessageSink: Send + Sync + 'static {
    async fn send(&self, text: &str) -> Result<()>;
}

#[async_trait]
impl MessageSink for Box<dyn MessageSink> {
    async fn send(&self, text: &str) -> Result<()> {
        (**self).send(text).await
    }
}

/// Sink that writes notifications to the log. Used when no chat is configured.
pub struct LogSink;

#[async_trait]
impl MessageSink for LogSink {
    async fn send(&self, text: &str) -> Result<()> {
        info!(notification = %text, "Notification");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Notifier
// ---------------------------------------------------------------------------

pub struct Notifier<S: MessageSink> {
    sink: Arc<S>,
    queue: mpsc::UnboundedSender<String>,
    worker: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl<S: MessageSink> Notifier<S> {
    /// Start the queue worker. Must be called inside a tokio runtime.
    pub fn spawn(sink: S, pacing: Duration) -> Arc<Self> {
        let sink = Arc::new(sink);
        let (queue, mut rx) = mpsc::unbounded_channel::<String>();

        let worker_sink = sink.clone();
        let worker = tokio::spawn(async move {
            while let Some(text) = rx.recv().await {
                if let Err(e) = worker_sink.send(&text).await {
                    error!(error = %e, "Failed to deliver queued notification");
                }
                tokio::time::sleep(pacing).await;
            }
        });

        Arc::new(Self {
            sink,
            queue,
            worker: std::sync::Mutex::new(Some(worker)),
        })
    }

    /// Stop the queue worker; queued messages not yet sent are dropped.
    pub fn shutdown(&self) {
        let handle = match self.worker.lock() {
            Ok(mut slot) => slot.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(handle) = handle {
            handle.abort();
        }
    }
}

impl<S: MessageSink> NotificationChannel for Notifier<S> {
    fn enqueue(&self, text: String, priority: bool) {
        if priority {
            let sink = self.sink.clone();
            tokio::spawn(async move {
                if let Err(e) = sink.send(&text).await {
                    error!(error = %e, "Failed to deliver priority notification");
                }
            });
        } else if self.queue.send(text).is_err() {
            error!("Notification queue closed, message dropped");
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
