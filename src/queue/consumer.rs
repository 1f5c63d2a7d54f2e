//! Queue consumer with deferred acknowledgment
//!
//! The enclave has a single reader. Each read hands out a batch of messages
//! and remembers the handle of the last one; that message is deleted from
//! the queue at the start of the following read, before anything new is
//! received. In explicit mode the caller names the handle to delete instead.
//!
//! ## State
//!
//! - `Idle`: nothing handed out is awaiting acknowledgment
//! - `AwaitingAck`: the pending handle is held until the next poll
//!
//! The pending handle lives behind an async mutex that is held for the whole
//! poll cycle, so concurrent requests are served strictly one after another.
//! A restart loses the pending handle; the message then reappears once its
//! visibility timeout expires.

use super::{OutboundMessage, QueueBackend, QueueHandle, QueueMessage};
use crate::config::AckMode;
use crate::error::Result;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Observable consumer state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsumerState {
    Idle,
    AwaitingAck,
}

/// Single-reader consumer for one queue
pub struct QueueConsumer {
    backend: Arc<dyn QueueBackend>,
    ack_mode: AckMode,
    pending_ack: Mutex<Option<QueueHandle>>,
}

impl QueueConsumer {
    pub fn new(backend: Arc<dyn QueueBackend>, ack_mode: AckMode) -> Self {
        Self {
            backend,
            ack_mode,
            pending_ack: Mutex::new(None),
        }
    }

    pub fn ack_mode(&self) -> AckMode {
        self.ack_mode
    }

    /// Handle awaiting acknowledgment, if any
    pub async fn pending_ack(&self) -> Option<QueueHandle> {
        self.pending_ack.lock().await.clone()
    }

    pub async fn state(&self) -> ConsumerState {
        if self.pending_ack.lock().await.is_some() {
            ConsumerState::AwaitingAck
        } else {
            ConsumerState::Idle
        }
    }

    /// Acknowledges the previous delivery and receives up to `max_count` new messages
    ///
    /// `ack_handle` is only consulted in explicit mode. A failed delete is
    /// logged and the poll carries on; a failed receive fails the poll.
    pub async fn poll(
        &self,
        max_count: u32,
        ack_handle: Option<QueueHandle>,
    ) -> Result<Vec<QueueMessage>> {
        let mut pending = self.pending_ack.lock().await;

        // Taken up front so a handle is never deleted twice, even when the
        // delete below or the receive after it fails.
        let remembered = pending.take();
        let to_delete = match self.ack_mode {
            AckMode::Implicit => {
                if ack_handle.is_some() {
                    debug!("Ignoring caller handle in implicit ack mode");
                }
                remembered
            }
            // A blank handle names nothing the backend could delete
            AckMode::Explicit => ack_handle.filter(|h| !h.as_str().trim().is_empty()),
        };

        if let Some(handle) = to_delete {
            match self.backend.delete(&handle).await {
                Ok(()) => debug!(handle = %handle, "Acknowledged previous message"),
                Err(e) => warn!(
                    handle = %handle,
                    error = %e,
                    "Failed to acknowledge message, it will be redelivered"
                ),
            }
        }

        let messages = self.backend.receive(max_count).await?;

        // Only the last message is remembered; it stands in for the whole batch
        *pending = messages.last().map(|m| m.handle.clone());

        if messages.is_empty() {
            debug!("No messages available");
        } else {
            info!(count = messages.len(), "Delivered messages");
        }

        Ok(messages)
    }

    /// Forwards a message from the enclave to the queue
    pub async fn send(&self, deduplication_key: &str, body: &str) -> Result<()> {
        let message = OutboundMessage::from_enclave(deduplication_key, body);
        self.backend.send(&message).await?;
        info!(deduplication_key = %deduplication_key, body_len = body.len(), "Message forwarded to queue");
        Ok(())
    }
}
