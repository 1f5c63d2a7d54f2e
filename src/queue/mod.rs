//! Queue relay
//!
//! The enclave reads from and writes to a single managed queue through the
//! relay. Reads follow a deferred-acknowledgment protocol: a message handed
//! to the enclave is only deleted from the queue when the enclave comes back
//! for more (see [`consumer::QueueConsumer`]).

pub mod consumer;
pub mod sqs;

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Group key stamped on every message the enclave sends
pub const ENCLAVE_GROUP_KEY: &str = "FROM:ENCLAVE";

/// Opaque token identifying one received but not yet deleted message
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QueueHandle(String);

impl QueueHandle {
    pub fn new(handle: impl Into<String>) -> Self {
        Self(handle.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for QueueHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A message as delivered by the backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueMessage {
    /// Backend message id, when the backend reports one
    pub message_id: Option<String>,
    /// Handle to present for acknowledgment
    pub handle: QueueHandle,
    /// Message payload
    pub body: String,
}

/// A message on its way from the enclave to the queue
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    /// Caller-supplied key the backend uses to drop duplicate sends
    pub deduplication_key: String,
    /// Ordering partition
    pub group_key: String,
    pub body: String,
}

impl OutboundMessage {
    /// Creates a message in the enclave's group
    pub fn from_enclave(deduplication_key: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            deduplication_key: deduplication_key.into(),
            group_key: ENCLAVE_GROUP_KEY.to_string(),
            body: body.into(),
        }
    }
}

/// The three queue operations the relay needs, against one resolved queue
#[async_trait]
pub trait QueueBackend: Send + Sync {
    /// Receives up to `max_count` messages; an empty queue yields an empty vec
    async fn receive(&self, max_count: u32) -> Result<Vec<QueueMessage>>;

    /// Permanently removes the message identified by `handle`
    async fn delete(&self, handle: &QueueHandle) -> Result<()>;

    /// Enqueues a message
    async fn send(&self, message: &OutboundMessage) -> Result<()>;
}
