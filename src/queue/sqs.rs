//! SQS implementation of the queue backend
//!
//! The queue URL is resolved once from the logical queue name when the relay
//! starts. A failure there is fatal: without a queue there is nothing to relay.

use super::{OutboundMessage, QueueBackend, QueueHandle, QueueMessage};
use crate::error::{RelayError, Result};
use async_trait::async_trait;
use aws_sdk_sqs::Client as SqsClient;
use tracing::{debug, info, warn};

/// SQS queue bound to a single resolved URL
#[derive(Debug, Clone)]
pub struct SqsBackend {
    client: SqsClient,
    queue_url: String,
    wait_time_seconds: i32,
}

impl SqsBackend {
    /// Resolves `queue_name` to its URL and binds the backend to it
    pub async fn resolve(
        client: SqsClient,
        queue_name: &str,
        wait_time_seconds: i32,
    ) -> Result<Self> {
        info!(queue_name = %queue_name, "Resolving queue URL");

        let response = client
            .get_queue_url()
            .queue_name(queue_name)
            .send()
            .await
            .map_err(|e| RelayError::Queue(format!("GetQueueUrl failed for {}: {}", queue_name, e)))?;

        let queue_url = response
            .queue_url()
            .ok_or_else(|| RelayError::Queue(format!("No URL returned for queue {}", queue_name)))?
            .to_string();

        info!(queue_name = %queue_name, queue_url = %queue_url, "Queue URL resolved");

        Ok(Self::with_url(client, queue_url, wait_time_seconds))
    }

    /// Binds the backend to an already known queue URL
    pub fn with_url(client: SqsClient, queue_url: impl Into<String>, wait_time_seconds: i32) -> Self {
        Self {
            client,
            queue_url: queue_url.into(),
            wait_time_seconds,
        }
    }

    pub fn queue_url(&self) -> &str {
        &self.queue_url
    }
}

#[async_trait]
impl QueueBackend for SqsBackend {
    async fn receive(&self, max_count: u32) -> Result<Vec<QueueMessage>> {
        let max_count = i32::try_from(max_count)
            .map_err(|_| RelayError::InvalidRequest(format!("batch size too large: {}", max_count)))?;

        let response = self
            .client
            .receive_message()
            .queue_url(&self.queue_url)
            .max_number_of_messages(max_count)
            .wait_time_seconds(self.wait_time_seconds)
            .send()
            .await
            .map_err(|e| RelayError::Queue(format!("ReceiveMessage failed: {}", e)))?;

        let messages: Vec<QueueMessage> = response
            .messages()
            .iter()
            .filter_map(|message| {
                let Some(handle) = message.receipt_handle() else {
                    warn!(message_id = ?message.message_id(), "Dropping message without receipt handle");
                    return None;
                };
                Some(QueueMessage {
                    message_id: message.message_id().map(ToOwned::to_owned),
                    handle: QueueHandle::new(handle),
                    body: message.body().unwrap_or_default().to_string(),
                })
            })
            .collect();

        debug!(count = messages.len(), "Messages received");
        Ok(messages)
    }

    async fn delete(&self, handle: &QueueHandle) -> Result<()> {
        self.client
            .delete_message()
            .queue_url(&self.queue_url)
            .receipt_handle(handle.as_str())
            .send()
            .await
            .map_err(|e| RelayError::Queue(format!("DeleteMessage failed: {}", e)))?;

        debug!("Message deleted");
        Ok(())
    }

    async fn send(&self, message: &OutboundMessage) -> Result<()> {
        let response = self
            .client
            .send_message()
            .queue_url(&self.queue_url)
            .message_body(&message.body)
            .message_deduplication_id(&message.deduplication_key)
            .message_group_id(&message.group_key)
            .send()
            .await
            .map_err(|e| RelayError::Queue(format!("SendMessage failed: {}", e)))?;

        debug!(
            message_id = ?response.message_id(),
            deduplication_key = %message.deduplication_key,
            "Message sent"
        );
        Ok(())
    }
}
