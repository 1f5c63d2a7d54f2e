//! SNS publish relay

use crate::error::{RelayError, Result};
use aws_sdk_sns::Client as SnsClient;
use tracing::info;

/// Publishes enclave messages to one topic
pub struct TopicPublisher {
    client: SnsClient,
    topic_arn: Option<String>,
}

impl TopicPublisher {
    pub fn new(client: SnsClient, topic_arn: Option<String>) -> Self {
        Self { client, topic_arn }
    }

    /// Publishes `message` and returns the id SNS assigned to it
    pub async fn publish(&self, message: &str) -> Result<Option<String>> {
        let topic_arn = self
            .topic_arn
            .as_deref()
            .ok_or_else(|| RelayError::Config("No SNS topic configured".to_string()))?;

        let response = self
            .client
            .publish()
            .topic_arn(topic_arn)
            .message(message)
            .send()
            .await
            .map_err(|e| RelayError::Topic(format!("Publish failed: {}", e)))?;

        let message_id = response.message_id().map(ToOwned::to_owned);
        info!(topic_arn = %topic_arn, message_id = ?message_id, "Message published");
        Ok(message_id)
    }
}
