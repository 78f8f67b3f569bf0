use std::time::Duration;

use async_trait::async_trait;
use aws_sdk_sqs::error::DisplayErrorContext;
use aws_sdk_sqs::types::MessageAttributeValue;
use aws_sdk_sqs::Client;
use tracing::debug;

use super::{EventQueue, QueueHandle, QueueMessage};
use crate::error::QueueError;

/// Longest delivery delay SQS accepts.
pub const MAX_DELAY_SECS: u64 = 900;

/// SQS-backed implementation of `EventQueue`.
#[derive(Clone)]
pub struct SqsEventQueue {
    client: Client,
}

impl SqsEventQueue {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl EventQueue for SqsEventQueue {
    async fn resolve_queue(&self, name: &str) -> Result<QueueHandle, QueueError> {
        let output = self
            .client
            .get_queue_url()
            .queue_name(name)
            .send()
            .await
            .map_err(|e| QueueError::Resolve {
                queue: name.to_string(),
                message: DisplayErrorContext(&e).to_string(),
            })?;

        let url = output.queue_url().ok_or_else(|| QueueError::Resolve {
            queue: name.to_string(),
            message: "response carried no queue URL".to_string(),
        })?;

        Ok(QueueHandle {
            name: name.to_string(),
            url: url.to_string(),
        })
    }

    async fn send(
        &self,
        queue: &QueueHandle,
        message: &QueueMessage,
    ) -> Result<String, QueueError> {
        let delay = message.delay.as_secs().min(MAX_DELAY_SECS) as i32;

        let mut request = self
            .client
            .send_message()
            .queue_url(&queue.url)
            .message_body(message.body())
            .delay_seconds(delay);

        for (name, value) in message.attributes() {
            let attribute = MessageAttributeValue::builder()
                .data_type("String")
                .string_value(value)
                .build()
                .map_err(|e| QueueError::Send(e.to_string()))?;
            request = request.message_attributes(name, attribute);
        }

        let output = request
            .send()
            .await
            .map_err(|e| QueueError::Send(DisplayErrorContext(&e).to_string()))?;

        let message_id = output.message_id().unwrap_or_default().to_string();
        debug!(queue = %queue.name, message_id = %message_id, "Message sent");

        Ok(message_id)
    }
}

/// Create an SQS client with optional custom endpoint (e.g., LocalStack).
pub async fn create_sqs_client(
    endpoint_url: Option<&str>,
    region: &str,
    timeout: Duration,
) -> Client {
    let sdk_config = super::load_sdk_config(endpoint_url, region, timeout).await;
    Client::new(&sdk_config)
}
