//! External store capabilities.
//!
//! The ingestion pipeline talks to three external systems, each behind its own
//! trait so it can run against substitutes in tests:
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                   IngestionPipeline                      │
//! └──────┬───────────────────┬────────────────────┬──────────┘
//!        │                   │                    │
//!        ▼                   ▼                    ▼
//! ┌─────────────┐   ┌─────────────────┐   ┌───────────────┐
//! │  BlobStore  │   │  MetadataStore  │   │  EventQueue   │
//! │    (S3)     │   │  (PostgreSQL)   │   │    (SQS)      │
//! └─────────────┘   └─────────────────┘   └───────────────┘
//! ```
//!
//! The stores share no transaction. A failure in a later store leaves the
//! writes of earlier stores in place.

mod postgres;
mod s3;
mod sqs;

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use aws_config::retry::RetryConfig;
use aws_config::timeout::TimeoutConfig;
use aws_config::{BehaviorVersion, Region, SdkConfig};
use bytes::Bytes;
use chrono::{DateTime, Utc};

use crate::error::{BlobError, MetadataError, QueueError};

pub use postgres::{pg_connect_options, PgMetadataStore};
pub use s3::{create_s3_client, S3BlobStore};
pub use sqs::{create_sqs_client, SqsEventQueue, MAX_DELAY_SECS};

/// Content type attached to every stored image.
pub const IMAGE_CONTENT_TYPE: &str = "image/jpeg";

// =============================================================================
// Records
// =============================================================================

/// Metadata row written once per accepted submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebcamRecord {
    /// Key of the stored image
    pub object_key: String,

    /// Submission topic
    pub topic: String,

    /// Free-form string metadata
    pub metadata: BTreeMap<String, String>,

    /// Caller-supplied timestamp; `None` lets the store default the column
    pub created_at: Option<DateTime<Utc>>,
}

/// Message announcing a stored image to downstream consumers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueMessage {
    pub object_key: String,
    pub bucket_name: String,

    /// How long the message stays invisible after sending
    pub delay: Duration,
}

impl QueueMessage {
    /// The message body: the object key.
    pub fn body(&self) -> &str {
        &self.object_key
    }

    /// String attributes carried alongside the body.
    pub fn attributes(&self) -> BTreeMap<&'static str, &str> {
        BTreeMap::from([
            ("image_object_key", self.object_key.as_str()),
            ("bucket_name", self.bucket_name.as_str()),
        ])
    }
}

/// A resolved queue address (the SQS queue URL).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueHandle {
    pub name: String,
    pub url: String,
}

// =============================================================================
// Capabilities
// =============================================================================

/// Binary object storage addressed by bucket and key.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store `body` under `bucket`/`key`, replacing any existing object.
    async fn put(
        &self,
        bucket: &str,
        key: &str,
        body: Bytes,
        content_type: &str,
    ) -> Result<(), BlobError>;
}

/// Relational storage for submission metadata.
#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// Insert one record. Records with the same object key are independent rows.
    async fn insert(&self, record: &WebcamRecord) -> Result<(), MetadataError>;
}

/// Delayed-delivery message queue.
#[async_trait]
pub trait EventQueue: Send + Sync {
    /// Look up a queue by name.
    async fn resolve_queue(&self, name: &str) -> Result<QueueHandle, QueueError>;

    /// Send a message, returning the queue-assigned message id.
    async fn send(&self, queue: &QueueHandle, message: &QueueMessage)
        -> Result<String, QueueError>;
}

/// Load the shared AWS configuration used by the S3 and SQS clients.
///
/// Retries are disabled and every operation is bounded by `timeout`.
pub(crate) async fn load_sdk_config(
    endpoint_url: Option<&str>,
    region: &str,
    timeout: Duration,
) -> SdkConfig {
    let mut loader = aws_config::defaults(BehaviorVersion::latest())
        .region(Region::new(region.to_string()))
        .retry_config(RetryConfig::disabled())
        .timeout_config(
            TimeoutConfig::builder()
                .operation_timeout(timeout)
                .connect_timeout(timeout)
                .build(),
        );

    if let Some(endpoint) = endpoint_url {
        loader = loader.endpoint_url(endpoint);
    }

    loader.load().await
}
