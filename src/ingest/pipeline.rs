//! Ingestion pipeline for authenticated image submissions.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                     IngestionPipeline                           │
//! │  ┌─────────────────────────────────────────────────────────┐    │
//! │  │                      ingest()                           │    │
//! │  │  1. Decode body        4. Upload image                  │    │
//! │  │  2. Validate fields    5. Insert metadata row           │    │
//! │  │  3. Derive object key  6. Enqueue delayed notification  │    │
//! │  └─────────────────────────────────────────────────────────┘    │
//! │           │                    │                    │           │
//! │           ▼                    ▼                    ▼           │
//! │    ┌───────────┐      ┌───────────────┐     ┌─────────────┐     │
//! │    │ BlobStore │      │ MetadataStore │     │ EventQueue  │     │
//! │    └───────────┘      └───────────────┘     └─────────────┘     │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Stages run strictly in order and each one runs only after the previous one
//! succeeded. Nothing is rolled back: an image uploaded before a failed insert
//! stays in the bucket.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, instrument, warn};

use crate::config::{ServeConfig, DEFAULT_QUEUE_DELAY_SECS, DEFAULT_UPSTREAM_TIMEOUT_SECS};
use crate::error::{BlobError, IngestError, MetadataError, QueueError};
use crate::store::{BlobStore, EventQueue, MetadataStore, QueueMessage, IMAGE_CONTENT_TYPE};
use crate::token::Principal;

use super::submission::{decode_json, ObjectKey, Submission};

// =============================================================================
// Clock
// =============================================================================

/// Source of the current time used to derive object keys.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

// =============================================================================
// Settings
// =============================================================================

/// What to do when the queue notification fails after the image and its
/// metadata were stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EnqueuePolicy {
    /// Log the failure and still report the submission as created
    #[default]
    LogAndAccept,

    /// Report the submission as failed
    FailRequest,
}

/// Fixed parameters of the pipeline.
#[derive(Debug, Clone)]
pub struct IngestSettings {
    /// Bucket images are written to
    pub bucket: String,

    /// Name of the notification queue
    pub queue_name: String,

    /// Delivery delay attached to each notification
    pub queue_delay: Duration,

    /// Upper bound for each external call
    pub upstream_timeout: Duration,

    pub enqueue_policy: EnqueuePolicy,
}

impl IngestSettings {
    /// Settings with the default delay, timeout and enqueue policy.
    pub fn new(bucket: impl Into<String>, queue_name: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            queue_name: queue_name.into(),
            queue_delay: Duration::from_secs(DEFAULT_QUEUE_DELAY_SECS),
            upstream_timeout: Duration::from_secs(DEFAULT_UPSTREAM_TIMEOUT_SECS),
            enqueue_policy: EnqueuePolicy::default(),
        }
    }

    pub fn with_queue_delay(mut self, delay: Duration) -> Self {
        self.queue_delay = delay;
        self
    }

    pub fn with_upstream_timeout(mut self, timeout: Duration) -> Self {
        self.upstream_timeout = timeout;
        self
    }

    pub fn with_enqueue_policy(mut self, policy: EnqueuePolicy) -> Self {
        self.enqueue_policy = policy;
        self
    }
}

impl From<&ServeConfig> for IngestSettings {
    fn from(config: &ServeConfig) -> Self {
        IngestSettings::new(&config.upstream.s3_bucket, &config.upstream.queue_name)
            .with_queue_delay(config.queue_delay())
            .with_upstream_timeout(config.upstream_timeout())
            .with_enqueue_policy(config.enqueue_policy.into())
    }
}

// =============================================================================
// Stages and Results
// =============================================================================

/// Pipeline stage, used to tag failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Decode,
    Validate,
    Upload,
    Persist,
    Enqueue,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Decode => "decode",
            Stage::Validate => "validate",
            Stage::Upload => "upload",
            Stage::Persist => "persist",
            Stage::Enqueue => "enqueue",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl IngestError {
    /// The stage that produced this error.
    pub fn stage(&self) -> Stage {
        match self {
            IngestError::Decode(_) => Stage::Decode,
            IngestError::Validation(_) => Stage::Validate,
            IngestError::InvalidImage(_) | IngestError::Upload(_) => Stage::Upload,
            IngestError::Persist(_) => Stage::Persist,
            IngestError::Enqueue(_) => Stage::Enqueue,
        }
    }
}

/// Outcome of an accepted submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestReceipt {
    /// Key the image was stored under
    pub object_key: ObjectKey,

    /// Queue message id, `None` when the notification failed and was tolerated
    pub message_id: Option<String>,
}

// =============================================================================
// Pipeline
// =============================================================================

/// Runs a submission through upload, persistence and notification.
///
/// # Type Parameters
///
/// * `B` - Object store for image bytes
/// * `M` - Relational store for metadata rows
/// * `Q` - Queue for delayed notifications
pub struct IngestionPipeline<B, M, Q> {
    blobs: B,
    records: M,
    queue: Q,
    settings: IngestSettings,
    clock: Arc<dyn Clock>,
}

impl<B, M, Q> IngestionPipeline<B, M, Q>
where
    B: BlobStore,
    M: MetadataStore,
    Q: EventQueue,
{
    pub fn new(blobs: B, records: M, queue: Q, settings: IngestSettings) -> Self {
        Self {
            blobs,
            records,
            queue,
            settings,
            clock: Arc::new(SystemClock),
        }
    }

    /// Replace the clock used to derive object keys.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn settings(&self) -> &IngestSettings {
        &self.settings
    }

    /// Process one raw request body on behalf of `principal`.
    ///
    /// Returns the first failing stage's error. Stages completed before that
    /// failure keep their effects.
    #[instrument(skip_all, fields(client = %principal.name()))]
    pub async fn ingest(
        &self,
        principal: &Principal,
        body: &[u8],
    ) -> Result<IngestReceipt, IngestError> {
        let submission: Submission = decode_json(body)?;
        submission.validate()?;

        let key = ObjectKey::at(self.clock.now());
        let image = submission.image_bytes()?;
        debug!(
            object_key = %key,
            topic = %submission.topic,
            size_bytes = image.len(),
            "Submission decoded"
        );

        let timeout = self.settings.upstream_timeout;
        bounded(
            timeout,
            self.blobs
                .put(&self.settings.bucket, key.as_str(), image, IMAGE_CONTENT_TYPE),
            BlobError::Timeout,
        )
        .await?;

        let record = submission.into_record(&key);
        bounded(timeout, self.records.insert(&record), MetadataError::Timeout)
            .await
            .inspect_err(|e| {
                warn!(
                    object_key = %key,
                    bucket = %self.settings.bucket,
                    error = %e,
                    "Metadata insert failed, uploaded image left in place"
                );
            })?;

        let message_id = match self.enqueue(&key).await {
            Ok(id) => Some(id),
            Err(e) => match self.settings.enqueue_policy {
                EnqueuePolicy::LogAndAccept => {
                    error!(
                        object_key = %key,
                        queue = %self.settings.queue_name,
                        error = %e,
                        "Notification failed, submission accepted without it"
                    );
                    None
                }
                EnqueuePolicy::FailRequest => return Err(e.into()),
            },
        };

        info!(object_key = %key, "Submission stored");

        Ok(IngestReceipt {
            object_key: key,
            message_id,
        })
    }

    async fn enqueue(&self, key: &ObjectKey) -> Result<String, QueueError> {
        let timeout = self.settings.upstream_timeout;

        let handle = bounded(
            timeout,
            self.queue.resolve_queue(&self.settings.queue_name),
            QueueError::Timeout,
        )
        .await?;

        let message = QueueMessage {
            object_key: key.to_string(),
            bucket_name: self.settings.bucket.clone(),
            delay: self.settings.queue_delay,
        };

        bounded(timeout, self.queue.send(&handle, &message), QueueError::Timeout).await
    }
}

/// Await `call`, failing with `on_timeout` once `limit` has elapsed.
async fn bounded<T, E, F>(limit: Duration, call: F, on_timeout: fn(Duration) -> E) -> Result<T, E>
where
    F: Future<Output = Result<T, E>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(on_timeout(limit)),
    }
}

// =============================================================================
// Tests
// =============================================================================
