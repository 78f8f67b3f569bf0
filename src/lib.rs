//! # Webcam API
//!
//! An authenticated HTTP ingestion service for webcam images.
//!
//! Clients obtain a bearer token from `POST /login` and submit base64-encoded
//! images with a topic and string metadata to `POST /`. Each accepted
//! submission is stored in S3, recorded in PostgreSQL and announced on an SQS
//! queue with a delivery delay.
//!
//! ## Architecture
//!
//! - [`token`] - HS256 bearer token issuing and validation
//! - [`ingest`] - submission decoding and the ingestion pipeline
//! - [`store`] - S3, PostgreSQL and SQS adapters behind store traits
//! - [`server`] - Axum-based HTTP server and routes
//! - [`config`] - CLI and configuration types
//!
//! ## Example
//!
//! ```rust,no_run
//! use webcam_api::{create_router, IngestSettings, IngestionPipeline, RouterConfig};
//! use webcam_api::store::{create_s3_client, create_sqs_client, S3BlobStore, SqsEventQueue};
//! # use webcam_api::store::MetadataStore;
//! # async fn run<M: MetadataStore + 'static>(records: M) {
//! let timeout = std::time::Duration::from_secs(10);
//! let s3 = create_s3_client(None, "us-east-1", timeout).await;
//! let sqs = create_sqs_client(None, "us-east-1", timeout).await;
//!
//! let pipeline = IngestionPipeline::new(
//!     S3BlobStore::new(s3),
//!     records,
//!     SqsEventQueue::new(sqs),
//!     IngestSettings::new("bucket-picture", "serverless-sqs"),
//! );
//! let router = create_router(pipeline, RouterConfig::new("secret-key"));
//! # }
//! ```

pub mod config;
pub mod error;
pub mod ingest;
pub mod server;
pub mod store;
pub mod token;

// Re-export commonly used types
pub use config::{CheckConfig, Cli, Command, ServeConfig, TokenConfig, TokenOutputFormat};
pub use error::{
    BlobError, DecodeError, IngestError, MetadataError, QueueError, TokenError, ValidationError,
};
pub use ingest::{
    Clock, EnqueuePolicy, IngestReceipt, IngestSettings, IngestionPipeline, ObjectKey, Stage,
    Submission, SystemClock,
};
pub use server::{create_router, AppState, RouterConfig};
pub use store::{BlobStore, EventQueue, MetadataStore, QueueMessage, WebcamRecord};
pub use token::{Claims, Principal, TokenService};
