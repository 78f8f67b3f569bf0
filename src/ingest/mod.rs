//! Submission decoding and the ingestion pipeline.
//!
//! - [`submission`] - request bodies, strict JSON decoding, object keys
//! - [`pipeline`] - ordered upload, persist and enqueue stages

pub mod pipeline;
pub mod submission;

pub use pipeline::{
    Clock, EnqueuePolicy, IngestReceipt, IngestSettings, IngestionPipeline, Stage, SystemClock,
};
pub use submission::{decode_json, LoginRequest, ObjectKey, Submission};
