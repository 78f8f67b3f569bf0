use std::time::Duration;

use thiserror::Error;

/// Errors produced while validating a bearer token.
///
/// Every variant is reported to the caller as a plain 401; the variant itself
/// only shows up in logs and tests.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenError {
    /// No token was presented
    #[error("missing token")]
    Missing,

    /// Token is not a well-formed HS256 JWT carrying the expected claims
    #[error("malformed token: {0}")]
    Malformed(String),

    /// Signature does not match the signing secret
    #[error("invalid token signature")]
    InvalidSignature,

    /// Token expiry is in the past
    #[error("token expired at {expired_at} (current time: {current_time})")]
    Expired { expired_at: i64, current_time: i64 },
}

/// Errors raised while decoding a JSON request body.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// Body was empty
    #[error("Request body must not be empty")]
    Empty,

    /// Body is not syntactically valid JSON
    #[error("Request body contains badly-formed JSON (at line {line}, column {column})")]
    Syntax { line: usize, column: usize },

    /// Body ended in the middle of a JSON value
    #[error("Request body contains badly-formed JSON")]
    Truncated,

    /// A field held a value of the wrong type or an unparseable value
    #[error("Request body contains an invalid value (at line {line}, column {column}): {detail}")]
    InvalidValue {
        detail: String,
        line: usize,
        column: usize,
    },

    /// Body contains a field that is not part of the schema
    #[error("Request body contains unknown field \"{0}\"")]
    UnknownField(String),

    /// Body exceeds the configured size limit
    #[error("Request body must not be larger than {}", human_size(.limit))]
    TooLarge { limit: usize },

    /// Anything else the decoder or body reader reported
    #[error("failed to read request body: {0}")]
    Other(String),
}

/// A required field was empty or missing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Name field is required")]
    MissingName,

    #[error("image field is required")]
    MissingImage,

    #[error("topic field is required")]
    MissingTopic,

    #[error("metadata field is required")]
    MissingMetadata,
}

/// Errors from the object store.
#[derive(Debug, Clone, Error)]
pub enum BlobError {
    /// The store rejected or failed the write
    #[error("upload of s3://{bucket}/{key} failed: {message}")]
    Upload {
        bucket: String,
        key: String,
        message: String,
    },

    /// The write did not finish within the upstream timeout
    #[error("upload timed out after {0:?}")]
    Timeout(Duration),
}

/// Errors from the relational store.
#[derive(Debug, Clone, Error)]
pub enum MetadataError {
    /// No connection could be obtained
    #[error("unable to connect to DB: {0}")]
    Connection(String),

    /// The INSERT statement failed
    #[error("unable to insert record: {0}")]
    Insert(String),

    /// The insert did not finish within the upstream timeout
    #[error("insert timed out after {0:?}")]
    Timeout(Duration),
}

/// Errors from the message queue.
#[derive(Debug, Clone, Error)]
pub enum QueueError {
    /// The queue URL could not be resolved from its name
    #[error("unable to resolve queue {queue}: {message}")]
    Resolve { queue: String, message: String },

    /// SendMessage failed
    #[error("unable to send message: {0}")]
    Send(String),

    /// The call did not finish within the upstream timeout
    #[error("queue call timed out after {0:?}")]
    Timeout(Duration),
}

/// Failure of a single ingestion request, tagged by the stage that failed.
///
/// Stages that completed before the failure are not undone.
#[derive(Debug, Clone, Error)]
pub enum IngestError {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The `image` field is not valid standard base64.
    ///
    /// Reported as a client error (400) before anything is written, rather
    /// than as a failed upload.
    #[error("image field must be valid base64: {0}")]
    InvalidImage(String),

    #[error(transparent)]
    Upload(#[from] BlobError),

    #[error(transparent)]
    Persist(#[from] MetadataError),

    #[error(transparent)]
    Enqueue(#[from] QueueError),
}

fn human_size(bytes: &usize) -> String {
    let bytes = *bytes;
    const MIB: usize = 1024 * 1024;
    const KIB: usize = 1024;
    if bytes >= MIB && bytes % MIB == 0 {
        format!("{}MB", bytes / MIB)
    } else if bytes >= KIB && bytes % KIB == 0 {
        format!("{}KB", bytes / KIB)
    } else {
        format!("{} bytes", bytes)
    }
}
