//! HTTP request handlers for the webcam API.
//!
//! # Endpoints
//!
//! - `POST /login` - Issue a bearer token for a client name
//! - `POST /` - Submit an image with its metadata (authenticated)
//! - `GET /health` - Health check endpoint
//!
//! Errors share one envelope:
//!
//! ```json
//! {"result": "", "error": "topic field is required"}
//! ```

use std::sync::Arc;

use axum::{
    extract::{rejection::BytesRejection, State},
    http::{StatusCode, Uri},
    response::{IntoResponse, Response},
    Extension, Json,
};
use bytes::Bytes;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::config::DEFAULT_MAX_BODY_BYTES;
use crate::error::{DecodeError, IngestError, ValidationError};
use crate::ingest::{decode_json, IngestionPipeline, LoginRequest, Stage};
use crate::store::{BlobStore, EventQueue, MetadataStore};
use crate::token::{Principal, TokenService};

// =============================================================================
// Application State
// =============================================================================

/// Shared state for all handlers.
pub struct AppState<B, M, Q> {
    pub pipeline: Arc<IngestionPipeline<B, M, Q>>,

    pub tokens: TokenService,

    /// Body limit, echoed in 413 messages
    pub max_body_bytes: usize,
}

impl<B, M, Q> AppState<B, M, Q> {
    pub fn new(pipeline: IngestionPipeline<B, M, Q>, tokens: TokenService) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
            tokens,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }

    pub fn with_max_body_bytes(mut self, limit: usize) -> Self {
        self.max_body_bytes = limit;
        self
    }
}

impl<B, M, Q> Clone for AppState<B, M, Q> {
    fn clone(&self) -> Self {
        Self {
            pipeline: Arc::clone(&self.pipeline),
            tokens: self.tokens.clone(),
            max_body_bytes: self.max_body_bytes,
        }
    }
}

// =============================================================================
// Response Types
// =============================================================================

/// Result envelope used by submissions and all error responses.
#[derive(Debug, Serialize)]
pub struct ApiResponse {
    pub result: String,

    pub error: String,
}

impl ApiResponse {
    pub fn created() -> Self {
        Self {
            result: "CREATED".to_string(),
            error: String::new(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            result: String::new(),
            error: message.into(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub api_key: String,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,

    pub version: String,
}

// =============================================================================
// Error Mapping
// =============================================================================

const INTERNAL_SERVER_ERROR: &str = "Internal Server Error";

fn decode_status(err: &DecodeError) -> (StatusCode, &'static str, String) {
    match err {
        DecodeError::TooLarge { .. } => (
            StatusCode::PAYLOAD_TOO_LARGE,
            "body_too_large",
            err.to_string(),
        ),
        DecodeError::UnknownField(_) => (StatusCode::BAD_REQUEST, "unknown_field", err.to_string()),
        DecodeError::Other(_) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "body_unreadable",
            INTERNAL_SERVER_ERROR.to_string(),
        ),
        _ => (StatusCode::BAD_REQUEST, "invalid_json", err.to_string()),
    }
}

fn error_response(
    status: StatusCode,
    error_type: &str,
    stage: Option<Stage>,
    message: String,
    detail: &dyn std::fmt::Display,
) -> Response {
    let stage = stage.map(|s| s.as_str());

    // Log errors based on severity
    if status.is_server_error() {
        error!(
            error_type = error_type,
            status = status.as_u16(),
            stage = stage,
            "Server error: {}",
            detail
        );
    } else {
        warn!(
            error_type = error_type,
            status = status.as_u16(),
            stage = stage,
            "Client error: {}",
            detail
        );
    }

    (status, Json(ApiResponse::error(message))).into_response()
}

impl IntoResponse for IngestError {
    fn into_response(self) -> Response {
        let (status, error_type, message) = match &self {
            IngestError::Decode(err) => decode_status(err),

            IngestError::Validation(err) => {
                (StatusCode::BAD_REQUEST, "validation_error", err.to_string())
            }

            IngestError::InvalidImage(_) => {
                (StatusCode::BAD_REQUEST, "invalid_image", self.to_string())
            }

            // Storage details stay in the logs
            IngestError::Upload(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "upload_error",
                "Failed to upload image".to_string(),
            ),

            IngestError::Persist(err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "database_error",
                err.to_string(),
            ),

            IngestError::Enqueue(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "queue_error",
                INTERNAL_SERVER_ERROR.to_string(),
            ),
        };

        error_response(status, error_type, Some(self.stage()), message, &self)
    }
}

/// Failure of `POST /login`.
#[derive(Debug)]
pub enum LoginError {
    Decode(DecodeError),
    Validation(ValidationError),
}

impl From<DecodeError> for LoginError {
    fn from(err: DecodeError) -> Self {
        LoginError::Decode(err)
    }
}

impl From<ValidationError> for LoginError {
    fn from(err: ValidationError) -> Self {
        LoginError::Validation(err)
    }
}

impl IntoResponse for LoginError {
    fn into_response(self) -> Response {
        match self {
            LoginError::Decode(err) => {
                let (status, error_type, message) = decode_status(&err);
                error_response(status, error_type, None, message, &err)
            }
            LoginError::Validation(err) => error_response(
                StatusCode::BAD_REQUEST,
                "validation_error",
                None,
                err.to_string(),
                &err,
            ),
        }
    }
}

/// Turn the raw body extraction result into bytes or a decode error.
fn read_body(body: Result<Bytes, BytesRejection>, limit: usize) -> Result<Bytes, DecodeError> {
    body.map_err(|rejection| {
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            DecodeError::TooLarge { limit }
        } else {
            DecodeError::Other(rejection.body_text())
        }
    })
}

// =============================================================================
// Handlers
// =============================================================================

/// Handle `POST /login`.
///
/// Issues a token for the given client name. Any non-empty name is accepted.
pub async fn login_handler<B, M, Q>(
    State(state): State<AppState<B, M, Q>>,
    body: Result<Bytes, BytesRejection>,
) -> Result<Json<LoginResponse>, LoginError> {
    let body = read_body(body, state.max_body_bytes)?;
    let request: LoginRequest = decode_json(&body)?;
    request.validate()?;

    let api_key = state.tokens.issue(&request.name);
    info!(client = %request.name, "Issued token");

    Ok(Json(LoginResponse { api_key }))
}

/// Handle `POST /`.
///
/// Runs the submission through the ingestion pipeline on behalf of the
/// authenticated client and answers 201 once it has been stored.
pub async fn submit_handler<B, M, Q>(
    State(state): State<AppState<B, M, Q>>,
    Extension(principal): Extension<Principal>,
    body: Result<Bytes, BytesRejection>,
) -> Result<(StatusCode, Json<ApiResponse>), IngestError>
where
    B: BlobStore,
    M: MetadataStore,
    Q: EventQueue,
{
    let body = read_body(body, state.max_body_bytes)?;
    let receipt = state.pipeline.ingest(&principal, &body).await?;

    debug!(
        object_key = %receipt.object_key,
        message_id = receipt.message_id.as_deref().unwrap_or(""),
        "Submission created"
    );

    Ok((StatusCode::CREATED, Json(ApiResponse::created())))
}

/// Handle `GET /health`.
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Fallback for unknown routes.
pub async fn not_found_handler(uri: Uri) -> (StatusCode, Json<ApiResponse>) {
    debug!(uri = %uri, "Route not found");
    (
        StatusCode::NOT_FOUND,
        Json(ApiResponse::error(format!("Not found: {}", uri))),
    )
}

// =============================================================================
// Tests
// =============================================================================
