//! Router configuration for the webcam API.
//!
//! This module defines the HTTP routes and applies middleware for
//! authentication, body limits and CORS.
//!
//! # Route Structure
//!
//! ```text
//! POST /login    - Issue a bearer token (public)
//! POST /         - Submit an image (protected)
//! GET  /health   - Health check (public)
//! *              - 404 envelope
//! ```
//!
//! # Example
//!
//! ```ignore
//! use webcam_api::server::routes::{create_router, RouterConfig};
//!
//! let config = RouterConfig::new("my-secret-key")
//!     .with_cors_origins(vec!["https://example.com".to_string()]);
//!
//! let router = create_router(pipeline, config);
//!
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:8080").await?;
//! axum::serve(listener, router).await?;
//! ```

use std::time::Duration;

use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, post},
    Router,
};
use http::header::{AUTHORIZATION, CONTENT_TYPE};
use http::Method;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::auth::auth_middleware;
use super::handlers::{
    health_handler, login_handler, not_found_handler, submit_handler, AppState,
};
use crate::config::DEFAULT_MAX_BODY_BYTES;
use crate::ingest::IngestionPipeline;
use crate::store::{BlobStore, EventQueue, MetadataStore};
use crate::token::TokenService;

// =============================================================================
// Router Configuration
// =============================================================================

/// Configuration for the HTTP router.
#[derive(Clone)]
pub struct RouterConfig {
    /// Secret used to sign and verify bearer tokens
    pub secret_key: String,

    /// Allowed CORS origins (None = allow any)
    pub cors_origins: Option<Vec<String>>,

    /// Request body limit in bytes
    pub max_body_bytes: usize,

    /// Whether to enable request tracing
    pub enable_tracing: bool,
}

impl RouterConfig {
    pub fn new(secret_key: impl Into<String>) -> Self {
        Self {
            secret_key: secret_key.into(),
            cors_origins: None,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            enable_tracing: true,
        }
    }

    pub fn with_cors_origins(mut self, origins: Vec<String>) -> Self {
        self.cors_origins = Some(origins);
        self
    }

    pub fn with_cors_any_origin(mut self) -> Self {
        self.cors_origins = None;
        self
    }

    pub fn with_max_body_bytes(mut self, limit: usize) -> Self {
        self.max_body_bytes = limit;
        self
    }

    pub fn with_tracing(mut self, enabled: bool) -> Self {
        self.enable_tracing = enabled;
        self
    }
}

// =============================================================================
// Router Builder
// =============================================================================

/// Create the application router around `pipeline`.
pub fn create_router<B, M, Q>(pipeline: IngestionPipeline<B, M, Q>, config: RouterConfig) -> Router
where
    B: BlobStore + 'static,
    M: MetadataStore + 'static,
    Q: EventQueue + 'static,
{
    let tokens = TokenService::new(&config.secret_key);
    let state = AppState::new(pipeline, tokens.clone()).with_max_body_bytes(config.max_body_bytes);

    // route_layer keeps unmatched paths out of the auth check so they 404
    let protected_routes = Router::new()
        .route("/", post(submit_handler::<B, M, Q>))
        .route_layer(middleware::from_fn_with_state(tokens, auth_middleware));

    let public_routes = Router::new()
        .route("/login", post(login_handler::<B, M, Q>))
        .route("/health", get(health_handler));

    let router = Router::new()
        .merge(protected_routes)
        .merge(public_routes)
        .fallback(not_found_handler)
        .with_state(state)
        .layer(DefaultBodyLimit::max(config.max_body_bytes))
        .layer(build_cors_layer(&config));

    if config.enable_tracing {
        router.layer(TraceLayer::new_for_http())
    } else {
        router
    }
}

fn build_cors_layer(config: &RouterConfig) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE])
        .max_age(Duration::from_secs(86400));

    match &config.cors_origins {
        None => cors.allow_origin(Any),
        Some(origins) if origins.is_empty() => cors,
        Some(origins) => {
            let parsed_origins: Vec<_> = origins.iter().filter_map(|o| o.parse().ok()).collect();
            cors.allow_origin(parsed_origins)
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
