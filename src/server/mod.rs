//! HTTP server layer for the webcam API.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         HTTP Layer                              │
//! │              POST /login        POST /        GET /health       │
//! │                                                                 │
//! │  ┌─────────────┐  ┌──────────────┐  ┌─────────────────────────┐ │
//! │  │  handlers   │  │    auth      │  │        routes           │ │
//! │  │ (requests)  │  │ (bearer JWT) │  │  (router config)        │ │
//! │  └─────────────┘  └──────────────┘  └─────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

pub mod auth;
pub mod handlers;
pub mod routes;

pub use auth::{auth_middleware, bearer_token, AuthError};
pub use handlers::{
    health_handler, login_handler, not_found_handler, submit_handler, ApiResponse, AppState,
    HealthResponse, LoginError, LoginResponse,
};
pub use routes::{create_router, RouterConfig};
