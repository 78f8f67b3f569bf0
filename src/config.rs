//! Configuration management for the webcam API.
//!
//! All settings come from command-line arguments with environment variable
//! fallbacks (prefix `WEBCAM_`). The parsed [`ServeConfig`] is built once at
//! startup and handed by reference to the token service and store adapters.
//!
//! # Environment Variables
//!
//! - `WEBCAM_HOST` / `WEBCAM_PORT` - Bind address (default: 0.0.0.0:8080)
//! - `WEBCAM_SECRET_KEY` - Token signing secret (required)
//! - `WEBCAM_DB_HOST`, `WEBCAM_DB_PORT`, `WEBCAM_DB_USER`, `WEBCAM_DB_PASSWORD`,
//!   `WEBCAM_DB_NAME` - PostgreSQL connection
//! - `WEBCAM_S3_BUCKET` - Image bucket (default: bucket-picture)
//! - `WEBCAM_S3_REGION` / `WEBCAM_S3_ENDPOINT` - S3 region and custom endpoint
//! - `WEBCAM_QUEUE_NAME` - SQS queue name (default: serverless-sqs)
//! - `WEBCAM_QUEUE_DELAY_SECS` - Delivery delay (default: 10)
//! - `WEBCAM_SQS_ENDPOINT` - Custom SQS endpoint
//! - `WEBCAM_ENQUEUE_POLICY` - `log` or `fail` (default: log)
//! - `WEBCAM_MAX_BODY_BYTES` - Request body limit (default: 1MB)
//! - `WEBCAM_UPSTREAM_TIMEOUT_SECS` - Per-call timeout for S3/DB/SQS (default: 10)

use std::time::Duration;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::ingest::EnqueuePolicy;
use crate::store::MAX_DELAY_SECS;

// =============================================================================
// Default Values
// =============================================================================

pub const DEFAULT_HOST: &str = "0.0.0.0";

pub const DEFAULT_PORT: u16 = 8080;

pub const DEFAULT_REGION: &str = "us-east-1";

pub const DEFAULT_BUCKET: &str = "bucket-picture";

pub const DEFAULT_QUEUE_NAME: &str = "serverless-sqs";

pub const DEFAULT_QUEUE_DELAY_SECS: u64 = 10;

pub const DEFAULT_DB_PORT: u16 = 5432;

pub const DEFAULT_DB_USER: &str = "postgres";

pub const DEFAULT_DB_NAME: &str = "postgres";

pub const DEFAULT_DB_MAX_CONNECTIONS: u32 = 5;

/// Default request body limit (1 MiB).
pub const DEFAULT_MAX_BODY_BYTES: usize = 1024 * 1024;

pub const DEFAULT_UPSTREAM_TIMEOUT_SECS: u64 = 10;

// =============================================================================
// CLI Arguments
// =============================================================================

/// Webcam API - token-authenticated image ingestion.
#[derive(Parser, Debug, Clone)]
#[command(name = "webcam-api")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    pub fn into_command(self) -> Command {
        self.command
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Run the HTTP server.
    Serve(ServeConfig),

    /// Issue a token offline.
    Token(TokenConfig),

    /// Check connectivity to S3, SQS and PostgreSQL.
    Check(CheckConfig),
}

/// Settings for the `serve` command.
#[derive(Args, Debug, Clone)]
pub struct ServeConfig {
    // =========================================================================
    // Server
    // =========================================================================
    /// Host address to bind the server to.
    #[arg(long, default_value = DEFAULT_HOST, env = "WEBCAM_HOST")]
    pub host: String,

    /// Port to listen on.
    #[arg(short, long, default_value_t = DEFAULT_PORT, env = "WEBCAM_PORT")]
    pub port: u16,

    /// Secret key used to sign and verify bearer tokens.
    #[arg(long, env = "WEBCAM_SECRET_KEY", hide_env_values = true)]
    pub secret_key: String,

    /// Maximum accepted request body size in bytes.
    #[arg(long, default_value_t = DEFAULT_MAX_BODY_BYTES, env = "WEBCAM_MAX_BODY_BYTES")]
    pub max_body_bytes: usize,

    /// Allowed CORS origins (comma-separated). Any origin if not specified.
    #[arg(long, env = "WEBCAM_CORS_ORIGINS", value_delimiter = ',')]
    pub cors_origins: Option<Vec<String>>,

    #[command(flatten)]
    pub upstream: UpstreamConfig,

    // =========================================================================
    // Database
    // =========================================================================
    /// PostgreSQL host.
    #[arg(long, env = "WEBCAM_DB_HOST")]
    pub db_host: String,

    /// PostgreSQL port.
    #[arg(long, default_value_t = DEFAULT_DB_PORT, env = "WEBCAM_DB_PORT")]
    pub db_port: u16,

    /// PostgreSQL user.
    #[arg(long, default_value = DEFAULT_DB_USER, env = "WEBCAM_DB_USER")]
    pub db_user: String,

    /// PostgreSQL password.
    #[arg(long, default_value = "", env = "WEBCAM_DB_PASSWORD", hide_env_values = true)]
    pub db_password: String,

    /// PostgreSQL database name.
    #[arg(long, default_value = DEFAULT_DB_NAME, env = "WEBCAM_DB_NAME")]
    pub db_name: String,

    /// Maximum pooled database connections.
    #[arg(long, default_value_t = DEFAULT_DB_MAX_CONNECTIONS, env = "WEBCAM_DB_MAX_CONNECTIONS")]
    pub db_max_connections: u32,

    /// Apply the bundled migrations before serving.
    #[arg(long, default_value_t = false, env = "WEBCAM_RUN_MIGRATIONS")]
    pub run_migrations: bool,

    // =========================================================================
    // Ingestion
    // =========================================================================
    /// Seconds a queued message stays invisible (0-900).
    #[arg(long, default_value_t = DEFAULT_QUEUE_DELAY_SECS, env = "WEBCAM_QUEUE_DELAY_SECS")]
    pub queue_delay_secs: u64,

    /// What to answer when the queue message cannot be sent.
    #[arg(long, value_enum, default_value_t = PolicyArg::Log, env = "WEBCAM_ENQUEUE_POLICY")]
    pub enqueue_policy: PolicyArg,

    // =========================================================================
    // Logging
    // =========================================================================
    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,

    /// Disable request tracing.
    #[arg(long, default_value_t = false)]
    pub no_tracing: bool,
}

/// S3 and SQS connection settings shared by `serve` and `check`.
#[derive(Args, Debug, Clone)]
pub struct UpstreamConfig {
    /// S3 bucket that receives the images.
    #[arg(long, default_value = DEFAULT_BUCKET, env = "WEBCAM_S3_BUCKET")]
    pub s3_bucket: String,

    /// AWS region for S3 and SQS.
    #[arg(long, default_value = DEFAULT_REGION, env = "WEBCAM_S3_REGION")]
    pub s3_region: String,

    /// Custom S3 endpoint URL for S3-compatible services (MinIO, etc.).
    #[arg(long, env = "WEBCAM_S3_ENDPOINT")]
    pub s3_endpoint: Option<String>,

    /// SQS queue that receives ingestion events.
    #[arg(long, default_value = DEFAULT_QUEUE_NAME, env = "WEBCAM_QUEUE_NAME")]
    pub queue_name: String,

    /// Custom SQS endpoint URL (LocalStack, etc.).
    #[arg(long, env = "WEBCAM_SQS_ENDPOINT")]
    pub sqs_endpoint: Option<String>,

    /// Timeout applied to every S3, SQS and database call. No call is retried.
    #[arg(long, default_value_t = DEFAULT_UPSTREAM_TIMEOUT_SECS, env = "WEBCAM_UPSTREAM_TIMEOUT_SECS")]
    pub upstream_timeout_secs: u64,
}

/// Command-line spelling of [`EnqueuePolicy`].
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyArg {
    /// Log the failure and still answer 201
    Log,
    /// Answer 500
    Fail,
}

impl From<PolicyArg> for EnqueuePolicy {
    fn from(arg: PolicyArg) -> Self {
        match arg {
            PolicyArg::Log => EnqueuePolicy::LogAndAccept,
            PolicyArg::Fail => EnqueuePolicy::FailRequest,
        }
    }
}

impl UpstreamConfig {
    fn validate(&self) -> Result<(), String> {
        if self.s3_bucket.is_empty() {
            return Err(
                "S3 bucket name is required. Set --s3-bucket or WEBCAM_S3_BUCKET".to_string(),
            );
        }
        if self.queue_name.is_empty() {
            return Err(
                "Queue name is required. Set --queue-name or WEBCAM_QUEUE_NAME".to_string(),
            );
        }
        if self.upstream_timeout_secs == 0 {
            return Err("upstream_timeout_secs must be greater than 0".to_string());
        }
        Ok(())
    }

    pub fn upstream_timeout(&self) -> Duration {
        Duration::from_secs(self.upstream_timeout_secs)
    }
}

impl ServeConfig {
    /// Validate the configuration and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        if self.secret_key.is_empty() {
            return Err(
                "A token signing secret is required. Set --secret-key or WEBCAM_SECRET_KEY"
                    .to_string(),
            );
        }

        if self.db_host.is_empty() {
            return Err("Database host is required. Set --db-host or WEBCAM_DB_HOST".to_string());
        }

        if self.db_max_connections == 0 {
            return Err("db_max_connections must be greater than 0".to_string());
        }

        self.upstream.validate()?;

        if self.max_body_bytes == 0 {
            return Err("max_body_bytes must be greater than 0".to_string());
        }

        if self.queue_delay_secs > MAX_DELAY_SECS {
            return Err(format!(
                "queue_delay_secs must be between 0 and {}",
                MAX_DELAY_SECS
            ));
        }

        Ok(())
    }

    /// Get the server bind address as "host:port".
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn upstream_timeout(&self) -> Duration {
        self.upstream.upstream_timeout()
    }

    pub fn queue_delay(&self) -> Duration {
        Duration::from_secs(self.queue_delay_secs)
    }
}

/// Settings for the `token` command.
#[derive(Args, Debug, Clone)]
pub struct TokenConfig {
    /// Client name to embed in the token.
    #[arg(long)]
    pub name: String,

    /// Secret key used to sign the token.
    #[arg(long, env = "WEBCAM_SECRET_KEY", hide_env_values = true)]
    pub secret_key: String,

    /// Output format.
    #[arg(long, value_enum, default_value_t = TokenOutputFormat::Token)]
    pub format: TokenOutputFormat,
}

impl TokenConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.name.is_empty() {
            return Err("--name must not be empty".to_string());
        }
        if self.secret_key.is_empty() {
            return Err("--secret-key must not be empty".to_string());
        }
        Ok(())
    }
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenOutputFormat {
    /// The bare token
    Token,
    /// `{"api_key": ..., "expires_at": ...}`
    Json,
}

/// Settings for the `check` command.
#[derive(Args, Debug, Clone)]
pub struct CheckConfig {
    #[command(flatten)]
    pub upstream: UpstreamConfig,

    /// PostgreSQL host. The database check is skipped when unset.
    #[arg(long, env = "WEBCAM_DB_HOST")]
    pub db_host: Option<String>,

    #[arg(long, default_value_t = DEFAULT_DB_PORT, env = "WEBCAM_DB_PORT")]
    pub db_port: u16,

    #[arg(long, default_value = DEFAULT_DB_USER, env = "WEBCAM_DB_USER")]
    pub db_user: String,

    #[arg(long, default_value = "", env = "WEBCAM_DB_PASSWORD", hide_env_values = true)]
    pub db_password: String,

    #[arg(long, default_value = DEFAULT_DB_NAME, env = "WEBCAM_DB_NAME")]
    pub db_name: String,

    /// Enable verbose logging.
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

impl CheckConfig {
    pub fn validate(&self) -> Result<(), String> {
        self.upstream.validate()
    }
}

// =============================================================================
// Tests
// =============================================================================
