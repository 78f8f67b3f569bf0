use std::time::Duration;

use async_trait::async_trait;
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions};
use sqlx::types::Json;
use tracing::{debug, info};

use super::{MetadataStore, WebcamRecord};
use crate::config::ServeConfig;
use crate::error::MetadataError;

/// PostgreSQL-backed implementation of `MetadataStore`.
///
/// The pool connects lazily, so the server starts even when the database is
/// briefly unavailable; each insert then reports its own connection error.
#[derive(Clone)]
pub struct PgMetadataStore {
    pool: PgPool,
}

impl PgMetadataStore {
    /// Build a store from the database settings in `config`.
    pub fn connect_lazy(config: &ServeConfig) -> Self {
        let options = pg_connect_options(
            &config.db_host,
            config.db_port,
            &config.db_user,
            &config.db_password,
            &config.db_name,
        );

        info!(
            host = %config.db_host,
            port = config.db_port,
            database = %config.db_name,
            "PostgreSQL metadata store configured"
        );

        Self::connect_lazy_with(options, config.db_max_connections, config.upstream_timeout())
    }

    /// Build a store from explicit connection options.
    pub fn connect_lazy_with(
        options: PgConnectOptions,
        max_connections: u32,
        acquire_timeout: Duration,
    ) -> Self {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(acquire_timeout)
            .connect_lazy_with(options);

        Self { pool }
    }

    /// Apply the bundled schema migrations.
    pub async fn run_migrations(&self) -> Result<(), MetadataError> {
        info!("Running database migrations");

        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| MetadataError::Connection(e.to_string()))?;

        info!("Database migrations completed");
        Ok(())
    }

    /// Round-trip a trivial query to verify connectivity.
    pub async fn ping(&self, timeout: Duration) -> Result<(), MetadataError> {
        let query = sqlx::query("SELECT 1").execute(&self.pool);
        match tokio::time::timeout(timeout, query).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => Err(MetadataError::Connection(e.to_string())),
            Err(_) => Err(MetadataError::Timeout(timeout)),
        }
    }
}

/// Connection options for a PostgreSQL server.
pub fn pg_connect_options(
    host: &str,
    port: u16,
    user: &str,
    password: &str,
    database: &str,
) -> PgConnectOptions {
    PgConnectOptions::new()
        .host(host)
        .port(port)
        .username(user)
        .password(password)
        .database(database)
}

#[async_trait]
impl MetadataStore for PgMetadataStore {
    async fn insert(&self, record: &WebcamRecord) -> Result<(), MetadataError> {
        let metadata = Json(&record.metadata);

        // Omitting created_at lets the column default apply
        let result = match record.created_at {
            Some(created_at) => {
                sqlx::query(
                    "INSERT INTO webcam_data (image_object_key, topic, metadata, created_at) \
                     VALUES ($1, $2, $3, $4)",
                )
                .bind(&record.object_key)
                .bind(&record.topic)
                .bind(metadata)
                .bind(created_at)
                .execute(&self.pool)
                .await
            }
            None => {
                sqlx::query(
                    "INSERT INTO webcam_data (image_object_key, topic, metadata) \
                     VALUES ($1, $2, $3)",
                )
                .bind(&record.object_key)
                .bind(&record.topic)
                .bind(metadata)
                .execute(&self.pool)
                .await
            }
        };

        match result {
            Ok(done) => {
                debug!(
                    object_key = %record.object_key,
                    rows = done.rows_affected(),
                    "Inserted webcam record"
                );
                Ok(())
            }
            Err(e @ (sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) | sqlx::Error::Tls(_))) => {
                Err(MetadataError::Connection(e.to_string()))
            }
            Err(e) => Err(MetadataError::Insert(e.to_string())),
        }
    }
}
