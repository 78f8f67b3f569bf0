//! Webcam API - token-authenticated image ingestion.
//!
//! This binary starts the HTTP server and configures all components.

use clap::Parser;
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use webcam_api::{
    config::{CheckConfig, Cli, Command, ServeConfig, TokenConfig, TokenOutputFormat},
    ingest::{IngestSettings, IngestionPipeline},
    server::{create_router, RouterConfig},
    store::{
        create_s3_client, create_sqs_client, pg_connect_options, EventQueue, PgMetadataStore,
        S3BlobStore, SqsEventQueue,
    },
    token::{TokenService, TOKEN_TTL_HOURS},
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match cli.into_command() {
        Command::Serve(config) => run_serve(config).await,
        Command::Token(config) => run_token(config),
        Command::Check(config) => run_check(config).await,
    }
}

// =============================================================================
// Serve Command
// =============================================================================

async fn run_serve(config: ServeConfig) -> ExitCode {
    init_logging(config.verbose);

    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }

    let upstream = &config.upstream;
    let timeout = config.upstream_timeout();

    info!("Configuration:");
    info!("  S3 bucket: {}", upstream.s3_bucket);
    if let Some(ref endpoint) = upstream.s3_endpoint {
        info!("  S3 endpoint: {}", endpoint);
    }
    info!("  Region: {}", upstream.s3_region);
    info!(
        "  Queue: {} (delay {}s)",
        upstream.queue_name, config.queue_delay_secs
    );
    if let Some(ref endpoint) = upstream.sqs_endpoint {
        info!("  SQS endpoint: {}", endpoint);
    }
    info!("  Enqueue failure policy: {:?}", config.enqueue_policy);
    info!("  Upstream timeout: {}s", upstream.upstream_timeout_secs);

    let s3_client =
        create_s3_client(upstream.s3_endpoint.as_deref(), &upstream.s3_region, timeout).await;
    let sqs_client =
        create_sqs_client(upstream.sqs_endpoint.as_deref(), &upstream.s3_region, timeout).await;
    let records = PgMetadataStore::connect_lazy(&config);

    if config.run_migrations {
        if let Err(e) = records.run_migrations().await {
            error!("Failed to run migrations: {}", e);
            return ExitCode::FAILURE;
        }
    }

    let pipeline = IngestionPipeline::new(
        S3BlobStore::new(s3_client),
        records,
        SqsEventQueue::new(sqs_client),
        IngestSettings::from(&config),
    );

    let router = create_router(pipeline, build_router_config(&config));

    let addr = config.bind_address();
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind to {}: {}", addr, e);
            return ExitCode::FAILURE;
        }
    };

    info!("Server listening on: http://{}", addr);

    if let Err(e) = axum::serve(listener, router).await {
        error!("Server error: {}", e);
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

/// Initialize the tracing/logging subsystem.
fn init_logging(verbose: bool) {
    let env_filter = if verbose {
        "webcam_api=debug,tower_http=debug"
    } else {
        "webcam_api=info,tower_http=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Build RouterConfig from the application ServeConfig.
fn build_router_config(config: &ServeConfig) -> RouterConfig {
    let mut router_config = RouterConfig::new(&config.secret_key)
        .with_max_body_bytes(config.max_body_bytes)
        .with_tracing(!config.no_tracing);

    if let Some(ref origins) = config.cors_origins {
        router_config = router_config.with_cors_origins(origins.clone());
    }

    router_config
}

// =============================================================================
// Token Command
// =============================================================================

fn run_token(config: TokenConfig) -> ExitCode {
    if let Err(e) = config.validate() {
        eprintln!("Error: {}", e);
        return ExitCode::FAILURE;
    }

    let tokens = TokenService::new(&config.secret_key);
    let now = chrono::Utc::now();
    let token = tokens.issue_at(&config.name, now);

    match config.format {
        TokenOutputFormat::Token => {
            println!("{}", token);
        }
        TokenOutputFormat::Json => {
            let expires_at = now + chrono::Duration::hours(TOKEN_TTL_HOURS);
            let json = serde_json::json!({
                "api_key": token,
                "name": config.name,
                "expires_at": expires_at.to_rfc3339(),
            });
            match serde_json::to_string_pretty(&json) {
                Ok(text) => println!("{}", text),
                Err(e) => {
                    eprintln!("Error: {}", e);
                    return ExitCode::FAILURE;
                }
            }
        }
    }

    ExitCode::SUCCESS
}

// =============================================================================
// Check Command
// =============================================================================

async fn run_check(config: CheckConfig) -> ExitCode {
    if config.verbose {
        init_logging(true);
    }

    println!("Webcam API Configuration Check");
    println!("══════════════════════════════");
    println!();

    if let Err(e) = config.validate() {
        println!("✗ Configuration: {}", e);
        return ExitCode::FAILURE;
    }

    let upstream = &config.upstream;
    let timeout = upstream.upstream_timeout();

    println!("✓ Bucket: {}", upstream.s3_bucket);
    println!("✓ Queue: {}", upstream.queue_name);
    println!("✓ Region: {}", upstream.s3_region);
    println!();

    let mut failed = false;

    print!("Testing S3 bucket... ");
    let s3 = S3BlobStore::new(
        create_s3_client(upstream.s3_endpoint.as_deref(), &upstream.s3_region, timeout).await,
    );
    match s3.check_bucket(&upstream.s3_bucket).await {
        Ok(()) => println!("✓ success"),
        Err(e) => {
            println!("✗ failed");
            println!("  Error: {}", e);
            failed = true;
        }
    }

    print!("Testing SQS queue... ");
    let sqs = SqsEventQueue::new(
        create_sqs_client(upstream.sqs_endpoint.as_deref(), &upstream.s3_region, timeout).await,
    );
    match sqs.resolve_queue(&upstream.queue_name).await {
        Ok(handle) => println!("✓ {}", handle.url),
        Err(e) => {
            println!("✗ failed");
            println!("  Error: {}", e);
            failed = true;
        }
    }

    match config.db_host {
        Some(ref host) => {
            print!("Testing PostgreSQL... ");
            let options = pg_connect_options(
                host,
                config.db_port,
                &config.db_user,
                &config.db_password,
                &config.db_name,
            );
            let records = PgMetadataStore::connect_lazy_with(options, 1, timeout);
            match records.ping(timeout).await {
                Ok(()) => println!("✓ success"),
                Err(e) => {
                    println!("✗ failed");
                    println!("  Error: {}", e);
                    failed = true;
                }
            }
        }
        None => println!("- PostgreSQL: skipped (no --db-host)"),
    }

    println!();
    println!("══════════════════════════════");
    if failed {
        println!("✗ Some checks failed");
        println!();
        println!("Please check:");
        println!("  - Your AWS credentials are configured correctly");
        println!(
            "  - The bucket '{}' and queue '{}' exist",
            upstream.s3_bucket, upstream.queue_name
        );
        println!("  - Custom endpoints are correct and reachable");
        return ExitCode::FAILURE;
    }

    println!("✓ All checks passed!");
    ExitCode::SUCCESS
}
