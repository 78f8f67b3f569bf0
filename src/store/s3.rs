use std::time::Duration;

use async_trait::async_trait;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use bytes::Bytes;
use tracing::debug;

use super::BlobStore;
use crate::error::BlobError;

/// S3-backed implementation of `BlobStore`.
///
/// Works against AWS S3 or any S3-compatible service (MinIO, LocalStack) when
/// the client is built with a custom endpoint.
#[derive(Clone)]
pub struct S3BlobStore {
    client: Client,
}

impl S3BlobStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Check that `bucket` exists and is reachable with the current credentials.
    pub async fn check_bucket(&self, bucket: &str) -> Result<(), BlobError> {
        self.client
            .head_bucket()
            .bucket(bucket)
            .send()
            .await
            .map(|_| ())
            .map_err(|e| BlobError::Upload {
                bucket: bucket.to_string(),
                key: String::new(),
                message: e.to_string(),
            })
    }
}

#[async_trait]
impl BlobStore for S3BlobStore {
    async fn put(
        &self,
        bucket: &str,
        key: &str,
        body: Bytes,
        content_type: &str,
    ) -> Result<(), BlobError> {
        debug!(bucket, key, size_bytes = body.len(), "Uploading object");

        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(ByteStream::from(body))
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| BlobError::Upload {
                bucket: bucket.to_string(),
                key: key.to_string(),
                message: aws_sdk_s3::error::DisplayErrorContext(&e).to_string(),
            })?;

        Ok(())
    }
}

/// Create an S3 client with optional custom endpoint.
///
/// SDK retries are disabled and the per-operation timeout is set explicitly,
/// so a failed upload surfaces after at most `timeout`.
///
/// ```ignore
/// let client = create_s3_client(Some("http://localhost:9000"), "us-east-1", timeout).await;
/// ```
pub async fn create_s3_client(
    endpoint_url: Option<&str>,
    region: &str,
    timeout: Duration,
) -> Client {
    let sdk_config = super::load_sdk_config(endpoint_url, region, timeout).await;

    // S3-compatible services generally need path-style addressing
    let s3_config = if endpoint_url.is_some() {
        aws_sdk_s3::config::Builder::from(&sdk_config)
            .force_path_style(true)
            .build()
    } else {
        aws_sdk_s3::config::Builder::from(&sdk_config).build()
    };

    Client::from_conf(s3_config)
}
