use anyhow::{anyhow, Result};
use async_trait::async_trait;
use aws_credential_types::Credentials;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use aws_types::region::Region as AwsRegion;
use std::path::Path;
use tracing::{debug, info};

use crate::config::Config;
use crate::retry::{is_transient, RetryPolicy};
use crate::storage::key::ContentHeaders;

/// Seam to the object store. Uploads are the only operation the pipeline
/// needs; existence is answered by the record store, not by listing.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn upload(&self, local_path: &Path, key: &str, headers: &ContentHeaders) -> Result<()>;
}

#[derive(Debug, Clone)]
pub struct S3Store {
    client: Client,
    bucket: String,
    retry: RetryPolicy,
}

impl S3Store {
    pub fn new(config: &Config) -> Result<Self> {
        if config.s3_bucket.is_empty() {
            return Err(anyhow!("bucket name is required"));
        }
        if config.aws_access_key_id.is_empty() {
            return Err(anyhow!("access key ID is required"));
        }
        if config.aws_secret_access_key.is_empty() {
            return Err(anyhow!("secret access key is required"));
        }

        let credentials = Credentials::new(
            &config.aws_access_key_id,
            &config.aws_secret_access_key,
            None,
            None,
            "docvault",
        );

        let region = if config.s3_region.is_empty() {
            "us-east-1".to_string()
        } else {
            config.s3_region.clone()
        };

        let mut builder = aws_sdk_s3::config::Builder::new()
            .region(AwsRegion::new(region))
            .credentials_provider(credentials)
            .behavior_version_latest();

        // S3-compatible endpoints (MinIO and the like) for local setups.
        if let Some(endpoint_url) = &config.s3_endpoint_url {
            builder = builder.endpoint_url(endpoint_url);
            info!("using custom S3 endpoint: {}", endpoint_url);
        }

        Ok(Self {
            client: Client::from_conf(builder.build()),
            bucket: config.s3_bucket.clone(),
            retry: RetryPolicy::default(),
        })
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    async fn upload(&self, local_path: &Path, key: &str, headers: &ContentHeaders) -> Result<()> {
        self.retry
            .run("s3 upload", is_transient, || async {
                let body = ByteStream::from_path(local_path)
                    .await
                    .map_err(|e| anyhow!("failed to read {}: {}", local_path.display(), e))?;

                self.client
                    .put_object()
                    .bucket(&self.bucket)
                    .key(key)
                    .body(body)
                    .content_type(&headers.content_type)
                    .content_disposition(headers.content_disposition)
                    .cache_control(headers.cache_control)
                    .metadata("archive-type", headers.archive_type)
                    .send()
                    .await
                    .map_err(|e| {
                        anyhow!(
                            "put_object failed for {}: {}",
                            key,
                            aws_sdk_s3::error::DisplayErrorContext(&e)
                        )
                    })?;

                debug!("S3 upload complete: {}", key);
                Ok(())
            })
            .await
    }
}
