//! `ObjectStore` backed by Amazon S3.

use super::traits::{ListPage, ObjectStore, StoreError};
use crate::config::types::S3Config;
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{Delete, ObjectIdentifier};
use aws_sdk_s3::Client;
use std::path::Path;
use tokio::io::AsyncWriteExt;
use tracing::debug;

/// S3 accepts at most this many keys per DeleteObjects request.
const MAX_DELETE_BATCH: usize = 1000;

pub struct S3Store {
    client: Client,
    bucket: String,
}

impl S3Store {
    pub fn new(client: Client, bucket: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
        }
    }

    /// Build a client from config and wrap it.
    pub async fn connect(bucket: &str, config: &S3Config) -> Self {
        Self::new(create_s3_client(config).await, bucket)
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }
}

/// Create an S3 client, layering explicit settings over the default provider chain.
pub async fn create_s3_client(config: &S3Config) -> Client {
    use aws_config::Region;

    let mut loader = aws_config::defaults(BehaviorVersion::latest());

    if let Some(region) = &config.region {
        loader = loader.region(Region::new(region.clone()));
    }

    if let Some(endpoint) = &config.endpoint {
        loader = loader.endpoint_url(endpoint);
    }

    if let (Some(access_key), Some(secret_key)) =
        (&config.access_key_id, &config.secret_access_key)
    {
        let credentials = aws_sdk_s3::config::Credentials::new(
            access_key,
            secret_key,
            None,
            None,
            "cf-log-compactor",
        );
        loader = loader.credentials_provider(credentials);
    }

    if let Some(profile) = &config.profile {
        loader = loader.profile_name(profile);
    }

    let shared = loader.load().await;
    let builder = aws_sdk_s3::config::Builder::from(&shared);

    // Custom endpoints (MinIO, LocalStack) generally need path-style addressing
    let s3_config = if config.endpoint.is_some() {
        builder.force_path_style(true).build()
    } else {
        builder.build()
    };

    Client::from_conf(s3_config)
}

#[async_trait]
impl ObjectStore for S3Store {
    async fn list_page(
        &self,
        prefix: &str,
        delimiter: Option<&str>,
        continuation_token: Option<&str>,
        max_keys: i32,
    ) -> Result<ListPage, StoreError> {
        let resp = self
            .client
            .list_objects_v2()
            .bucket(&self.bucket)
            .prefix(prefix)
            .set_delimiter(delimiter.map(str::to_string))
            .max_keys(max_keys)
            .set_continuation_token(continuation_token.map(str::to_string))
            .send()
            .await
            .map_err(|e| StoreError::List {
                prefix: prefix.to_string(),
                message: format!("{}", aws_sdk_s3::error::DisplayErrorContext(e)),
            })?;

        let keys = resp
            .contents()
            .iter()
            .filter_map(|obj| obj.key().map(str::to_string))
            .collect();
        let common_prefixes = resp
            .common_prefixes()
            .iter()
            .filter_map(|p| p.prefix().map(str::to_string))
            .collect();

        Ok(ListPage {
            keys,
            common_prefixes,
            is_truncated: resp.is_truncated().unwrap_or(false),
            next_continuation_token: resp.next_continuation_token().map(str::to_string),
        })
    }

    async fn download(&self, key: &str, dest: &Path) -> Result<u64, StoreError> {
        let resp = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                let not_found = e
                    .as_service_error()
                    .map(|se| se.is_no_such_key())
                    .unwrap_or(false);
                if not_found {
                    StoreError::NotFound(key.to_string())
                } else {
                    StoreError::Get {
                        key: key.to_string(),
                        message: format!("{}", aws_sdk_s3::error::DisplayErrorContext(e)),
                    }
                }
            })?;

        let mut body = resp.body.into_async_read();
        let mut file = tokio::fs::File::create(dest).await?;
        let written = tokio::io::copy(&mut body, &mut file).await?;
        file.flush().await?;

        debug!(key = %key, bytes = written, "Downloaded object");
        Ok(written)
    }

    async fn upload(&self, key: &str, src: &Path) -> Result<(), StoreError> {
        let body = ByteStream::from_path(src)
            .await
            .map_err(|e| StoreError::Put {
                key: key.to_string(),
                message: e.to_string(),
            })?;

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(body)
            .send()
            .await
            .map_err(|e| StoreError::Put {
                key: key.to_string(),
                message: format!("{}", aws_sdk_s3::error::DisplayErrorContext(e)),
            })?;

        Ok(())
    }

    async fn delete_many(&self, keys: &[String]) -> Result<(), StoreError> {
        for chunk in keys.chunks(MAX_DELETE_BATCH) {
            let objects = chunk
                .iter()
                .map(|key| ObjectIdentifier::builder().key(key).build())
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| StoreError::Request(e.to_string()))?;

            let delete = Delete::builder()
                .set_objects(Some(objects))
                .quiet(true)
                .build()
                .map_err(|e| StoreError::Request(e.to_string()))?;

            let resp = self
                .client
                .delete_objects()
                .bucket(&self.bucket)
                .delete(delete)
                .send()
                .await
                .map_err(|e| StoreError::Delete {
                    count: chunk.len(),
                    message: format!("{}", aws_sdk_s3::error::DisplayErrorContext(e)),
                })?;

            let errors = resp.errors();
            if !errors.is_empty() {
                let detail: Vec<String> = errors
                    .iter()
                    .map(|e| {
                        format!(
                            "{}: {}",
                            e.key().unwrap_or("<unknown>"),
                            e.message().unwrap_or("unknown error")
                        )
                    })
                    .collect();
                return Err(StoreError::Delete {
                    count: errors.len(),
                    message: detail.join("; "),
                });
            }

            debug!(count = chunk.len(), "Deleted objects");
        }

        Ok(())
    }
}
