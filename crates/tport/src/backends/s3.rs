//! 🪣 S3 (and anything that speaks its dialect: MinIO, LocalStack, the works).
//!
//! Credentials come from config when both keys are set, otherwise from the
//! usual AWS provider chain (env, profile, instance metadata...). A custom
//! endpoint plus path-style addressing covers the S3-compatible crowd.
//!
//! 🧠 Knowledge graph:
//! - downloads go `GetObject` -> `ByteStream::into_async_read()` -> `tokio::io::copy` -> file
//! - uploads go `ByteStream::from_path`, so big files are streamed, not slurped
//! - listing uses the v2 paginator, 1000 keys a page, until S3 says that's all

use std::path::Path;

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::Client;
use aws_sdk_s3::config::{Credentials, Region};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{BucketLocationConstraint, CreateBucketConfiguration};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::backends::{BlobStore, BucketCreation};

// -- 🏖️ the region that needs no location constraint. every other one does.
const DEFAULT_REGION: &str = "us-east-1";

/// 🔧 How to reach the bucket farm.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct S3Config {
    pub region: String,
    /// custom endpoint for S3-compatible stores, e.g. `http://localhost:9000`
    pub endpoint: Option<String>,
    pub access_key: Option<String>,
    pub secret_key: Option<String>,
    pub force_path_style: bool,
}

impl Default for S3Config {
    fn default() -> Self {
        Self {
            region: DEFAULT_REGION.to_string(),
            endpoint: None,
            access_key: None,
            secret_key: None,
            force_path_style: false,
        }
    }
}

/// 🌍 us-east-1 must NOT be sent as a location constraint. S3 rejects it. Yes, really.
fn location_constraint_for(region: &str) -> Option<BucketLocationConstraint> {
    (region != DEFAULT_REGION).then(|| BucketLocationConstraint::from(region))
}

#[derive(Debug, Clone)]
pub struct S3Backend {
    client: Client,
    region: String,
}

impl S3Backend {
    pub async fn new(config: S3Config) -> Result<Self> {
        debug!(
            "🪣 S3 client: region={} endpoint={:?} path_style={}",
            config.region, config.endpoint, config.force_path_style
        );
        let mut loader =
            aws_config::defaults(BehaviorVersion::latest()).region(Region::new(config.region.clone()));
        match (&config.access_key, &config.secret_key) {
            (Some(access_key), Some(secret_key)) => {
                loader = loader.credentials_provider(Credentials::new(
                    access_key, secret_key, None, None, "tport-config",
                ));
            }
            (None, None) => {}
            _ => bail!("💀 s3.access_key and s3.secret_key must be set together, or not at all"),
        }
        let shared = loader.load().await;

        let mut builder =
            aws_sdk_s3::config::Builder::from(&shared).force_path_style(config.force_path_style);
        if let Some(endpoint) = &config.endpoint {
            builder = builder.endpoint_url(endpoint);
        }

        Ok(Self {
            client: Client::from_conf(builder.build()),
            region: config.region,
        })
    }
}

#[async_trait]
impl BlobStore for S3Backend {
    async fn list_buckets(&self) -> Result<Vec<String>> {
        let output = self
            .client
            .list_buckets()
            .send()
            .await
            .context("💀 listing buckets failed")?;
        Ok(output
            .buckets()
            .iter()
            .filter_map(|b| b.name().map(str::to_string))
            .collect())
    }

    async fn ensure_bucket(&self, bucket: &str) -> Result<BucketCreation> {
        match self.client.head_bucket().bucket(bucket).send().await {
            Ok(_) => return Ok(BucketCreation::AlreadyExists),
            Err(err) => {
                let missing = err
                    .as_service_error()
                    .map(|e| e.is_not_found())
                    .unwrap_or(false);
                if !missing {
                    return Err(err)
                        .with_context(|| format!("💀 could not check whether bucket '{}' exists", bucket));
                }
            }
        }

        let mut request = self.client.create_bucket().bucket(bucket);
        if let Some(constraint) = location_constraint_for(&self.region) {
            request = request.create_bucket_configuration(
                CreateBucketConfiguration::builder()
                    .location_constraint(constraint)
                    .build(),
            );
        }
        match request.send().await {
            Ok(_) => {
                info!("🪣 created bucket {}", bucket);
                Ok(BucketCreation::Created)
            }
            Err(err)
                if err
                    .as_service_error()
                    .map(|e| e.is_bucket_already_owned_by_you())
                    .unwrap_or(false) =>
            {
                Ok(BucketCreation::AlreadyExists)
            }
            Err(err) => Err(err).with_context(|| format!("💀 creating bucket '{}' failed", bucket)),
        }
    }

    async fn object_exists(&self, bucket: &str, key: &str) -> Result<bool> {
        match self.client.head_object().bucket(bucket).key(key).send().await {
            Ok(_) => Ok(true),
            Err(err) if err.as_service_error().map(|e| e.is_not_found()).unwrap_or(false) => {
                Ok(false)
            }
            Err(err) => Err(err)
                .with_context(|| format!("💀 could not check s3://{}/{}", bucket, key)),
        }
    }

    async fn put_file(&self, bucket: &str, key: &str, path: &Path) -> Result<()> {
        let body = ByteStream::from_path(path)
            .await
            .with_context(|| format!("💀 could not read '{}' for upload", path.display()))?;
        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(body)
            .send()
            .await
            .with_context(|| format!("💀 upload to s3://{}/{} failed", bucket, key))?;
        Ok(())
    }

    async fn list_objects(&self, bucket: &str) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        let mut pages = self
            .client
            .list_objects_v2()
            .bucket(bucket)
            .into_paginator()
            .send();
        while let Some(page) = pages.next().await {
            let page = page.with_context(|| format!("💀 listing objects in '{}' failed", bucket))?;
            keys.extend(
                page.contents()
                    .iter()
                    .filter_map(|o| o.key().map(str::to_string)),
            );
        }
        Ok(keys)
    }

    async fn get_to_file(&self, bucket: &str, key: &str, destination: &Path) -> Result<()> {
        let response = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .with_context(|| format!("💀 download of s3://{}/{} failed", bucket, key))?;

        let mut reader = Box::pin(response.body.into_async_read());
        let mut file = tokio::fs::File::create(destination)
            .await
            .with_context(|| format!("💀 could not create '{}'", destination.display()))?;
        let written = tokio::io::copy(&mut reader, &mut file)
            .await
            .with_context(|| format!("💀 writing '{}' failed mid-download", destination.display()))?;
        file.flush().await?;
        debug!("📥 s3://{}/{} -> {} ({} bytes)", bucket, key, destination.display(), written);
        Ok(())
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> Result<()> {
        self.client
            .delete_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .with_context(|| format!("💀 deleting s3://{}/{} failed", bucket, key))?;
        Ok(())
    }

    async fn delete_bucket(&self, bucket: &str) -> Result<()> {
        self.client
            .delete_bucket()
            .bucket(bucket)
            .send()
            .await
            .with_context(|| format!("💀 deleting bucket '{}' failed", bucket))?;
        Ok(())
    }
}
