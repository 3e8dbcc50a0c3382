//! 🪣 ObjectSink: files up, files down, and the big red button.
//!
//! Upload names each object after the file's base name (`.gz` appended when
//! compressed). Whether an existing object gets overwritten is the caller's
//! choice, and the outcome says which way it went.
//!
//! `destroy` does exactly what it says with zero ceremony. The ceremony
//! (warning + "are you sure?") lives in the CLI, on purpose.

use std::path::{Component, Path, PathBuf};

use anyhow::{Context, Result, bail};
use serde::Serialize;
use tracing::{info, warn};

use crate::backends::{BlobStore, BucketCreation};
use crate::compression::{self, CompressedArtifact};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UploadOptions {
    pub compress: bool,
    pub replace_existing: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadStatus {
    Uploaded,
    Replaced,
    AlreadyExists,
}

impl std::fmt::Display for UploadStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            UploadStatus::Uploaded => "uploaded",
            UploadStatus::Replaced => "replaced",
            UploadStatus::AlreadyExists => "already exists",
        })
    }
}

/// 🧾 What happened to one file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadOutcome {
    pub file: PathBuf,
    pub object_name: String,
    pub status: UploadStatus,
}

/// 🛡️ Keys are names, not paths. Anything that would climb out of the
/// download folder (or start at the root) doesn't get written.
fn safe_relative_path(key: &str) -> Option<PathBuf> {
    let path = Path::new(key);
    let mut clean = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => clean.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    (!clean.as_os_str().is_empty()).then_some(clean)
}

#[derive(Debug)]
pub struct ObjectSink<B> {
    store: B,
}

impl<B: BlobStore> ObjectSink<B> {
    pub fn new(store: B) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &B {
        &self.store
    }

    /// 📋 Every bucket, sorted.
    pub async fn list(&self) -> Result<Vec<String>> {
        let mut buckets = self.store.list_buckets().await?;
        buckets.sort();
        Ok(buckets)
    }

    /// ⬆️ Bucket is created if missing, then each file goes up (or doesn't, see `replace_existing`).
    pub async fn upload(
        &self,
        bucket: &str,
        files: &[PathBuf],
        options: UploadOptions,
    ) -> Result<Vec<UploadOutcome>> {
        if self.store.ensure_bucket(bucket).await? == BucketCreation::Created {
            info!("🪣 created bucket {}", bucket);
        }

        let mut outcomes = Vec::with_capacity(files.len());
        for file in files {
            outcomes.push(self.upload_one(bucket, file, options).await?);
        }
        Ok(outcomes)
    }

    async fn upload_one(
        &self,
        bucket: &str,
        file: &Path,
        options: UploadOptions,
    ) -> Result<UploadOutcome> {
        let base_name = file
            .file_name()
            .and_then(|n| n.to_str())
            .with_context(|| format!("💀 '{}' has no usable file name", file.display()))?;
        if !tokio::fs::metadata(file).await.map(|m| m.is_file()).unwrap_or(false) {
            bail!("💀 '{}' is not a file we can upload", file.display());
        }

        let object_name = if options.compress {
            compression::compressed_name(base_name)
        } else {
            base_name.to_string()
        };

        // -- skipped uploads never pay for gzip
        let exists = self.store.object_exists(bucket, &object_name).await?;
        let status = if exists && !options.replace_existing {
            info!("⏭️ {} already exists in {}", object_name, bucket);
            UploadStatus::AlreadyExists
        } else {
            // -- the artifact must outlive the put; its temp dir dies with it
            let artifact: Option<CompressedArtifact> = if options.compress {
                Some(compression::compress(file.to_path_buf()).await?)
            } else {
                None
            };
            let payload = artifact.as_ref().map_or(file, |a| a.path());
            self.store
                .put_file(bucket, &object_name, payload)
                .await
                .with_context(|| format!("💀 uploading '{}' failed", file.display()))?;
            if exists {
                info!("♻️ {} replaced in {}", object_name, bucket);
                UploadStatus::Replaced
            } else {
                info!("⬆️ {} uploaded to {}", object_name, bucket);
                UploadStatus::Uploaded
            }
        };

        Ok(UploadOutcome {
            file: file.to_path_buf(),
            object_name,
            status,
        })
    }

    /// ⬇️ Every object into `folder/<name>`. Returns how many were written.
    pub async fn download(&self, bucket: &str, folder: &Path) -> Result<usize> {
        tokio::fs::create_dir_all(folder)
            .await
            .with_context(|| format!("💀 could not create '{}'", folder.display()))?;

        let mut written = 0;
        for key in self.store.list_objects(bucket).await? {
            let Some(relative) = safe_relative_path(&key) else {
                warn!("⚠️ skipping '{}': it would land outside {}", key, folder.display());
                continue;
            };
            let destination = folder.join(relative);
            if let Some(parent) = destination.parent() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .with_context(|| format!("💀 could not create '{}'", parent.display()))?;
            }
            self.store.get_to_file(bucket, &key, &destination).await?;
            info!("⬇️ {} -> {}", key, destination.display());
            written += 1;
        }
        Ok(written)
    }

    /// 💣 Every object, then the bucket. No undo. Returns the object count.
    pub async fn destroy(&self, bucket: &str) -> Result<usize> {
        let keys = self.store.list_objects(bucket).await?;
        for key in &keys {
            self.store.delete_object(bucket, key).await?;
        }
        self.store.delete_bucket(bucket).await?;
        info!("💣 destroyed {} ({} objects)", bucket, keys.len());
        Ok(keys.len())
    }
}
