//! 🍃 DocumentSink: one record, one insert. No batching, no drama.

use std::pin::pin;

use anyhow::{Context, Result};
use futures::stream::BoxStream;
use futures::{Stream, TryStreamExt};
use serde_json::Value;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{info, warn};

use crate::backends::DocumentStore;
use crate::common::{BatchStats, Record};

#[derive(Debug)]
pub struct DocumentSink<D> {
    store: D,
}

impl<D: DocumentStore> DocumentSink<D> {
    pub fn new(store: D) -> Self {
        Self { store }
    }

    /// 📋 Collection names, sorted.
    pub async fn list(&self) -> Result<Vec<String>> {
        let mut collections = self.store.list_collections().await?;
        collections.sort();
        Ok(collections)
    }

    /// 👀 Every document, one at a time. The pausing is somebody else's problem.
    pub async fn preview(&self, collection: &str) -> Result<BoxStream<'static, Result<Record>>> {
        self.store.find_all(collection).await
    }

    /// 📤 Every document as one JSON line into `writer`. Returns the line count.
    pub async fn export<W>(&self, collection: &str, writer: W) -> Result<u64>
    where
        W: AsyncWrite + Unpin,
    {
        let mut writer = writer;
        let mut documents = self.store.find_all(collection).await?;
        let mut exported = 0u64;
        while let Some(document) = documents.try_next().await? {
            let mut line = serde_json::to_vec(&document).context("💀 document refused to serialize")?;
            line.push(b'\n');
            writer
                .write_all(&line)
                .await
                .context("💀 writing the export failed")?;
            exported += 1;
        }
        writer.flush().await.context("💀 flushing the export failed")?;
        info!("📤 exported {} documents from {}", exported, collection);
        Ok(exported)
    }

    /// 📥 Insert each record. Non-objects can't be documents, so they count as failed.
    pub async fn add<S>(&self, collection: &str, records: S) -> Result<BatchStats>
    where
        S: Stream<Item = Result<Record>>,
    {
        let mut records = pin!(records);
        let mut stats = BatchStats::default();
        while let Some(record) = records.try_next().await? {
            match record {
                Value::Object(document) => {
                    self.store
                        .insert_one(collection, document)
                        .await
                        .with_context(|| format!("💀 insert into '{}' failed", collection))?;
                    stats.record_success(1);
                }
                other => {
                    warn!("⚠️ skipping a non-object record: {}", other);
                    stats.record_failure(1);
                }
            }
        }
        info!("ADD: {}", stats);
        Ok(stats)
    }
}
