//! 📡 IndexSink: records in, chunked bulk requests out.
//!
//! The loop is the whole story:
//!
//! ```text
//!   pull record ─▶ extract id ─▶ push into chunk ─▶ chunk full? ─▶ bulk() ─▶ absorb stats
//!                                                        └── stream over? flush the rest
//! ```
//!
//! No retries. A rejected document is counted, not resent; re-running is the
//! operator's call. A backend that refuses the whole request ends the run.

use std::pin::pin;

use anyhow::{Context, Result};
use futures::{Stream, TryStreamExt};
use serde_json::Value;
use tracing::{debug, info};

use crate::backends::{BulkWriter, IndexCreation};
use crate::common::{BatchStats, Record};
use crate::error::TransportError;
use crate::transforms::{BulkEntry, IdRule};

/// 🎯 Where the documents go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexTarget {
    pub index: String,
    pub doc_type: Option<String>,
}

impl IndexTarget {
    pub fn new(index: impl Into<String>, doc_type: Option<String>) -> Self {
        Self {
            index: index.into(),
            doc_type,
        }
    }
}

#[derive(Debug)]
pub struct IndexSink<W> {
    writer: W,
    id_rule: IdRule,
}

impl<W: BulkWriter> IndexSink<W> {
    pub fn new(writer: W, id_rule: IdRule) -> Self {
        Self { writer, id_rule }
    }

    pub fn writer(&self) -> &W {
        &self.writer
    }

    /// 🏗️ Create if absent. Running it twice is fine; that's the point.
    pub async fn create(&self, index: &str) -> Result<IndexCreation> {
        let outcome = self
            .writer
            .create_index(index)
            .await
            .with_context(|| format!("💀 could not create index '{}'", index))?;
        match outcome {
            IndexCreation::Created => info!("🏗️ created index {}", index),
            IndexCreation::AlreadyExists => info!("✅ index {} already exists", index),
        }
        Ok(outcome)
    }

    /// 🗺️ Make sure the index exists, then apply the mapping.
    pub async fn map(&self, target: &IndexTarget, mapping: &Value) -> Result<()> {
        self.create(&target.index).await?;
        self.writer
            .put_mapping(&target.index, target.doc_type.as_deref(), mapping)
            .await
            .with_context(|| format!("💀 could not apply the mapping to '{}'", target.index))?;
        info!("🗺️ mapping applied to {}", target.index);
        Ok(())
    }

    /// 📦 The main event. Streams `records` into the index in chunks of `chunk_size`.
    ///
    /// Nothing is materialized beyond one chunk at a time.
    pub async fn index<S>(&self, records: S, target: &IndexTarget, chunk_size: usize) -> Result<BatchStats>
    where
        S: Stream<Item = Result<Record>>,
    {
        if chunk_size == 0 {
            return Err(TransportError::InvalidChunkSize(chunk_size).into());
        }
        self.create(&target.index).await?;
        if let Some(doc_type) = &target.doc_type {
            debug!("doc type for {} is {}", target.index, doc_type);
        }

        let mut records = pin!(records);
        let mut stats = BatchStats::default();
        let mut chunk: Vec<BulkEntry> = Vec::with_capacity(chunk_size);
        let mut chunks_sent = 0usize;

        while let Some(record) = records.try_next().await? {
            chunk.push(BulkEntry {
                index: target.index.clone(),
                doc_type: target.doc_type.clone(),
                id: self.id_rule.extract(&record),
                source: record,
            });
            if chunk.len() >= chunk_size {
                chunks_sent += 1;
                self.flush(&mut chunk, &mut stats, chunks_sent).await?;
            }
        }
        if !chunk.is_empty() {
            chunks_sent += 1;
            self.flush(&mut chunk, &mut stats, chunks_sent).await?;
        }

        info!("INDEX: {}", stats);
        Ok(stats)
    }

    async fn flush(
        &self,
        chunk: &mut Vec<BulkEntry>,
        stats: &mut BatchStats,
        chunk_number: usize,
    ) -> Result<()> {
        let submitted = self
            .writer
            .bulk(chunk)
            .await
            .with_context(|| format!("💀 bulk submission #{} failed", chunk_number))?;
        stats.absorb(submitted);
        info!(
            "📦 chunk #{}: {} docs ({}); running total {}",
            chunk_number,
            chunk.len(),
            submitted,
            stats
        );
        chunk.clear();
        Ok(())
    }
}
