//! # Previously, on tport...
//!
//! 🎬 Every backend, none of the servers. These live entirely in RAM and vanish
//! the moment you blink, which makes them perfect for `--dry-run` and for tests
//! that want to count exactly how many bulk requests went out.
//!
//! State sits behind `Arc<Mutex<...>>` so a clone handed to a sink and the clone
//! kept by the test see the same world. Inspection helpers are async because the
//! lock is tokio's.
//!
//! ⚠️ Not for production. If you're deploying this to prod, please also deploy a therapist.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use futures::stream::{self, BoxStream};
use futures::{StreamExt, TryStreamExt};
use serde_json::{Map, Value};
use tokio::sync::Mutex;

use crate::backends::{
    BlobStore, BucketCreation, BulkWriter, ColumnStore, DocumentStore, IndexCreation, Message,
    MessageQueue, Row,
};
use crate::common::{BatchStats, Record};
use crate::transforms::BulkEntry;

// ============================================================
//  📡 search index
// ============================================================

type RejectRule = Arc<dyn Fn(&BulkEntry) -> bool + Send + Sync>;

#[derive(Debug, Default)]
struct SearchState {
    indices: BTreeMap<String, Vec<(Option<String>, Record)>>,
    mappings: BTreeMap<String, Value>,
    submissions: Vec<usize>,
}

/// 📡 A search index that believes every document it is told, unless told otherwise.
#[derive(Clone, Default)]
pub struct InMemorySearchIndex {
    state: Arc<Mutex<SearchState>>,
    reject: Option<RejectRule>,
}

// 🎭 closures don't do Debug. we describe them instead.
impl std::fmt::Debug for InMemorySearchIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemorySearchIndex")
            .field("has_reject_rule", &self.reject.is_some())
            .finish()
    }
}

impl InMemorySearchIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// 🚫 Documents matching `rule` are counted as failed instead of stored.
    pub fn rejecting(rule: impl Fn(&BulkEntry) -> bool + Send + Sync + 'static) -> Self {
        Self {
            state: Arc::default(),
            reject: Some(Arc::new(rule)),
        }
    }

    /// 📏 Size of every bulk call, in order.
    pub async fn submissions(&self) -> Vec<usize> {
        self.state.lock().await.submissions.clone()
    }

    pub async fn documents(&self, index: &str) -> Vec<(Option<String>, Record)> {
        self.state
            .lock()
            .await
            .indices
            .get(index)
            .cloned()
            .unwrap_or_default()
    }

    pub async fn mapping(&self, index: &str) -> Option<Value> {
        self.state.lock().await.mappings.get(index).cloned()
    }
}

#[async_trait]
impl BulkWriter for InMemorySearchIndex {
    async fn create_index(&self, index: &str) -> Result<IndexCreation> {
        let mut state = self.state.lock().await;
        if state.indices.contains_key(index) {
            return Ok(IndexCreation::AlreadyExists);
        }
        state.indices.insert(index.to_string(), Vec::new());
        Ok(IndexCreation::Created)
    }

    async fn put_mapping(
        &self,
        index: &str,
        _doc_type: Option<&str>,
        mapping: &Value,
    ) -> Result<()> {
        let mut state = self.state.lock().await;
        if !state.indices.contains_key(index) {
            bail!("💀 no such index '{}' to map", index);
        }
        state.mappings.insert(index.to_string(), mapping.clone());
        Ok(())
    }

    async fn bulk(&self, entries: &[BulkEntry]) -> Result<BatchStats> {
        let mut state = self.state.lock().await;
        state.submissions.push(entries.len());
        let mut stats = BatchStats::default();
        for entry in entries {
            if self.reject.as_ref().is_some_and(|rule| rule(entry)) {
                stats.record_failure(1);
                continue;
            }
            let docs = state.indices.entry(entry.index.clone()).or_default();
            // -- same id twice is an overwrite, like the real thing
            if let Some(id) = &entry.id {
                docs.retain(|(existing, _)| existing.as_ref() != Some(id));
            }
            docs.push((entry.id.clone(), entry.source.clone()));
            stats.record_success(1);
        }
        Ok(stats)
    }
}

// ============================================================
//  🪣 blob store
// ============================================================

/// 🪣 Buckets of bytes. Deleting a non-empty bucket fails, same as S3.
#[derive(Debug, Clone, Default)]
pub struct InMemoryBlobStore {
    buckets: Arc<Mutex<BTreeMap<String, BTreeMap<String, Vec<u8>>>>>,
}

impl InMemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn object(&self, bucket: &str, key: &str) -> Option<Vec<u8>> {
        self.buckets.lock().await.get(bucket)?.get(key).cloned()
    }

    /// 🧪 Seed an object without going through a file.
    pub async fn insert(&self, bucket: &str, key: &str, bytes: impl Into<Vec<u8>>) {
        self.buckets
            .lock()
            .await
            .entry(bucket.to_string())
            .or_default()
            .insert(key.to_string(), bytes.into());
    }
}

#[async_trait]
impl BlobStore for InMemoryBlobStore {
    async fn list_buckets(&self) -> Result<Vec<String>> {
        Ok(self.buckets.lock().await.keys().cloned().collect())
    }

    async fn ensure_bucket(&self, bucket: &str) -> Result<BucketCreation> {
        let mut buckets = self.buckets.lock().await;
        if buckets.contains_key(bucket) {
            return Ok(BucketCreation::AlreadyExists);
        }
        buckets.insert(bucket.to_string(), BTreeMap::new());
        Ok(BucketCreation::Created)
    }

    async fn object_exists(&self, bucket: &str, key: &str) -> Result<bool> {
        Ok(self
            .buckets
            .lock()
            .await
            .get(bucket)
            .is_some_and(|objects| objects.contains_key(key)))
    }

    async fn put_file(&self, bucket: &str, key: &str, path: &Path) -> Result<()> {
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("💀 could not read '{}' for upload", path.display()))?;
        let mut buckets = self.buckets.lock().await;
        let Some(objects) = buckets.get_mut(bucket) else {
            bail!("💀 NoSuchBucket: '{}'", bucket);
        };
        objects.insert(key.to_string(), bytes);
        Ok(())
    }

    async fn list_objects(&self, bucket: &str) -> Result<Vec<String>> {
        match self.buckets.lock().await.get(bucket) {
            Some(objects) => Ok(objects.keys().cloned().collect()),
            None => bail!("💀 NoSuchBucket: '{}'", bucket),
        }
    }

    async fn get_to_file(&self, bucket: &str, key: &str, destination: &Path) -> Result<()> {
        let Some(bytes) = self.object(bucket, key).await else {
            bail!("💀 NoSuchKey: '{}/{}'", bucket, key);
        };
        tokio::fs::write(destination, bytes)
            .await
            .with_context(|| format!("💀 could not write '{}'", destination.display()))
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> Result<()> {
        if let Some(objects) = self.buckets.lock().await.get_mut(bucket) {
            objects.remove(key);
        }
        Ok(())
    }

    async fn delete_bucket(&self, bucket: &str) -> Result<()> {
        let mut buckets = self.buckets.lock().await;
        match buckets.get(bucket) {
            None => bail!("💀 NoSuchBucket: '{}'", bucket),
            Some(objects) if !objects.is_empty() => {
                bail!("💀 BucketNotEmpty: '{}' still holds {} objects", bucket, objects.len())
            }
            Some(_) => {
                buckets.remove(bucket);
                Ok(())
            }
        }
    }
}

// ============================================================
//  🍃 document store
// ============================================================

#[derive(Debug, Clone, Default)]
pub struct InMemoryDocumentStore {
    collections: Arc<Mutex<BTreeMap<String, Vec<Record>>>>,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn documents(&self, collection: &str) -> Vec<Record> {
        self.collections
            .lock()
            .await
            .get(collection)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn list_collections(&self) -> Result<Vec<String>> {
        Ok(self.collections.lock().await.keys().cloned().collect())
    }

    async fn find_all(&self, collection: &str) -> Result<BoxStream<'static, Result<Record>>> {
        let snapshot = self.documents(collection).await;
        Ok(stream::iter(snapshot).map(Ok).boxed())
    }

    async fn insert_one(&self, collection: &str, document: Map<String, Value>) -> Result<()> {
        self.collections
            .lock()
            .await
            .entry(collection.to_string())
            .or_default()
            .push(Value::Object(document));
        Ok(())
    }
}

// ============================================================
//  🗄️ column store
// ============================================================

#[derive(Debug, Clone, Default)]
pub struct InMemoryColumnStore {
    tables: Arc<Mutex<BTreeMap<String, Vec<Row>>>>,
}

impl InMemoryColumnStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn put_rows(&self, table: &str, rows: Vec<Row>) {
        self.tables
            .lock()
            .await
            .entry(table.to_string())
            .or_default()
            .extend(rows);
    }
}

#[async_trait]
impl ColumnStore for InMemoryColumnStore {
    async fn scan(&self, table: &str) -> Result<BoxStream<'static, Result<Row>>> {
        let Some(rows) = self.tables.lock().await.get(table).cloned() else {
            bail!("💀 TableNotFoundException: '{}'", table);
        };
        Ok(stream::iter(rows).map(Ok).boxed())
    }
}

// ============================================================
//  📬 queue
// ============================================================

/// 📬 One partition per topic. Consuming replays what is there and then stops;
/// with nothing else producing, waiting around would be waiting forever.
#[derive(Debug, Clone, Default)]
pub struct InMemoryQueue {
    topics: Arc<Mutex<BTreeMap<String, Vec<String>>>>,
}

impl InMemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn messages(&self, topic: &str) -> Vec<String> {
        self.topics
            .lock()
            .await
            .get(topic)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl MessageQueue for InMemoryQueue {
    async fn topics(&self) -> Result<Vec<String>> {
        Ok(self.topics.lock().await.keys().cloned().collect())
    }

    async fn produce(
        &self,
        topic: &str,
        messages: BoxStream<'_, Result<String>>,
    ) -> Result<BatchStats> {
        let incoming: Vec<String> = messages.try_collect().await?;
        let count = incoming.len() as u64;
        self.topics
            .lock()
            .await
            .entry(topic.to_string())
            .or_default()
            .extend(incoming);
        Ok(BatchStats::new(count, 0))
    }

    async fn consume(&self, topic: &str) -> Result<BoxStream<'static, Result<Message>>> {
        let snapshot = self.messages(topic).await;
        Ok(stream::iter(snapshot.into_iter().enumerate().map(|(offset, value)| {
            Ok(Message {
                partition: 0,
                offset: offset as i64,
                value,
            })
        }))
        .boxed())
    }
}
