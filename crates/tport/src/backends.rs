//! 🔌 Backends: one capability trait per kind of storage, and the things that implement them.
//!
//! Nobody here pretends to be everything. A search index writes bulk; an object
//! store holds blobs; a queue produces and consumes. Each concrete client
//! implements only the capability it actually has, and the sinks ask for
//! exactly the capability they need.
//!
//! ```text
//!   IndexSink ──▶ BulkWriter     ◀── ElasticsearchBackend | InMemorySearchIndex
//!   ObjectSink ─▶ BlobStore      ◀── S3Backend            | InMemoryBlobStore
//!   DocumentSink▶ DocumentStore  ◀── MongoBackend         | InMemoryDocumentStore
//!   ColumnSink ─▶ ColumnStore    ◀── HbaseBackend         | InMemoryColumnStore
//!   QueueSink ──▶ MessageQueue   ◀── KafkaBackend         | InMemoryQueue
//! ```
//!
//! Each trait also gets a `*Backend` enum that dispatches to the live client or
//! the in-memory one, so the CLI can pick at runtime (hello, `--dry-run`).

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::Result;
use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::common::{BatchStats, Record};
use crate::transforms::BulkEntry;

pub mod elasticsearch;
pub mod hbase;
pub mod in_mem;
pub mod kafka;
pub mod mongo;
pub mod s3;

pub use elasticsearch::{ElasticsearchBackend, ElasticsearchConfig};
pub use hbase::{HbaseBackend, HbaseConfig};
pub use in_mem::{
    InMemoryBlobStore, InMemoryColumnStore, InMemoryDocumentStore, InMemoryQueue,
    InMemorySearchIndex,
};
pub use kafka::{KafkaBackend, KafkaConfig};
pub use mongo::{MongoBackend, MongoConfig};
pub use s3::{S3Backend, S3Config};

/// 🏗️ What happened when we asked for an index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexCreation {
    Created,
    AlreadyExists,
}

/// 🪣 Same question, for buckets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BucketCreation {
    Created,
    AlreadyExists,
}

/// 📊 One row out of a column store. Cells are `family:qualifier -> value`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Row {
    pub key: String,
    pub cells: BTreeMap<String, String>,
}

/// 📨 One message off a queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Message {
    pub partition: i64,
    pub offset: i64,
    pub value: String,
}

/// 📡 A search index that takes documents in bulk.
#[async_trait]
pub trait BulkWriter: Send + Sync {
    /// Create the index. "It already exists" is an answer, not an error.
    async fn create_index(&self, index: &str) -> Result<IndexCreation>;
    async fn put_mapping(&self, index: &str, doc_type: Option<&str>, mapping: &Value)
    -> Result<()>;
    /// One network call for the whole slice. Returns per-document accounting.
    async fn bulk(&self, entries: &[BulkEntry]) -> Result<BatchStats>;
}

/// 🪣 Buckets full of named blobs.
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn list_buckets(&self) -> Result<Vec<String>>;
    async fn ensure_bucket(&self, bucket: &str) -> Result<BucketCreation>;
    async fn object_exists(&self, bucket: &str, key: &str) -> Result<bool>;
    async fn put_file(&self, bucket: &str, key: &str, path: &Path) -> Result<()>;
    async fn list_objects(&self, bucket: &str) -> Result<Vec<String>>;
    async fn get_to_file(&self, bucket: &str, key: &str, destination: &Path) -> Result<()>;
    async fn delete_object(&self, bucket: &str, key: &str) -> Result<()>;
    async fn delete_bucket(&self, bucket: &str) -> Result<()>;
}

/// 🍃 Collections of JSON-ish documents.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn list_collections(&self) -> Result<Vec<String>>;
    async fn find_all(&self, collection: &str) -> Result<BoxStream<'static, Result<Record>>>;
    async fn insert_one(&self, collection: &str, document: Map<String, Value>) -> Result<()>;
}

/// 🗄️ Wide tables you can only really scan.
#[async_trait]
pub trait ColumnStore: Send + Sync {
    async fn scan(&self, table: &str) -> Result<BoxStream<'static, Result<Row>>>;
}

/// 📬 Topics you can write to and read from.
#[async_trait]
pub trait MessageQueue: Send + Sync {
    async fn topics(&self) -> Result<Vec<String>>;
    /// Every message from the stream goes to `topic`; the stats count what the broker accepted.
    async fn produce(
        &self,
        topic: &str,
        messages: BoxStream<'_, Result<String>>,
    ) -> Result<BatchStats>;
    /// Live consumers never end on their own. Drop the stream to stop.
    async fn consume(&self, topic: &str) -> Result<BoxStream<'static, Result<Message>>>;
}

// ============================================================
//  🎭 runtime dispatch: the real thing, or the rehearsal
// ============================================================

#[derive(Debug)]
pub enum IndexBackend {
    Elasticsearch(ElasticsearchBackend),
    InMemory(InMemorySearchIndex),
}

#[async_trait]
impl BulkWriter for IndexBackend {
    async fn create_index(&self, index: &str) -> Result<IndexCreation> {
        match self {
            IndexBackend::Elasticsearch(b) => b.create_index(index).await,
            IndexBackend::InMemory(b) => b.create_index(index).await,
        }
    }

    async fn put_mapping(
        &self,
        index: &str,
        doc_type: Option<&str>,
        mapping: &Value,
    ) -> Result<()> {
        match self {
            IndexBackend::Elasticsearch(b) => b.put_mapping(index, doc_type, mapping).await,
            IndexBackend::InMemory(b) => b.put_mapping(index, doc_type, mapping).await,
        }
    }

    async fn bulk(&self, entries: &[BulkEntry]) -> Result<BatchStats> {
        match self {
            IndexBackend::Elasticsearch(b) => b.bulk(entries).await,
            IndexBackend::InMemory(b) => b.bulk(entries).await,
        }
    }
}

#[derive(Debug)]
pub enum BlobBackend {
    S3(S3Backend),
    InMemory(InMemoryBlobStore),
}

#[async_trait]
impl BlobStore for BlobBackend {
    async fn list_buckets(&self) -> Result<Vec<String>> {
        match self {
            BlobBackend::S3(b) => b.list_buckets().await,
            BlobBackend::InMemory(b) => b.list_buckets().await,
        }
    }

    async fn ensure_bucket(&self, bucket: &str) -> Result<BucketCreation> {
        match self {
            BlobBackend::S3(b) => b.ensure_bucket(bucket).await,
            BlobBackend::InMemory(b) => b.ensure_bucket(bucket).await,
        }
    }

    async fn object_exists(&self, bucket: &str, key: &str) -> Result<bool> {
        match self {
            BlobBackend::S3(b) => b.object_exists(bucket, key).await,
            BlobBackend::InMemory(b) => b.object_exists(bucket, key).await,
        }
    }

    async fn put_file(&self, bucket: &str, key: &str, path: &Path) -> Result<()> {
        match self {
            BlobBackend::S3(b) => b.put_file(bucket, key, path).await,
            BlobBackend::InMemory(b) => b.put_file(bucket, key, path).await,
        }
    }

    async fn list_objects(&self, bucket: &str) -> Result<Vec<String>> {
        match self {
            BlobBackend::S3(b) => b.list_objects(bucket).await,
            BlobBackend::InMemory(b) => b.list_objects(bucket).await,
        }
    }

    async fn get_to_file(&self, bucket: &str, key: &str, destination: &Path) -> Result<()> {
        match self {
            BlobBackend::S3(b) => b.get_to_file(bucket, key, destination).await,
            BlobBackend::InMemory(b) => b.get_to_file(bucket, key, destination).await,
        }
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> Result<()> {
        match self {
            BlobBackend::S3(b) => b.delete_object(bucket, key).await,
            BlobBackend::InMemory(b) => b.delete_object(bucket, key).await,
        }
    }

    async fn delete_bucket(&self, bucket: &str) -> Result<()> {
        match self {
            BlobBackend::S3(b) => b.delete_bucket(bucket).await,
            BlobBackend::InMemory(b) => b.delete_bucket(bucket).await,
        }
    }
}

#[derive(Debug)]
pub enum DocumentBackend {
    Mongo(MongoBackend),
    InMemory(InMemoryDocumentStore),
}

#[async_trait]
impl DocumentStore for DocumentBackend {
    async fn list_collections(&self) -> Result<Vec<String>> {
        match self {
            DocumentBackend::Mongo(b) => b.list_collections().await,
            DocumentBackend::InMemory(b) => b.list_collections().await,
        }
    }

    async fn find_all(&self, collection: &str) -> Result<BoxStream<'static, Result<Record>>> {
        match self {
            DocumentBackend::Mongo(b) => b.find_all(collection).await,
            DocumentBackend::InMemory(b) => b.find_all(collection).await,
        }
    }

    async fn insert_one(&self, collection: &str, document: Map<String, Value>) -> Result<()> {
        match self {
            DocumentBackend::Mongo(b) => b.insert_one(collection, document).await,
            DocumentBackend::InMemory(b) => b.insert_one(collection, document).await,
        }
    }
}

#[derive(Debug)]
pub enum ColumnBackend {
    Hbase(HbaseBackend),
    InMemory(InMemoryColumnStore),
}

#[async_trait]
impl ColumnStore for ColumnBackend {
    async fn scan(&self, table: &str) -> Result<BoxStream<'static, Result<Row>>> {
        match self {
            ColumnBackend::Hbase(b) => b.scan(table).await,
            ColumnBackend::InMemory(b) => b.scan(table).await,
        }
    }
}

#[derive(Debug)]
pub enum QueueBackend {
    Kafka(KafkaBackend),
    InMemory(InMemoryQueue),
}

#[async_trait]
impl MessageQueue for QueueBackend {
    async fn topics(&self) -> Result<Vec<String>> {
        match self {
            QueueBackend::Kafka(b) => b.topics().await,
            QueueBackend::InMemory(b) => b.topics().await,
        }
    }

    async fn produce(
        &self,
        topic: &str,
        messages: BoxStream<'_, Result<String>>,
    ) -> Result<BatchStats> {
        match self {
            QueueBackend::Kafka(b) => b.produce(topic, messages).await,
            QueueBackend::InMemory(b) => b.produce(topic, messages).await,
        }
    }

    async fn consume(&self, topic: &str) -> Result<BoxStream<'static, Result<Message>>> {
        match self {
            QueueBackend::Kafka(b) => b.consume(topic).await,
            QueueBackend::InMemory(b) => b.consume(topic).await,
        }
    }
}
