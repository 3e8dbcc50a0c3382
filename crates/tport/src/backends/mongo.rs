//! 🍃 MongoDB, through the official driver.
//!
//! Documents come out as relaxed extended JSON (an ObjectId shows up as
//! `{"$oid": "..."}`), which round-trips through `add` without losing anything.

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::StreamExt;
use futures::stream::BoxStream;
use mongodb::Client;
use mongodb::bson::{self, Bson, Document, doc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::backends::DocumentStore;
use crate::common::Record;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MongoConfig {
    /// a bare host (`localhost`, `db:27017`) or a full `mongodb://` URI
    pub host: String,
    pub db: String,
}

impl Default for MongoConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            db: "local".to_string(),
        }
    }
}

/// 🔗 `localhost` -> `mongodb://localhost`. Full URIs pass through untouched.
fn connection_uri(host: &str) -> String {
    if host.starts_with("mongodb://") || host.starts_with("mongodb+srv://") {
        host.to_string()
    } else {
        format!("mongodb://{}", host)
    }
}

#[derive(Debug, Clone)]
pub struct MongoBackend {
    client: Client,
    db: String,
}

impl MongoBackend {
    /// 🚀 Parses the URI and builds the client. The driver connects lazily.
    pub async fn new(config: MongoConfig) -> Result<Self> {
        let uri = connection_uri(&config.host);
        debug!("🍃 mongo client for {} (db {})", uri, config.db);
        let client = Client::with_uri_str(&uri)
            .await
            .with_context(|| format!("💀 '{}' is not a usable MongoDB address", uri))?;
        Ok(Self {
            client,
            db: config.db,
        })
    }
}

#[async_trait]
impl DocumentStore for MongoBackend {
    async fn list_collections(&self) -> Result<Vec<String>> {
        self.client
            .database(&self.db)
            .list_collection_names()
            .await
            .with_context(|| format!("💀 listing collections in '{}' failed", self.db))
    }

    async fn find_all(&self, collection: &str) -> Result<BoxStream<'static, Result<Record>>> {
        let cursor = self
            .client
            .database(&self.db)
            .collection::<Document>(collection)
            .find(doc! {})
            .await
            .with_context(|| format!("💀 querying '{}.{}' failed", self.db, collection))?;
        Ok(cursor
            .map(|document| {
                document
                    .map(|d| Bson::Document(d).into_relaxed_extjson())
                    .context("💀 the cursor dropped a document on the floor")
            })
            .boxed())
    }

    async fn insert_one(&self, collection: &str, document: Map<String, Value>) -> Result<()> {
        let document = bson::to_document(&document)
            .context("💀 record could not be turned into a BSON document")?;
        self.client
            .database(&self.db)
            .collection::<Document>(collection)
            .insert_one(document)
            .await
            .with_context(|| format!("💀 insert into '{}.{}' failed", self.db, collection))?;
        Ok(())
    }
}
