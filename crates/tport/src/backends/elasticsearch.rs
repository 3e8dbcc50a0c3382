//! 📡 Elasticsearch over plain HTTP. reqwest in, JSON out, status codes all around.
//!
//! 🧠 Knowledge graph:
//! - `ElasticsearchConfig` lives here, next to the client that uses it; `AppConfig` embeds it
//! - `create_index` -> `PUT /{index}`, "already exists" is a success
//! - `put_mapping` -> `PUT /{index}/_mapping[/{type}]`
//! - `bulk` -> `POST /_bulk` with `ElasticsearchBulk` rendering the body, per-item status counted
//! - auth: API key wins over basic auth. Nobody gets both.

use std::collections::HashMap;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, trace, warn};

use crate::backends::{BulkWriter, IndexCreation};
use crate::common::BatchStats;
use crate::error::TransportError;
use crate::transforms::{BulkEntry, ElasticsearchBulk};

const BACKEND: &str = "elasticsearch";

/// 🔧 Where the cluster lives and how to knock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ElasticsearchConfig {
    pub host: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub api_key: Option<String>,
    /// put `_type` on the wire. Only for clusters that predate typeless APIs.
    pub send_doc_type: bool,
    pub connect_timeout_secs: u64,
    pub request_timeout_secs: u64,
}

impl Default for ElasticsearchConfig {
    fn default() -> Self {
        Self {
            host: "http://localhost:9200".to_string(),
            username: None,
            password: None,
            api_key: None,
            send_doc_type: false,
            connect_timeout_secs: 10,
            request_timeout_secs: 30,
        }
    }
}

#[derive(Debug, Deserialize)]
struct BulkResponse {
    #[serde(default)]
    errors: bool,
    #[serde(default)]
    items: Vec<HashMap<String, BulkItem>>,
}

#[derive(Debug, Deserialize)]
struct BulkItem {
    status: u16,
    #[serde(default)]
    error: Option<Value>,
}

/// 📡 One HTTP client, one cluster.
#[derive(Debug)]
pub struct ElasticsearchBackend {
    client: reqwest::Client,
    config: ElasticsearchConfig,
    renderer: ElasticsearchBulk,
}

impl ElasticsearchBackend {
    /// 🚀 Builds the client. Does not touch the network; the first real call does.
    pub fn new(config: ElasticsearchConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .context("💀 the HTTP client for Elasticsearch refused to be born")?;
        let renderer = ElasticsearchBulk {
            include_doc_type: config.send_doc_type,
        };
        Ok(Self {
            client,
            config,
            renderer,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.config.host.trim_end_matches('/'), path)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        if let Some(api_key) = &self.config.api_key {
            request.header("Authorization", format!("ApiKey {}", api_key))
        } else if let Some(username) = &self.config.username {
            request.basic_auth(username, self.config.password.as_ref())
        } else {
            request
        }
    }
}

fn is_already_exists(body: &str) -> bool {
    body.contains("resource_already_exists_exception")
        || body.contains("index_already_exists_exception")
}

#[async_trait]
impl BulkWriter for ElasticsearchBackend {
    async fn create_index(&self, index: &str) -> Result<IndexCreation> {
        let url = self.url(index);
        debug!("🏗️ PUT {}", url);
        let response = self
            .authorize(self.client.put(&url))
            .send()
            .await
            .with_context(|| format!("💀 could not reach Elasticsearch at {}", url))?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if status.is_success() {
            return Ok(IndexCreation::Created);
        }
        if status.as_u16() == 400 && is_already_exists(&body) {
            return Ok(IndexCreation::AlreadyExists);
        }
        Err(TransportError::BackendRejected {
            backend: BACKEND,
            status: status.as_u16(),
            body,
        })
        .with_context(|| format!("💀 creating index '{}' failed", index))
    }

    async fn put_mapping(
        &self,
        index: &str,
        doc_type: Option<&str>,
        mapping: &Value,
    ) -> Result<()> {
        let path = match doc_type.filter(|_| self.config.send_doc_type) {
            Some(doc_type) => format!("{}/_mapping/{}", index, doc_type),
            None => format!("{}/_mapping", index),
        };
        let url = self.url(&path);
        let body = serde_json::to_string(mapping).context("💀 mapping refused to serialize")?;
        debug!("🗺️ PUT {} ({} bytes)", url, body.len());

        let response = self
            .authorize(self.client.put(&url))
            .header("Content-Type", "application/json")
            .body(body)
            .send()
            .await
            .with_context(|| format!("💀 could not reach Elasticsearch at {}", url))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::BackendRejected {
                backend: BACKEND,
                status: status.as_u16(),
                body,
            })
            .with_context(|| format!("💀 applying the mapping to '{}' failed", index));
        }
        Ok(())
    }

    async fn bulk(&self, entries: &[BulkEntry]) -> Result<BatchStats> {
        if entries.is_empty() {
            return Ok(BatchStats::default());
        }
        let body = self.renderer.render_body(entries)?;
        let url = self.url("_bulk");
        trace!("📡 POST {} with {} docs, {} bytes", url, entries.len(), body.len());

        let response = self
            .authorize(self.client.post(&url))
            .header("Content-Type", "application/x-ndjson")
            .body(body)
            .send()
            .await
            .with_context(|| format!("💀 the bulk request never reached {}", url))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .context("💀 the bulk response body got lost on the way back")?;
        if !status.is_success() {
            return Err(TransportError::BackendRejected {
                backend: BACKEND,
                status: status.as_u16(),
                body: text,
            }
            .into());
        }

        let parsed: BulkResponse = serde_json::from_str(&text)
            .context("💀 Elasticsearch answered the bulk request with something that isn't a bulk response")?;

        let mut stats = BatchStats::default();
        let mut first_error_logged = false;
        for item in parsed.items.iter().flat_map(|op| op.values()) {
            if (200..300).contains(&item.status) {
                stats.record_success(1);
            } else {
                stats.record_failure(1);
                if !first_error_logged {
                    let reason = item
                        .error
                        .as_ref()
                        .map(|e| e.to_string())
                        .unwrap_or_default();
                    warn!("⚠️ bulk item rejected with status {}: {}", item.status, reason);
                    first_error_logged = true;
                }
            }
        }
        // -- documents the response forgot to mention didn't make it, as far as we can prove
        let unaccounted = (entries.len() as u64).saturating_sub(stats.total());
        if unaccounted > 0 {
            warn!(
                "⚠️ bulk response covered {} of {} docs; counting the other {} as failed",
                stats.total(),
                entries.len(),
                unaccounted
            );
            stats.record_failure(unaccounted);
        }
        if parsed.errors && stats.failed == 0 {
            debug!("bulk response flagged errors but every item status was 2xx");
        }
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn backend_for(server: &MockServer) -> ElasticsearchBackend {
        ElasticsearchBackend::new(ElasticsearchConfig {
            host: format!("{}/", server.uri()),
            ..ElasticsearchConfig::default()
        })
        .unwrap()
    }

    fn entry(id: &str, source: Value) -> BulkEntry {
        BulkEntry {
            index: "tweets".to_string(),
            doc_type: Some("tweet".to_string()),
            id: Some(id.to_string()),
            source,
        }
    }

    #[tokio::test]
    async fn the_one_where_creating_twice_is_not_a_crime() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/tweets"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"acknowledged":true}"#))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path("/tweets"))
            .respond_with(ResponseTemplate::new(400).set_body_string(
                r#"{"error":{"type":"resource_already_exists_exception"},"status":400}"#,
            ))
            .mount(&server)
            .await;

        let backend = backend_for(&server);
        assert_eq!(backend.create_index("tweets").await.unwrap(), IndexCreation::Created);
        assert_eq!(
            backend.create_index("tweets").await.unwrap(),
            IndexCreation::AlreadyExists
        );
    }

    #[tokio::test]
    async fn the_one_where_a_real_rejection_is_a_real_error() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/Bad-Name"))
            .respond_with(ResponseTemplate::new(400).set_body_string(
                r#"{"error":{"type":"invalid_index_name_exception"},"status":400}"#,
            ))
            .mount(&server)
            .await;

        let err = backend_for(&server).create_index("Bad-Name").await.unwrap_err();
        match err.downcast_ref::<TransportError>() {
            Some(TransportError::BackendRejected { status, body, .. }) => {
                assert_eq!(*status, 400);
                assert!(body.contains("invalid_index_name_exception"));
            }
            other => panic!("expected BackendRejected, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn the_one_where_bulk_counts_every_item() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/_bulk"))
            .and(header("Content-Type", "application/x-ndjson"))
            .and(body_string_contains(r#""_id":"2""#))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"took":3,"errors":true,"items":[
                    {"index":{"_id":"1","status":201}},
                    {"index":{"_id":"2","status":200}},
                    {"index":{"_id":"3","status":400,"error":{"type":"mapper_parsing_exception"}}}
                ]}"#,
            ))
            .expect(1)
            .mount(&server)
            .await;

        let stats = backend_for(&server)
            .bulk(&[
                entry("1", json!({"a": 1})),
                entry("2", json!({"a": 2})),
                entry("3", json!({"a": "three"})),
            ])
            .await
            .unwrap();
        assert_eq!(stats, BatchStats::new(2, 1));
    }

    #[tokio::test]
    async fn the_one_where_forgotten_items_count_as_failed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/_bulk"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"took":1,"errors":false,"items":[{"index":{"_id":"1","status":201}}]}"#,
            ))
            .mount(&server)
            .await;

        let stats = backend_for(&server)
            .bulk(&[
                entry("1", json!({"a": 1})),
                entry("2", json!({"a": 2})),
                entry("3", json!({"a": 3})),
            ])
            .await
            .unwrap();
        assert_eq!(stats.total(), 3);
        assert_eq!(stats, BatchStats::new(1, 2));
    }

    #[tokio::test]
    async fn the_one_where_the_whole_bulk_request_bounces() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/_bulk"))
            .respond_with(ResponseTemplate::new(413).set_body_string("too large"))
            .mount(&server)
            .await;

        let err = backend_for(&server)
            .bulk(&[entry("1", json!({}))])
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<TransportError>(),
            Some(TransportError::BackendRejected { status: 413, .. })
        ));
    }

    #[tokio::test]
    async fn the_one_where_an_empty_chunk_stays_home() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .expect(0)
            .mount(&server)
            .await;

        let stats = backend_for(&server).bulk(&[]).await.unwrap();
        assert_eq!(stats, BatchStats::default());
    }

    #[tokio::test]
    async fn the_one_where_the_api_key_gets_the_vip_line() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/secure"))
            .and(header("Authorization", "ApiKey c2VjcmV0"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let backend = ElasticsearchBackend::new(ElasticsearchConfig {
            host: server.uri(),
            username: Some("elastic".to_string()),
            password: Some("changeme".to_string()),
            api_key: Some("c2VjcmV0".to_string()),
            ..ElasticsearchConfig::default()
        })
        .unwrap();
        assert_eq!(backend.create_index("secure").await.unwrap(), IndexCreation::Created);
    }

    #[tokio::test]
    async fn the_one_where_typed_mappings_only_go_to_legacy_clusters() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/tweets/_mapping/tweet"))
            .and(body_string_contains("properties"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path("/tweets/_mapping"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let mapping = json!({"properties": {"text": {"type": "text"}}});
        let legacy = ElasticsearchBackend::new(ElasticsearchConfig {
            host: server.uri(),
            send_doc_type: true,
            ..ElasticsearchConfig::default()
        })
        .unwrap();
        legacy.put_mapping("tweets", Some("tweet"), &mapping).await.unwrap();
        backend_for(&server)
            .put_mapping("tweets", Some("tweet"), &mapping)
            .await
            .unwrap();
    }
}
