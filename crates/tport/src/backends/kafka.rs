//! 📬 Kafka through the Confluent REST Proxy (API v2), binary embedded format.
//!
//! Values travel base64-encoded inside JSON, so whatever text we produce comes
//! back byte-for-byte on the consuming side.
//!
//! 🧠 Knowledge graph:
//! - topics:   `GET /topics`
//! - produce:  `POST /topics/{topic}`, up to `max_records_per_request` records per call
//! - consume:  `POST /consumers/{group}` -> instance, `POST {base_uri}/subscription`,
//!   then `GET {base_uri}/records` forever. An empty poll sleeps a beat and tries again.

use std::collections::VecDeque;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use futures::stream::{self, BoxStream};
use futures::{StreamExt, TryStreamExt};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, trace, warn};

use crate::backends::{Message, MessageQueue};
use crate::common::BatchStats;
use crate::error::TransportError;

const BACKEND: &str = "kafka";
const V2_JSON: &str = "application/vnd.kafka.v2+json";
const BINARY_V2_JSON: &str = "application/vnd.kafka.binary.v2+json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KafkaConfig {
    /// REST proxy base URL
    pub broker: String,
    pub consumer_group: String,
    pub max_records_per_request: usize,
    pub poll_interval_ms: u64,
    pub request_timeout_secs: u64,
}

impl Default for KafkaConfig {
    fn default() -> Self {
        Self {
            broker: "http://localhost:8082".to_string(),
            consumer_group: "tport".to_string(),
            max_records_per_request: 500,
            poll_interval_ms: 500,
            request_timeout_secs: 30,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ProduceResponse {
    #[serde(default)]
    offsets: Vec<ProducedOffset>,
}

#[derive(Debug, Deserialize)]
struct ProducedOffset {
    #[serde(default)]
    error_code: Option<i64>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ConsumerInstance {
    base_uri: String,
}

#[derive(Debug, Deserialize)]
struct ConsumedRecord {
    #[serde(default)]
    value: Option<String>,
    partition: i64,
    offset: i64,
}

async fn rejected(response: reqwest::Response) -> anyhow::Error {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    TransportError::BackendRejected {
        backend: BACKEND,
        status,
        body,
    }
    .into()
}

#[derive(Debug, Clone)]
pub struct KafkaBackend {
    client: reqwest::Client,
    config: KafkaConfig,
}

impl KafkaBackend {
    pub fn new(config: KafkaConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .context("💀 the HTTP client for the Kafka REST proxy refused to be born")?;
        Ok(Self { client, config })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.config.broker.trim_end_matches('/'), path)
    }

    async fn send_batch(&self, topic: &str, batch: &[String]) -> Result<BatchStats> {
        let records: Vec<_> = batch
            .iter()
            .map(|value| json!({ "value": STANDARD.encode(value) }))
            .collect();
        let url = self.url(&format!("topics/{}", topic));
        trace!("📬 POST {} with {} records", url, batch.len());

        let response = self
            .client
            .post(&url)
            .header("Content-Type", BINARY_V2_JSON)
            .header("Accept", V2_JSON)
            .body(json!({ "records": records }).to_string())
            .send()
            .await
            .with_context(|| format!("💀 could not reach the Kafka REST proxy at {}", url))?;
        if !response.status().is_success() {
            return Err(rejected(response).await)
                .with_context(|| format!("💀 producing to '{}' failed", topic));
        }

        let text = response.text().await.context("💀 produce response got lost")?;
        let parsed: ProduceResponse =
            serde_json::from_str(&text).context("💀 produce response was not what the proxy promised")?;
        let mut stats = BatchStats::default();
        for offset in &parsed.offsets {
            if offset.error_code.is_some() {
                stats.record_failure(1);
                warn!(
                    "⚠️ record rejected by '{}': {}",
                    topic,
                    offset.error.as_deref().unwrap_or("no reason given")
                );
            } else {
                stats.record_success(1);
            }
        }
        // -- the proxy answered 2xx but listed fewer offsets than we sent. count the gap as lost.
        let unaccounted = (batch.len() as u64).saturating_sub(stats.total());
        stats.record_failure(unaccounted);
        Ok(stats)
    }

    async fn create_consumer(&self, topic: &str) -> Result<String> {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0);
        let name = format!("tport-{}-{}", std::process::id(), nanos);
        let url = self.url(&format!("consumers/{}", self.config.consumer_group));
        debug!("📬 creating consumer {} at {}", name, url);

        let response = self
            .client
            .post(&url)
            .header("Content-Type", V2_JSON)
            .body(
                json!({
                    "name": name,
                    "format": "binary",
                    "auto.offset.reset": "earliest",
                })
                .to_string(),
            )
            .send()
            .await
            .with_context(|| format!("💀 could not reach the Kafka REST proxy at {}", url))?;
        if !response.status().is_success() {
            return Err(rejected(response).await).context("💀 creating a consumer instance failed");
        }
        let text = response.text().await.context("💀 consumer response got lost")?;
        let instance: ConsumerInstance =
            serde_json::from_str(&text).context("💀 consumer response had no base_uri")?;

        let subscription = format!("{}/subscription", instance.base_uri.trim_end_matches('/'));
        let response = self
            .client
            .post(&subscription)
            .header("Content-Type", V2_JSON)
            .body(json!({ "topics": [topic] }).to_string())
            .send()
            .await
            .with_context(|| format!("💀 could not subscribe at {}", subscription))?;
        if !response.status().is_success() {
            return Err(rejected(response).await)
                .with_context(|| format!("💀 subscribing to '{}' failed", topic));
        }
        Ok(instance.base_uri)
    }
}

/// 🔁 Poll state for one consumer instance.
struct PollState {
    client: reqwest::Client,
    records_url: String,
    poll_interval: Duration,
    buffered: VecDeque<Message>,
}

impl PollState {
    async fn next_message(&mut self) -> Result<Message> {
        loop {
            if let Some(message) = self.buffered.pop_front() {
                return Ok(message);
            }
            let response = self
                .client
                .get(&self.records_url)
                .header("Accept", BINARY_V2_JSON)
                .send()
                .await
                .with_context(|| format!("💀 polling {} failed", self.records_url))?;
            if !response.status().is_success() {
                return Err(rejected(response).await);
            }
            let text = response.text().await.context("💀 poll response got lost")?;
            let records: Vec<ConsumedRecord> =
                serde_json::from_str(&text).context("💀 poll response was not a list of records")?;
            if records.is_empty() {
                tokio::time::sleep(self.poll_interval).await;
                continue;
            }
            for record in records {
                let value = match record.value {
                    Some(encoded) => {
                        let bytes = STANDARD
                            .decode(&encoded)
                            .context("💀 consumed value was not base64")?;
                        String::from_utf8_lossy(&bytes).into_owned()
                    }
                    None => String::new(),
                };
                self.buffered.push_back(Message {
                    partition: record.partition,
                    offset: record.offset,
                    value,
                });
            }
        }
    }
}

#[async_trait]
impl MessageQueue for KafkaBackend {
    async fn topics(&self) -> Result<Vec<String>> {
        let url = self.url("topics");
        let response = self
            .client
            .get(&url)
            .header("Accept", V2_JSON)
            .send()
            .await
            .with_context(|| format!("💀 could not reach the Kafka REST proxy at {}", url))?;
        if !response.status().is_success() {
            return Err(rejected(response).await).context("💀 listing topics failed");
        }
        let text = response.text().await.context("💀 topic list got lost")?;
        serde_json::from_str(&text).context("💀 topic list was not a list of names")
    }

    async fn produce(
        &self,
        topic: &str,
        messages: BoxStream<'_, Result<String>>,
    ) -> Result<BatchStats> {
        let per_request = self.config.max_records_per_request.max(1);
        let mut messages = messages;
        let mut stats = BatchStats::default();
        let mut batch = Vec::with_capacity(per_request);

        while let Some(message) = messages.try_next().await? {
            batch.push(message);
            if batch.len() >= per_request {
                stats.absorb(self.send_batch(topic, &batch).await?);
                batch.clear();
            }
        }
        if !batch.is_empty() {
            stats.absorb(self.send_batch(topic, &batch).await?);
        }
        Ok(stats)
    }

    async fn consume(&self, topic: &str) -> Result<BoxStream<'static, Result<Message>>> {
        let base_uri = self.create_consumer(topic).await?;
        let state = PollState {
            client: self.client.clone(),
            records_url: format!("{}/records", base_uri.trim_end_matches('/')),
            poll_interval: Duration::from_millis(self.config.poll_interval_ms),
            buffered: VecDeque::new(),
        };
        // -- never returns None. the consumer stops when the stream is dropped.
        Ok(stream::try_unfold(state, |mut state| async move {
            let message = state.next_message().await?;
            Ok(Some((message, state)))
        })
        .boxed())
    }
}
