//! 📬 QueueSink: records become messages, topics become a sorted list.
//!
//! `consume` hands back the backend's stream as-is. Against a live broker that
//! stream never ends; the caller stops reading when it has seen enough (or
//! when someone hits Ctrl-C).

use anyhow::{Context, Result};
use futures::stream::BoxStream;
use futures::{Stream, StreamExt};
use tracing::info;

use crate::backends::{Message, MessageQueue};
use crate::common::{BatchStats, Record};

#[derive(Debug)]
pub struct QueueSink<Q> {
    queue: Q,
}

impl<Q: MessageQueue> QueueSink<Q> {
    pub fn new(queue: Q) -> Self {
        Self { queue }
    }

    pub async fn topics(&self) -> Result<Vec<String>> {
        let mut topics = self.queue.topics().await?;
        topics.sort();
        Ok(topics)
    }

    /// 📤 Each record serialized to compact JSON text, all of it in one produce call.
    pub async fn produce<S>(&self, topic: &str, records: S) -> Result<BatchStats>
    where
        S: Stream<Item = Result<Record>> + Send,
    {
        let messages = records
            .map(|record| {
                record.and_then(|r| {
                    serde_json::to_string(&r).context("💀 record refused to serialize")
                })
            })
            .boxed();
        let stats = self
            .queue
            .produce(topic, messages)
            .await
            .with_context(|| format!("💀 producing to '{}' failed", topic))?;
        info!("PRODUCE: {}", stats);
        Ok(stats)
    }

    /// 📥 The never-ending story.
    pub async fn consume(&self, topic: &str) -> Result<BoxStream<'static, Result<Message>>> {
        self.queue
            .consume(topic)
            .await
            .with_context(|| format!("💀 could not start consuming '{}'", topic))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::InMemoryQueue;
    use futures::{TryStreamExt, stream};
    use serde_json::json;

    #[tokio::test]
    async fn the_one_where_records_become_compact_json_messages() {
        let queue = InMemoryQueue::new();
        let sink = QueueSink::new(queue.clone());
        let stats = sink
            .produce("t", stream::iter(vec![Ok(json!({"a": 1})), Ok(json!("hi"))]))
            .await
            .unwrap();

        assert_eq!(stats, BatchStats::new(2, 0));
        assert_eq!(queue.messages("t").await, vec!["{\"a\":1}", "\"hi\""]);

        let consumed: Vec<Message> = sink.consume("t").await.unwrap().try_collect().await.unwrap();
        assert_eq!(consumed.len(), 2);
    }

    #[tokio::test]
    async fn the_one_where_topics_are_sorted_for_humans() {
        let queue = InMemoryQueue::new();
        let sink = QueueSink::new(queue);
        for topic in ["logs", "alerts", "metrics"] {
            sink.produce(topic, stream::iter(vec![Ok(json!({}))])).await.unwrap();
        }
        assert_eq!(sink.topics().await.unwrap(), vec!["alerts", "logs", "metrics"]);
    }
}
