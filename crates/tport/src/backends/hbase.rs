//! 🗄️ HBase through its REST gateway (a.k.a. Stargate).
//!
//! A scan is a little conversation with server-side state:
//!
//! ```text
//!   PUT    /{table}/scanner   {"batch": N}   -> 201, Location: <scanner url>
//!   GET    <scanner url>                     -> 200 rows ... until 204 No Content
//!   DELETE <scanner url>                     -> scanner gone
//! ```
//!
//! Everything the gateway hands back (row keys, column names, values) is
//! base64. We decode it, and anything that isn't UTF-8 gets the lossy treatment.

use std::collections::{BTreeMap, VecDeque};
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use futures::StreamExt;
use futures::stream::{self, BoxStream};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, trace, warn};

use crate::backends::{ColumnStore, Row};
use crate::error::TransportError;

const BACKEND: &str = "hbase";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HbaseConfig {
    pub host: String,
    /// rows per scanner round-trip
    pub scanner_batch: u32,
    pub request_timeout_secs: u64,
}

impl Default for HbaseConfig {
    fn default() -> Self {
        Self {
            host: "http://localhost:8080".to_string(),
            scanner_batch: 100,
            request_timeout_secs: 30,
        }
    }
}

#[derive(Debug, Deserialize)]
struct CellSet {
    #[serde(rename = "Row", default)]
    rows: Vec<WireRow>,
}

#[derive(Debug, Deserialize)]
struct WireRow {
    key: String,
    #[serde(rename = "Cell", default)]
    cells: Vec<WireCell>,
}

#[derive(Debug, Deserialize)]
struct WireCell {
    column: String,
    #[serde(rename = "$", default)]
    value: String,
}

fn decode(encoded: &str) -> Result<String> {
    let bytes = STANDARD
        .decode(encoded)
        .with_context(|| format!("💀 '{}' is not base64, and HBase REST promised it would be", encoded))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

fn decode_row(row: WireRow) -> Result<Row> {
    let key = decode(&row.key)?;
    let mut cells = BTreeMap::new();
    for cell in row.cells {
        cells.insert(decode(&cell.column)?, decode(&cell.value)?);
    }
    Ok(Row { key, cells })
}

#[derive(Debug, Clone)]
pub struct HbaseBackend {
    client: reqwest::Client,
    config: HbaseConfig,
}

impl HbaseBackend {
    pub fn new(config: HbaseConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .context("💀 the HTTP client for HBase REST refused to be born")?;
        Ok(Self { client, config })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.config.host.trim_end_matches('/'), path)
    }

    /// 📍 The gateway usually answers with an absolute URL. Usually.
    fn resolve_location(&self, location: &str) -> String {
        if location.starts_with("http://") || location.starts_with("https://") {
            location.to_string()
        } else {
            self.url(location.trim_start_matches('/'))
        }
    }

    async fn open_scanner(&self, table: &str) -> Result<String> {
        let url = self.url(&format!("{}/scanner", table));
        debug!("🗄️ opening scanner at {}", url);
        let response = self
            .client
            .put(&url)
            .header("Content-Type", "application/json")
            .header("Accept", "application/json")
            .body(json!({ "batch": self.config.scanner_batch }).to_string())
            .send()
            .await
            .with_context(|| format!("💀 could not reach HBase REST at {}", url))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::BackendRejected {
                backend: BACKEND,
                status: status.as_u16(),
                body,
            })
            .with_context(|| format!("💀 opening a scanner on '{}' failed", table));
        }
        let location = response
            .headers()
            .get("Location")
            .and_then(|v| v.to_str().ok())
            .with_context(|| format!("💀 HBase opened a scanner on '{}' but didn't say where", table))?;
        Ok(self.resolve_location(location))
    }
}

/// 🔄 Pull state for one scanner. Rows are buffered a batch at a time.
struct ScanState {
    client: reqwest::Client,
    location: String,
    buffered: VecDeque<Row>,
    exhausted: bool,
}

impl ScanState {
    async fn next_row(&mut self) -> Result<Option<Row>> {
        loop {
            if let Some(row) = self.buffered.pop_front() {
                return Ok(Some(row));
            }
            if self.exhausted {
                return Ok(None);
            }
            self.fetch_batch().await?;
        }
    }

    async fn fetch_batch(&mut self) -> Result<()> {
        let response = self
            .client
            .get(&self.location)
            .header("Accept", "application/json")
            .send()
            .await
            .with_context(|| format!("💀 scanner {} stopped answering", self.location))?;

        let status = response.status();
        if status.as_u16() == 204 {
            self.exhausted = true;
            self.close().await;
            return Ok(());
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::BackendRejected {
                backend: BACKEND,
                status: status.as_u16(),
                body,
            }
            .into());
        }

        let text = response.text().await.context("💀 scanner batch got lost on the way back")?;
        let cell_set: CellSet =
            serde_json::from_str(&text).context("💀 scanner batch was not a CellSet")?;
        trace!("🗄️ scanner batch with {} rows", cell_set.rows.len());
        if cell_set.rows.is_empty() {
            self.exhausted = true;
            self.close().await;
        }
        for row in cell_set.rows {
            self.buffered.push_back(decode_row(row)?);
        }
        Ok(())
    }

    /// 🧹 Best effort. The gateway expires abandoned scanners on its own.
    async fn close(&self) {
        if let Err(err) = self.client.delete(&self.location).send().await {
            warn!("⚠️ could not delete scanner {}: {}", self.location, err);
        }
    }
}

#[async_trait]
impl ColumnStore for HbaseBackend {
    async fn scan(&self, table: &str) -> Result<BoxStream<'static, Result<Row>>> {
        let location = self.open_scanner(table).await?;
        let state = ScanState {
            client: self.client.clone(),
            location,
            buffered: VecDeque::new(),
            exhausted: false,
        };
        Ok(stream::try_unfold(state, |mut state| async move {
            Ok(state.next_row().await?.map(|row| (row, state)))
        })
        .boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::TryStreamExt;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn b64(s: &str) -> String {
        STANDARD.encode(s)
    }

    #[tokio::test]
    async fn the_one_where_the_scanner_walks_the_whole_table() {
        let server = MockServer::start().await;
        let scanner = format!("{}/tweets/scanner/1234", server.uri());

        Mock::given(method("PUT"))
            .and(path("/tweets/scanner"))
            .and(body_string_contains("\"batch\":2"))
            .respond_with(ResponseTemplate::new(201).insert_header("Location", scanner.as_str()))
            .expect(1)
            .mount(&server)
            .await;
        let batch = json!({
            "Row": [
                {"key": b64("row1"), "Cell": [
                    {"column": b64("d:text"), "timestamp": 1, "$": b64("hello")},
                    {"column": b64("d:lang"), "timestamp": 1, "$": b64("en")}
                ]},
                {"key": b64("row2"), "Cell": [
                    {"column": b64("d:text"), "timestamp": 1, "$": b64("bye")}
                ]}
            ]
        });
        Mock::given(method("GET"))
            .and(path("/tweets/scanner/1234"))
            .respond_with(ResponseTemplate::new(200).set_body_string(batch.to_string()))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/tweets/scanner/1234"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/tweets/scanner/1234"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let backend = HbaseBackend::new(HbaseConfig {
            host: server.uri(),
            scanner_batch: 2,
            ..HbaseConfig::default()
        })
        .unwrap();
        let rows: Vec<Row> = backend.scan("tweets").await.unwrap().try_collect().await.unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].key, "row1");
        assert_eq!(rows[0].cells.get("d:text").map(String::as_str), Some("hello"));
        assert_eq!(rows[0].cells.get("d:lang").map(String::as_str), Some("en"));
        assert_eq!(rows[1].key, "row2");
    }

    #[tokio::test]
    async fn the_one_where_the_table_does_not_exist() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/ghosts/scanner"))
            .respond_with(ResponseTemplate::new(404).set_body_string("Not found"))
            .mount(&server)
            .await;

        let backend = HbaseBackend::new(HbaseConfig {
            host: server.uri(),
            ..HbaseConfig::default()
        })
        .unwrap();
        let err = match backend.scan("ghosts").await {
            Ok(_) => panic!("a missing table should not scan"),
            Err(err) => err,
        };
        assert!(matches!(
            err.downcast_ref::<TransportError>(),
            Some(TransportError::BackendRejected { status: 404, .. })
        ));
    }

    #[test]
    fn the_one_where_relative_locations_get_a_host() {
        let backend = HbaseBackend::new(HbaseConfig {
            host: "http://hbase:8080/".to_string(),
            ..HbaseConfig::default()
        })
        .unwrap();
        assert_eq!(
            backend.resolve_location("/t/scanner/9"),
            "http://hbase:8080/t/scanner/9"
        );
        assert_eq!(
            backend.resolve_location("http://elsewhere/t/scanner/9"),
            "http://elsewhere/t/scanner/9"
        );
    }

    #[test]
    fn the_one_where_bad_base64_is_called_out() {
        assert!(decode("!!!not base64!!!").is_err());
        assert_eq!(decode(&b64("plain")).unwrap(), "plain");
    }
}
