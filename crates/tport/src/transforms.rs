//! 🔄 Transforms: the small reshaping jobs between "a record" and "what the backend wants".
//!
//! ```text
//!   Record ──▶ IdRule::extract ──▶ BulkEntry ──▶ ElasticsearchBulk ──▶ NDJSON body
//! ```
//!
//! 🧠 Knowledge graph:
//! - `IdRule` digs an identity out of a record (field + optional split), configurable
//! - `elasticsearch` renders bulk entries into the two-lines-per-doc wire format
//! - compression lives in `crate::compression`, it works on files, not records

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::common::Record;

pub mod elasticsearch;

pub use elasticsearch::{BulkEntry, ElasticsearchBulk};

/// 🪪 How to find a record's identity.
///
/// ```toml
/// [index.id]
/// field = "id"
/// delimiter = ":"
/// component = 2      # "tweet:en:42" -> "42"
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IdRule {
    pub field: String,
    pub delimiter: Option<String>,
    pub component: Option<usize>,
}

impl Default for IdRule {
    fn default() -> Self {
        Self {
            field: "id".to_string(),
            delimiter: None,
            component: None,
        }
    }
}

impl IdRule {
    /// 🎯 The record's identity, or `None` to let the backend pick one.
    ///
    /// Strings are used as-is, numbers are stringified, anything else has no id.
    /// A missing split component falls back to the whole value.
    pub fn extract(&self, record: &Record) -> Option<String> {
        let raw = match record.get(&self.field)? {
            Value::String(s) => s.clone(),
            Value::Number(n) => n.to_string(),
            _ => return None,
        };

        let Some(delimiter) = self.delimiter.as_deref().filter(|d| !d.is_empty()) else {
            return Some(raw);
        };
        let component = self.component.unwrap_or(0);
        match raw.split(delimiter).nth(component) {
            Some(part) => Some(part.to_string()),
            None => {
                debug!(
                    "id '{}' has no component {} when split on '{}'; using it whole",
                    raw, component, delimiter
                );
                Some(raw)
            }
        }
    }
}
