//! 📡 Elasticsearch bulk rendering: two lines per document, one newline too many is
//! never enough.
//!
//! ```text
//! {"index":{"_index":"tweets","_id":"42"}}
//! {"text":"hello"}
//! ```
//!
//! Rule 1: action line, then source line. Always.
//! Rule 2: the body ends with `\n`. The bulk API will 400 you otherwise, and it
//! will not be sorry about it.

use anyhow::{Context, Result};
use serde_json::{Map, Value, json};

use crate::common::Record;

/// 📨 One document on its way to `_bulk`.
#[derive(Debug, Clone, PartialEq)]
pub struct BulkEntry {
    pub index: String,
    /// only put on the wire for clusters old enough to still care about types
    pub doc_type: Option<String>,
    pub id: Option<String>,
    pub source: Record,
}

/// 📡 Formatter for the bulk wire format.
///
/// Modern clusters reject `_type` outright, so it only goes on the wire when
/// `include_doc_type` says the cluster is old enough to want it.
#[derive(Debug, Clone, Copy, Default)]
pub struct ElasticsearchBulk {
    pub include_doc_type: bool,
}

impl ElasticsearchBulk {
    /// 🔄 One entry -> `action\nsource`, no trailing newline.
    pub fn render_entry(&self, entry: &BulkEntry) -> Result<String> {
        let mut action = Map::new();
        action.insert("_index".to_string(), Value::String(entry.index.clone()));
        if let Some(doc_type) = entry.doc_type.as_ref().filter(|_| self.include_doc_type) {
            action.insert("_type".to_string(), Value::String(doc_type.clone()));
        }
        if let Some(id) = &entry.id {
            action.insert("_id".to_string(), Value::String(id.clone()));
        }

        let action_line = serde_json::to_string(&json!({ "index": action }))
            .context("💀 bulk action metadata refused to become JSON")?;
        let source_line = serde_json::to_string(&entry.source)
            .context("💀 record refused to be re-serialized for the bulk body")?;
        Ok(format!("{}\n{}", action_line, source_line))
    }

    /// 📦 A whole chunk, every entry newline-terminated, ready to POST.
    pub fn render_body(&self, entries: &[BulkEntry]) -> Result<String> {
        let mut body = String::new();
        for entry in entries {
            body.push_str(&self.render_entry(entry)?);
            body.push('\n');
        }
        Ok(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: Option<&str>, doc_type: Option<&str>, source: Value) -> BulkEntry {
        BulkEntry {
            index: "the-answer-index".to_string(),
            doc_type: doc_type.map(str::to_string),
            id: id.map(str::to_string),
            source,
        }
    }

    #[test]
    fn the_one_where_a_fully_loaded_entry_becomes_bulk_format() -> Result<()> {
        let the_loaded = entry(Some("doc-42"), Some("tweet"), json!({"meaning_of_life": 42}));

        let legacy = ElasticsearchBulk {
            include_doc_type: true,
        };
        let rendered = legacy.render_entry(&the_loaded)?;
        let lines: Vec<&str> = rendered.split('\n').collect();
        assert_eq!(lines.len(), 2, "two lines per doc. this is the way.");

        let action: Value = serde_json::from_str(lines[0])?;
        assert_eq!(action["index"]["_id"], "doc-42");
        assert_eq!(action["index"]["_index"], "the-answer-index");
        assert_eq!(action["index"]["_type"], "tweet");
        assert_eq!(lines[1], r#"{"meaning_of_life":42}"#);
        Ok(())
    }

    #[test]
    fn the_one_where_no_id_means_the_cluster_picks() -> Result<()> {
        let rendered = ElasticsearchBulk::default().render_entry(&entry(None, None, json!({})))?;
        let lines: Vec<&str> = rendered.split('\n').collect();

        let action: Value = serde_json::from_str(lines[0])?;
        assert_eq!(action, json!({"index": {"_index": "the-answer-index"}}));
        assert_eq!(lines[1], "{}");
        Ok(())
    }

    #[test]
    fn the_one_where_the_body_ends_in_a_newline_or_else() -> Result<()> {
        let entries = vec![
            entry(Some("1"), None, json!({"a": 1})),
            entry(Some("2"), None, json!({"b": 2})),
        ];
        let body = ElasticsearchBulk::default().render_body(&entries)?;

        assert!(body.ends_with('\n'));
        assert_eq!(body.lines().count(), 4);
        Ok(())
    }

    #[test]
    fn the_one_where_an_empty_chunk_renders_nothing() -> Result<()> {
        assert_eq!(ElasticsearchBulk::default().render_body(&[])?, "");
        Ok(())
    }

    #[test]
    fn the_one_where_modern_clusters_never_hear_about_types() -> Result<()> {
        let typed = entry(Some("7"), Some("tweet"), json!({"x": 1}));
        let rendered = ElasticsearchBulk::default().render_entry(&typed)?;
        let action: Value = serde_json::from_str(rendered.split('\n').next().unwrap_or(""))?;
        assert_eq!(action, json!({"index": {"_index": "the-answer-index", "_id": "7"}}));
        Ok(())
    }
}
