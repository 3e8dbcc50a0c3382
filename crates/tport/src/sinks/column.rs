//! 🗄️ ColumnSink: a read-only window onto a wide table.

use anyhow::{Context, Result};
use futures::stream::BoxStream;

use crate::backends::{ColumnStore, Row};

#[derive(Debug)]
pub struct ColumnSink<C> {
    store: C,
}

impl<C: ColumnStore> ColumnSink<C> {
    pub fn new(store: C) -> Self {
        Self { store }
    }

    /// 🔭 Every row, in key order, pulled lazily.
    pub async fn scan(&self, table: &str) -> Result<BoxStream<'static, Result<Row>>> {
        self.store
            .scan(table)
            .await
            .with_context(|| format!("💀 could not scan '{}'", table))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::InMemoryColumnStore;
    use futures::TryStreamExt;
    use std::collections::BTreeMap;

    #[tokio::test]
    async fn the_one_where_rows_come_out_the_way_they_went_in() {
        let store = InMemoryColumnStore::new();
        let row = Row {
            key: "r1".to_string(),
            cells: BTreeMap::from([("d:text".to_string(), "hi".to_string())]),
        };
        store.put_rows("t", vec![row.clone()]).await;

        let rows: Vec<Row> = ColumnSink::new(store)
            .scan("t")
            .await
            .unwrap()
            .try_collect()
            .await
            .unwrap();
        assert_eq!(rows, vec![row]);
    }

    #[tokio::test]
    async fn the_one_where_the_table_name_ends_up_in_the_error() {
        let sink = ColumnSink::new(InMemoryColumnStore::new());
        let err = match sink.scan("missing").await {
            Ok(_) => panic!("scan of a missing table should fail"),
            Err(err) => err,
        };
        assert!(err.to_string().contains("missing"));
    }
}
