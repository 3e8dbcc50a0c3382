//! 🚦 One function per command family: build the backend, hand it to a sink,
//! print what came back. Results go to stdout, chatter goes to stderr.

use std::path::{Path, PathBuf};
use std::pin::pin;

use anyhow::{Context, Result, bail};
use comfy_table::Table;
use futures::{Stream, StreamExt, TryStreamExt};
use serde::Serialize;
use serde_json::Value;
use tokio::io::AsyncBufRead;
use tracing::{info, warn};

use tport::app_config::{AppConfig, load_config};
use tport::backends::{
    BlobBackend, ColumnBackend, DocumentBackend, ElasticsearchBackend, HbaseBackend,
    InMemoryBlobStore, InMemoryColumnStore, InMemoryDocumentStore, InMemoryQueue,
    InMemorySearchIndex, IndexBackend, KafkaBackend, MongoBackend, QueueBackend, S3Backend,
};
use tport::input::InputLines;
use tport::progress::{listing_table, stats_table};
use tport::sinks::{
    ColumnSink, DocumentSink, IndexSink, IndexTarget, ObjectSink, QueueSink, UploadOptions,
};
use tport::{ParseOutcome, RecordParser};

use crate::cli::{Cli, ColumnCommand, Command, DocumentCommand, IndexCommand, ObjectCommand, QueueCommand};
use crate::prompt::Prompt;

pub async fn run(cli: Cli) -> Result<()> {
    let config = load_config(cli.config.as_deref(), cli.command.overrides())?;
    if cli.dry_run {
        warn!("🎭 dry run: every backend is in-memory, nothing leaves this process");
    }
    let dry_run = cli.dry_run;

    match cli.command {
        Command::Inspect { files } => {
            inspect(&config, &files, &mut Prompt::stdio()).await.map(|_| ())
        }
        Command::Index(command) => index(config, command, dry_run).await,
        Command::Objectstore(command) => objectstore(config, command, dry_run).await,
        Command::Docstore(command) => docstore(config, command, dry_run).await,
        Command::Columnstore(command) => columnstore(config, command, dry_run).await,
        Command::Queue(command) => queue(config, command, dry_run).await,
    }
}

// ============================================================
//  🔍 inspect
// ============================================================

/// 🔍 Every outcome, one pause each. Returns how many were shown.
///
/// The answers come in on stdin, so the records can't.
async fn inspect<R, W>(config: &AppConfig, files: &[PathBuf], prompt: &mut Prompt<R, W>) -> Result<usize>
where
    R: AsyncBufRead + Unpin,
    W: std::io::Write,
{
    if files.iter().any(|f| f.as_os_str() == "-") {
        bail!("💀 inspect reads its answers from stdin, so it can't read lines from there too. save them to a file first");
    }
    let input = InputLines::open(files, false).await?;
    let outcomes = RecordParser::new(config.parse.on_invalid)
        .outcomes(input.into_lines())
        .map(|outcome| outcome.and_then(render_outcome));
    paginate(outcomes, prompt).await
}

fn render_outcome(outcome: ParseOutcome) -> Result<String> {
    match outcome {
        ParseOutcome::Record(record) => pretty(&record),
        ParseOutcome::Invalid(invalid) => Ok(format!(
            "💀 line {} is not JSON ({})\n{}",
            invalid.position, invalid.reason, invalid.raw
        )),
    }
}

// ============================================================
//  📡 index
// ============================================================

fn index_backend(config: &AppConfig, dry_run: bool) -> Result<IndexBackend> {
    if dry_run {
        return Ok(IndexBackend::InMemory(InMemorySearchIndex::new()));
    }
    Ok(IndexBackend::Elasticsearch(ElasticsearchBackend::new(
        config.elasticsearch.clone(),
    )?))
}

async fn read_mapping(path: &Path) -> Result<Value> {
    let text = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("💀 could not read mapping '{}'", path.display()))?;
    serde_json::from_str(&text)
        .with_context(|| format!("💀 mapping '{}' is not valid JSON", path.display()))
}

async fn index(config: AppConfig, command: IndexCommand, dry_run: bool) -> Result<()> {
    let sink = IndexSink::new(index_backend(&config, dry_run)?, config.index.id.clone());

    match command {
        IndexCommand::Create { index, .. } => {
            let creation = sink.create(&index).await?;
            println!("{}: {:?}", index, creation);
        }
        IndexCommand::Map {
            index,
            doc_type,
            mapping,
            ..
        } => {
            let mapping = read_mapping(&mapping).await?;
            sink.map(&IndexTarget::new(index.as_str(), Some(doc_type)), &mapping)
                .await?;
            println!("{}: mapping applied", index);
        }
        IndexCommand::Write {
            index,
            doc_type,
            mapping,
            no_progress,
            files,
            ..
        } => {
            let target = IndexTarget::new(index.as_str(), Some(doc_type));
            if let Some(path) = mapping {
                let mapping = read_mapping(&path).await?;
                sink.map(&target, &mapping).await?;
            }
            let input = InputLines::open(&files, !no_progress).await?;
            let records = RecordParser::new(config.parse.on_invalid).records(input.into_lines());
            let stats = sink.index(records, &target, config.index.chunk_size).await?;
            println!("{}", stats_table("index", &index, &stats));
        }
    }
    Ok(())
}

// ============================================================
//  🪣 objectstore
// ============================================================

async fn blob_backend(config: &AppConfig, dry_run: bool) -> Result<BlobBackend> {
    if dry_run {
        return Ok(BlobBackend::InMemory(InMemoryBlobStore::new()));
    }
    Ok(BlobBackend::S3(S3Backend::new(config.s3.clone()).await?))
}

async fn objectstore(config: AppConfig, command: ObjectCommand, dry_run: bool) -> Result<()> {
    let sink = ObjectSink::new(blob_backend(&config, dry_run).await?);

    match command {
        ObjectCommand::List { .. } => {
            println!("{}", listing_table("bucket", &sink.list().await?));
        }
        ObjectCommand::Upload {
            bucket,
            replace,
            compress,
            files,
            ..
        } => {
            let options = UploadOptions {
                compress,
                replace_existing: replace,
            };
            let outcomes = sink.upload(&bucket, &files, options).await?;
            let mut table = Table::new();
            table.set_header(vec!["file", "object", "status"]);
            for outcome in &outcomes {
                table.add_row(vec![
                    outcome.file.display().to_string(),
                    format!("{}/{}", bucket, outcome.object_name),
                    outcome.status.to_string(),
                ]);
            }
            println!("{}", table);
        }
        ObjectCommand::Download { bucket, folder, .. } => {
            let written = sink.download(&bucket, &folder).await?;
            println!("{} objects from {} -> {}", written, bucket, folder.display());
        }
        ObjectCommand::Destroy { bucket, .. } => {
            let mut prompt = Prompt::stdio();
            destroy(&sink, &bucket, &mut prompt).await?;
        }
    }
    Ok(())
}

/// 💣 Nothing is deleted unless the human typed exactly `Y`.
async fn destroy<R, W>(
    sink: &ObjectSink<BlobBackend>,
    bucket: &str,
    prompt: &mut Prompt<R, W>,
) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: std::io::Write,
{
    let warning = format!("⚠️  You are about to DESTROY the entire {} bucket!!!", bucket);
    if !prompt.confirm(&warning).await? {
        println!("aborted");
        return Ok(());
    }
    let deleted = sink.destroy(bucket).await?;
    println!("💣 {} is gone ({} objects)", bucket, deleted);
    Ok(())
}

// ============================================================
//  🍃 docstore
// ============================================================

async fn document_backend(config: &AppConfig, dry_run: bool) -> Result<DocumentBackend> {
    if dry_run {
        return Ok(DocumentBackend::InMemory(InMemoryDocumentStore::new()));
    }
    Ok(DocumentBackend::Mongo(
        MongoBackend::new(config.mongo.clone()).await?,
    ))
}

async fn docstore(config: AppConfig, command: DocumentCommand, dry_run: bool) -> Result<()> {
    let sink = DocumentSink::new(document_backend(&config, dry_run).await?);

    match command {
        DocumentCommand::List { .. } => {
            println!("{}", listing_table("collection", &sink.list().await?));
        }
        DocumentCommand::Preview { collection, .. } => {
            page_through(sink.preview(&collection).await?, &mut Prompt::stdio()).await?;
        }
        DocumentCommand::Export {
            collection, output, ..
        } => {
            let exported = match output {
                Some(path) => {
                    let file = tokio::fs::File::create(&path)
                        .await
                        .with_context(|| format!("💀 could not create '{}'", path.display()))?;
                    sink.export(&collection, file).await?
                }
                None => sink.export(&collection, tokio::io::stdout()).await?,
            };
            info!("📤 {} documents exported", exported);
        }
        DocumentCommand::Add {
            collection, files, ..
        } => {
            let input = InputLines::open(&files, true).await?;
            let records = RecordParser::new(config.parse.on_invalid).records(input.into_lines());
            let stats = sink.add(&collection, records).await?;
            println!("{}", stats_table("add", &collection, &stats));
        }
    }
    Ok(())
}

// ============================================================
//  🗄️ columnstore
// ============================================================

async fn columnstore(config: AppConfig, command: ColumnCommand, dry_run: bool) -> Result<()> {
    let backend = if dry_run {
        ColumnBackend::InMemory(InMemoryColumnStore::new())
    } else {
        ColumnBackend::Hbase(HbaseBackend::new(config.hbase.clone())?)
    };
    let sink = ColumnSink::new(backend);

    match command {
        ColumnCommand::Scan { table, .. } => {
            page_through(sink.scan(&table).await?, &mut Prompt::stdio()).await?;
            Ok(())
        }
    }
}

// ============================================================
//  📬 queue
// ============================================================

async fn queue(config: AppConfig, command: QueueCommand, dry_run: bool) -> Result<()> {
    let backend = if dry_run {
        QueueBackend::InMemory(InMemoryQueue::new())
    } else {
        QueueBackend::Kafka(KafkaBackend::new(config.kafka.clone())?)
    };
    let sink = QueueSink::new(backend);

    match command {
        QueueCommand::Topics { .. } => {
            println!("{}", listing_table("topic", &sink.topics().await?));
        }
        QueueCommand::Produce { topic, files, .. } => {
            let input = InputLines::open(&files, true).await?;
            let records = RecordParser::new(config.parse.on_invalid).records(input.into_lines());
            let stats = sink.produce(&topic, records).await?;
            println!("{}", stats_table("produce", &topic, &stats));
        }
        QueueCommand::Consume { topic, .. } => {
            info!("📥 consuming {} (Ctrl-C to stop)", topic);
            let mut messages = sink.consume(&topic).await?;
            while let Some(message) = messages.try_next().await? {
                println!("{}:{} {}", message.partition, message.offset, message.value);
            }
        }
    }
    Ok(())
}

// ============================================================
//  🧰 helpers
// ============================================================

fn pretty<T: Serialize>(item: &T) -> Result<String> {
    serde_json::to_string_pretty(item).context("💀 could not render as JSON")
}

/// ⏯️ One item, one pause, until the items or the human run out.
async fn page_through<T, S, R, W>(items: S, prompt: &mut Prompt<R, W>) -> Result<usize>
where
    T: Serialize,
    S: Stream<Item = Result<T>>,
    R: AsyncBufRead + Unpin,
    W: std::io::Write,
{
    paginate(items.map(|item| item.and_then(|i| pretty(&i))), prompt).await
}

async fn paginate<S, R, W>(pages: S, prompt: &mut Prompt<R, W>) -> Result<usize>
where
    S: Stream<Item = Result<String>>,
    R: AsyncBufRead + Unpin,
    W: std::io::Write,
{
    let mut pages = pin!(pages);
    let mut shown = 0;
    while let Some(page) = pages.try_next().await? {
        println!("{}", page);
        shown += 1;
        if !prompt.keep_going().await? {
            break;
        }
    }
    Ok(shown)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tport::backends::{BlobStore, InMemoryBlobStore};

    fn sink_with_bucket() -> (InMemoryBlobStore, ObjectSink<BlobBackend>) {
        let store = InMemoryBlobStore::new();
        let sink = ObjectSink::new(BlobBackend::InMemory(store.clone()));
        (store, sink)
    }

    #[tokio::test]
    async fn the_one_where_a_lowercase_y_saves_the_bucket() {
        let (store, sink) = sink_with_bucket();
        store.insert("precious", "a.json", "{}").await;

        let mut prompt = Prompt::new(&b"y\n"[..], Vec::new());
        destroy(&sink, "precious", &mut prompt).await.unwrap();

        assert!(store.object("precious", "a.json").await.is_some());
        let shown = String::from_utf8(prompt.into_output()).unwrap();
        assert!(shown.contains("You are about to DESTROY the entire precious bucket!!!"));
    }

    #[tokio::test]
    async fn the_one_where_a_capital_y_means_it() {
        let (store, sink) = sink_with_bucket();
        store.insert("doomed", "a.json", "{}").await;
        store.insert("doomed", "b.json", "{}").await;

        let mut prompt = Prompt::new(&b"Y\n"[..], Vec::new());
        destroy(&sink, "doomed", &mut prompt).await.unwrap();

        assert!(store.object("doomed", "a.json").await.is_none());
        assert!(!store.list_buckets().await.unwrap().contains(&"doomed".to_string()));
    }

    fn answers(input: &'static str) -> Prompt<&'static [u8], Vec<u8>> {
        Prompt::new(input.as_bytes(), Vec::new())
    }

    fn three_pages() -> impl Stream<Item = Result<String>> {
        futures::stream::iter(vec![
            Ok("one".to_string()),
            Ok("two".to_string()),
            Ok("three".to_string()),
        ])
    }

    #[tokio::test]
    async fn the_one_where_n_stops_the_paging() {
        let mut prompt = answers("\nn\n");
        assert_eq!(paginate(three_pages(), &mut prompt).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn the_one_where_a_closed_stdin_stops_the_paging() {
        let mut prompt = answers("");
        assert_eq!(paginate(three_pages(), &mut prompt).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn the_one_where_enter_all_the_way_down_shows_everything() {
        let mut prompt = answers("\n\ny\n");
        assert_eq!(paginate(three_pages(), &mut prompt).await.unwrap(), 3);
        let asked = String::from_utf8(prompt.into_output()).unwrap();
        assert_eq!(asked.matches("--Continue? (Y/n)--").count(), 3);
    }

    #[tokio::test]
    async fn the_one_where_rows_page_through_as_json() {
        let rows = futures::stream::iter(vec![Ok(serde_json::json!({"k": 1})), Ok(serde_json::json!({"k": 2}))]);
        let mut prompt = answers("N\n");
        assert_eq!(page_through(rows, &mut prompt).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn the_one_where_inspect_shows_bad_lines_and_stops_on_n() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        std::io::Write::write_all(&mut file, b"{\"a\":1}\nnot json\n{\"b\":2}\n").unwrap();
        let config = AppConfig::default();

        let mut prompt = answers("\nn\n");
        let shown = inspect(&config, &[file.path().to_path_buf()], &mut prompt).await.unwrap();
        assert_eq!(shown, 2);

        let mut prompt = answers("\n\n\n");
        let shown = inspect(&config, &[file.path().to_path_buf()], &mut prompt).await.unwrap();
        assert_eq!(shown, 3);
    }

    #[tokio::test]
    async fn the_one_where_inspect_will_not_share_stdin() {
        let config = AppConfig::default();
        let mut prompt = answers("\n");
        let err = inspect(&config, &[PathBuf::from("-")], &mut prompt).await.unwrap_err();
        assert!(err.to_string().contains("stdin"));
        assert!(prompt.into_output().is_empty());
    }

    #[test]
    fn the_one_where_an_invalid_line_renders_with_its_position() {
        let rendered = render_outcome(ParseOutcome::Invalid(tport::InvalidLine {
            position: 4,
            raw: "nope".to_string(),
            reason: "expected value".to_string(),
        }))
        .unwrap();
        assert!(rendered.starts_with("💀 line 4 is not JSON (expected value)"));
        assert!(rendered.ends_with("\nnope"));
    }

    #[tokio::test]
    async fn the_one_where_a_mapping_file_must_be_json() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        std::io::Write::write_all(&mut file, b"{\"properties\":{\"text\":{\"type\":\"text\"}}}").unwrap();
        let mapping = read_mapping(file.path()).await.unwrap();
        assert_eq!(mapping["properties"]["text"]["type"], "text");

        let mut broken = tempfile::NamedTempFile::new().unwrap();
        std::io::Write::write_all(&mut broken, b"properties: nope").unwrap();
        let err = read_mapping(broken.path()).await.unwrap_err();
        assert!(err.to_string().contains("not valid JSON"));
    }
}
