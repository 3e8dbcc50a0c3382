//! 🎛️ The command surface. clap does the parsing; each flag that touches a
//! backend setting becomes a `ConfigOverrides` entry so it lands on top of
//! the config layers instead of beside them.

use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand};
use tport::InvalidLinePolicy;
use tport::app_config::ConfigOverrides;

#[derive(Debug, Parser)]
#[command(
    name = "tport",
    version,
    about = "🚚 Move line-delimited JSON into search indices, buckets, document stores and queues"
)]
pub struct Cli {
    /// TOML config file (default: ~/.tport.toml when present)
    #[arg(long, global = true, env = "TPORT_CONFIG")]
    pub config: Option<PathBuf>,

    /// -v for debug, -vv for trace. RUST_LOG wins over both.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Use in-memory backends: nothing leaves the process.
    #[arg(long, global = true)]
    pub dry_run: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Pretty-print each line's parse outcome, pausing between them
    Inspect {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Search index (Elasticsearch)
    #[command(subcommand, visible_alias = "es")]
    Index(IndexCommand),
    /// Object storage (S3)
    #[command(subcommand, visible_alias = "s3")]
    Objectstore(ObjectCommand),
    /// Document store (MongoDB)
    #[command(subcommand, visible_alias = "mongo")]
    Docstore(DocumentCommand),
    /// Column store (HBase REST)
    #[command(subcommand, visible_alias = "hbase")]
    Columnstore(ColumnCommand),
    /// Message queue (Kafka REST proxy)
    #[command(subcommand, visible_alias = "kafka")]
    Queue(QueueCommand),
}

#[derive(Debug, Clone, Default, Args)]
pub struct EsArgs {
    /// Elasticsearch URL
    #[arg(long)]
    pub host: Option<String>,
}

#[derive(Debug, Clone, Default, Args)]
pub struct IdArgs {
    /// record field holding the document id
    #[arg(long)]
    pub id_field: Option<String>,
    /// split the id on this and keep one piece
    #[arg(long)]
    pub id_delimiter: Option<String>,
    /// which piece to keep (0-based)
    #[arg(long)]
    pub id_component: Option<usize>,
}

#[derive(Debug, Clone, Default, Args)]
pub struct ParseArgs {
    /// Keep going past invalid lines. Bare flag = silent; or pick warn|silent|abort.
    #[arg(
        long,
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = "silent",
        value_name = "POLICY"
    )]
    pub ignore_errors: Option<InvalidLinePolicy>,
}

#[derive(Debug, Subcommand)]
pub enum IndexCommand {
    /// Create the index if it doesn't exist
    Create {
        #[arg(long)]
        index: String,
        #[command(flatten)]
        es: EsArgs,
    },
    /// Apply a mapping (creates the index first if needed)
    Map {
        #[arg(long)]
        index: String,
        #[arg(long)]
        doc_type: String,
        /// path to a JSON mapping definition
        #[arg(long)]
        mapping: PathBuf,
        #[command(flatten)]
        es: EsArgs,
    },
    /// Bulk-index JSON lines
    Write {
        #[arg(long)]
        index: String,
        #[arg(long)]
        doc_type: String,
        #[arg(long)]
        chunk_size: Option<usize>,
        /// apply this mapping before writing
        #[arg(long)]
        mapping: Option<PathBuf>,
        #[command(flatten)]
        parse: ParseArgs,
        #[command(flatten)]
        id: IdArgs,
        #[command(flatten)]
        es: EsArgs,
        /// don't draw the progress bar
        #[arg(long)]
        no_progress: bool,
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
}

#[derive(Debug, Clone, Default, Args)]
pub struct S3Args {
    /// custom S3-compatible endpoint
    #[arg(long)]
    pub endpoint: Option<String>,
    #[arg(long)]
    pub region: Option<String>,
}

#[derive(Debug, Subcommand)]
pub enum ObjectCommand {
    /// List buckets
    List {
        #[command(flatten)]
        s3: S3Args,
    },
    /// Upload files, creating the bucket if needed
    Upload {
        bucket: String,
        /// overwrite objects that already exist
        #[arg(long)]
        replace: bool,
        /// gzip each file first; objects get a .gz suffix
        #[arg(long)]
        compress: bool,
        #[arg(required = true)]
        files: Vec<PathBuf>,
        #[command(flatten)]
        s3: S3Args,
    },
    /// Download every object into a folder
    Download {
        bucket: String,
        folder: PathBuf,
        #[command(flatten)]
        s3: S3Args,
    },
    /// Delete every object and then the bucket (asks first)
    Destroy {
        bucket: String,
        #[command(flatten)]
        s3: S3Args,
    },
}

#[derive(Debug, Clone, Default, Args)]
pub struct MongoArgs {
    /// host or mongodb:// URI
    #[arg(long)]
    pub host: Option<String>,
    #[arg(long)]
    pub db: Option<String>,
}

#[derive(Debug, Subcommand)]
pub enum DocumentCommand {
    /// List collections
    List {
        #[command(flatten)]
        mongo: MongoArgs,
    },
    /// Page through a collection
    Preview {
        #[arg(long)]
        collection: String,
        #[command(flatten)]
        mongo: MongoArgs,
    },
    /// Dump a collection as JSON lines (to FILE, or stdout)
    Export {
        #[arg(long)]
        collection: String,
        output: Option<PathBuf>,
        #[command(flatten)]
        mongo: MongoArgs,
    },
    /// Insert JSON lines, one document each
    Add {
        #[arg(long)]
        collection: String,
        #[command(flatten)]
        parse: ParseArgs,
        #[arg(required = true)]
        files: Vec<PathBuf>,
        #[command(flatten)]
        mongo: MongoArgs,
    },
}

#[derive(Debug, Subcommand)]
pub enum ColumnCommand {
    /// Page through a table
    Scan {
        #[arg(long)]
        table: String,
        /// HBase REST URL
        #[arg(long)]
        host: Option<String>,
    },
}

#[derive(Debug, Clone, Default, Args)]
pub struct KafkaArgs {
    /// Kafka REST proxy URL
    #[arg(long)]
    pub broker: Option<String>,
}

#[derive(Debug, Subcommand)]
pub enum QueueCommand {
    /// List topics
    Topics {
        #[command(flatten)]
        kafka: KafkaArgs,
    },
    /// Send each JSON line as one message
    Produce {
        #[arg(long)]
        topic: String,
        #[command(flatten)]
        parse: ParseArgs,
        #[arg(required = true)]
        files: Vec<PathBuf>,
        #[command(flatten)]
        kafka: KafkaArgs,
    },
    /// Print messages until interrupted
    Consume {
        #[arg(long)]
        topic: String,
        #[command(flatten)]
        kafka: KafkaArgs,
    },
}

impl ParseArgs {
    fn apply(&self, overrides: ConfigOverrides) -> ConfigOverrides {
        overrides.set("parse.on_invalid", self.ignore_errors)
    }
}

impl Command {
    /// 🎛️ Flags -> the top config layer.
    pub fn overrides(&self) -> ConfigOverrides {
        let overrides = ConfigOverrides::new();
        match self {
            Command::Inspect { .. } => overrides,
            Command::Index(IndexCommand::Create { es, .. })
            | Command::Index(IndexCommand::Map { es, .. }) => {
                overrides.set("elasticsearch.host", es.host.clone())
            }
            Command::Index(IndexCommand::Write {
                chunk_size,
                parse,
                id,
                es,
                ..
            }) => parse
                .apply(overrides)
                .set("elasticsearch.host", es.host.clone())
                .set("index.chunk_size", *chunk_size)
                .set("index.id.field", id.id_field.clone())
                .set("index.id.delimiter", id.id_delimiter.clone())
                .set("index.id.component", id.id_component),
            Command::Objectstore(
                ObjectCommand::List { s3 }
                | ObjectCommand::Upload { s3, .. }
                | ObjectCommand::Download { s3, .. }
                | ObjectCommand::Destroy { s3, .. },
            ) => overrides
                .set("s3.endpoint", s3.endpoint.clone())
                .set("s3.region", s3.region.clone()),
            Command::Docstore(command) => {
                let (mongo, parse) = match command {
                    DocumentCommand::List { mongo }
                    | DocumentCommand::Preview { mongo, .. }
                    | DocumentCommand::Export { mongo, .. } => (mongo, None),
                    DocumentCommand::Add { mongo, parse, .. } => (mongo, Some(parse)),
                };
                let overrides = match parse {
                    Some(parse) => parse.apply(overrides),
                    None => overrides,
                };
                overrides
                    .set("mongo.host", mongo.host.clone())
                    .set("mongo.db", mongo.db.clone())
            }
            Command::Columnstore(ColumnCommand::Scan { host, .. }) => {
                overrides.set("hbase.host", host.clone())
            }
            Command::Queue(command) => {
                let (kafka, parse) = match command {
                    QueueCommand::Topics { kafka } | QueueCommand::Consume { kafka, .. } => {
                        (kafka, None)
                    }
                    QueueCommand::Produce { kafka, parse, .. } => (kafka, Some(parse)),
                };
                let overrides = match parse {
                    Some(parse) => parse.apply(overrides),
                    None => overrides,
                };
                overrides.set("kafka.broker", kafka.broker.clone())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tport::app_config::load_config;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(args).unwrap()
    }

    fn empty_config() -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all(b"").unwrap();
        file
    }

    #[test]
    fn the_one_where_the_bare_ignore_flag_means_silent() {
        let cli = parse(&["tport", "index", "write", "--index", "t", "--doc-type", "d", "--ignore-errors", "a.json"]);
        match cli.command {
            Command::Index(IndexCommand::Write { parse, files, .. }) => {
                assert_eq!(parse.ignore_errors, Some(InvalidLinePolicy::Silent));
                assert_eq!(files, vec![PathBuf::from("a.json")]);
            }
            other => panic!("parsed into the wrong command: {:?}", other),
        }
    }

    #[test]
    fn the_one_where_a_policy_can_be_named() {
        let cli = parse(&["tport", "es", "write", "--index", "t", "--doc-type", "d", "--ignore-errors=abort", "a.json", "b.json"]);
        match cli.command {
            Command::Index(IndexCommand::Write { parse, files, .. }) => {
                assert_eq!(parse.ignore_errors, Some(InvalidLinePolicy::Abort));
                assert_eq!(files.len(), 2);
            }
            other => panic!("parsed into the wrong command: {:?}", other),
        }
        assert!(
            Cli::try_parse_from(["tport", "es", "write", "--index", "t", "--doc-type", "d", "--ignore-errors=maybe", "a.json"])
                .is_err()
        );
    }

    #[test]
    fn the_one_where_the_aliases_answer_to_their_nicknames() {
        assert!(matches!(
            parse(&["tport", "s3", "destroy", "doomed"]).command,
            Command::Objectstore(ObjectCommand::Destroy { .. })
        ));
        assert!(matches!(
            parse(&["tport", "mongo", "list"]).command,
            Command::Docstore(DocumentCommand::List { .. })
        ));
        assert!(matches!(
            parse(&["tport", "hbase", "scan", "--table", "t"]).command,
            Command::Columnstore(ColumnCommand::Scan { .. })
        ));
        assert!(matches!(
            parse(&["tport", "kafka", "consume", "--topic", "t"]).command,
            Command::Queue(QueueCommand::Consume { .. })
        ));
    }

    #[test]
    fn the_one_where_writing_nothing_is_not_allowed() {
        assert!(Cli::try_parse_from(["tport", "index", "write", "--index", "t", "--doc-type", "d"]).is_err());
        assert!(Cli::try_parse_from(["tport", "inspect"]).is_err());
        assert!(Cli::try_parse_from(["tport", "s3", "upload", "b"]).is_err());
    }

    #[test]
    fn the_one_where_global_flags_go_anywhere() {
        let cli = parse(&["tport", "queue", "topics", "-vv", "--dry-run"]);
        assert_eq!(cli.verbose, 2);
        assert!(cli.dry_run);
    }

    #[test]
    fn the_one_where_flags_land_on_top_of_the_config() {
        let cli = parse(&[
            "tport", "index", "write", "--index", "t", "--doc-type", "d",
            "--host", "http://flag:9200", "--chunk-size", "2",
            "--id-delimiter", ":", "--id-component", "2", "--ignore-errors", "a.json",
        ]);
        let file = empty_config();
        let config = load_config(Some(file.path()), cli.command.overrides()).unwrap();

        assert_eq!(config.elasticsearch.host, "http://flag:9200");
        assert_eq!(config.index.chunk_size, 2);
        assert_eq!(config.index.id.field, "id");
        assert_eq!(config.index.id.delimiter.as_deref(), Some(":"));
        assert_eq!(config.index.id.component, Some(2));
        assert_eq!(config.parse.on_invalid, InvalidLinePolicy::Silent);
    }

    #[test]
    fn the_one_where_no_flags_means_no_opinions() {
        let cli = parse(&["tport", "kafka", "topics"]);
        let file = empty_config();
        let config = load_config(Some(file.path()), cli.command.overrides()).unwrap();
        assert_eq!(config.kafka.broker, "http://localhost:8082");
    }
}
