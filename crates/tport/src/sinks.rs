//! 🕳️ Sinks: the adapters between a record stream and one backend capability.
//!
//! Each sink is generic over the one trait it needs, owns its backend for the
//! length of one invocation, and hands `BatchStats` back to the caller. None of
//! them ever asks a human anything; confirmation and pausing are the CLI's job.
//!
//! ```text
//!   records ──▶ IndexSink<BulkWriter>       chunked bulk, id extraction
//!   files   ──▶ ObjectSink<BlobStore>       create-if-absent, replace-or-skip, gzip
//!   records ──▶ DocumentSink<DocumentStore> one insert per record
//!   table   ◀── ColumnSink<ColumnStore>     scan
//!   records ──▶ QueueSink<MessageQueue>     one streaming produce
//! ```

pub mod column;
pub mod document;
pub mod index;
pub mod object;
pub mod queue;

pub use column::ColumnSink;
pub use document::DocumentSink;
pub use index::{IndexSink, IndexTarget};
pub use object::{ObjectSink, UploadOptions, UploadOutcome, UploadStatus};
pub use queue::QueueSink;
