//! 🚚 tport: moves line-delimited JSON from files into search indices, buckets,
//! document stores, column stores, and queues. Also pokes at them afterwards.
//!
//! 🧠 Knowledge graph:
//! - `input` reads lines, `parser` turns lines into records (one outcome per line, always)
//! - `sinks` adapt a record stream to one backend each, `backends` hold the capability
//!   traits plus the concrete clients that implement them
//! - `app_config` assembles the layered config once; everything downstream gets it by value
//!
//! 🦆 The duck rides in the passenger seat. It does not help with the driving.

pub mod app_config;
pub mod backends;
pub mod common;
pub mod compression;
pub mod error;
pub mod input;
pub mod parser;
pub mod progress;
pub mod sinks;
pub mod transforms;

pub use common::{BatchStats, InvalidLine, ParseOutcome, RawLine, Record};
pub use error::TransportError;
pub use parser::{InvalidLinePolicy, RecordParser};
