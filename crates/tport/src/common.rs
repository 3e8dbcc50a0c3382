//! 📦 Common data structures, the humble cargo containers of tport.
//!
//! A line walks in. A `ParseOutcome` walks out. Sometimes it is a `Record`,
//! sometimes it is an `Invalid` with a note pinned to its chest explaining
//! what went wrong and where. Either way, nobody gets left behind at the door.

use serde::Serialize;

/// 🎯 One structurally valid JSON value, produced from one input line.
///
/// Usually an object. Carries no identity of its own; sinks may go digging for
/// an `id` field when they need an address.
pub type Record = serde_json::Value;

/// 📄 A raw line plus where it sat in the input (0-based, global across files).
///
/// Bytes, not text: a line that isn't valid UTF-8 is still a line, and the
/// parser gets to say so. Born in `InputLines`, eaten immediately by `RecordParser`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawLine {
    pub position: usize,
    pub bytes: Vec<u8>,
}

/// 💀 The paperwork for a line that refused to be JSON.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InvalidLine {
    /// 0-based position in the input stream
    pub position: usize,
    /// the offending text, verbatim
    pub raw: String,
    /// what serde_json had to say about it
    pub reason: String,
}

/// 🔀 Exactly one of these per input line. Order preserved. Cardinality preserved.
#[derive(Debug, Clone, PartialEq)]
pub enum ParseOutcome {
    Record(Record),
    Invalid(InvalidLine),
}

impl ParseOutcome {
    /// ✅ Did this line make it?
    pub fn is_record(&self) -> bool {
        matches!(self, ParseOutcome::Record(_))
    }
}

/// 📊 Success/failure counters for one sink invocation.
///
/// Only ever goes up. Like rent. Produced during submission, reported after flush.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchStats {
    pub succeeded: u64,
    pub failed: u64,
}

impl BatchStats {
    pub fn new(succeeded: u64, failed: u64) -> Self {
        Self { succeeded, failed }
    }

    pub fn record_success(&mut self, count: u64) {
        self.succeeded += count;
    }

    pub fn record_failure(&mut self, count: u64) {
        self.failed += count;
    }

    /// 🔄 Fold another chunk's counts into the running total.
    pub fn absorb(&mut self, other: BatchStats) {
        self.succeeded += other.succeeded;
        self.failed += other.failed;
    }

    pub fn total(&self) -> u64 {
        self.succeeded + self.failed
    }
}

impl std::fmt::Display for BatchStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "successful: {}; failed: {}", self.succeeded, self.failed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn the_one_where_stats_only_ever_go_up() {
        let mut the_running_total = BatchStats::default();
        the_running_total.record_success(2);
        the_running_total.absorb(BatchStats::new(1, 1));
        the_running_total.record_failure(3);

        assert_eq!(the_running_total, BatchStats::new(3, 4));
        assert_eq!(the_running_total.total(), 7);
        assert_eq!(the_running_total.to_string(), "successful: 3; failed: 4");
    }

    #[test]
    fn the_one_where_outcomes_know_what_they_are() {
        let the_good = ParseOutcome::Record(serde_json::json!({"a": 1}));
        let the_bad = ParseOutcome::Invalid(InvalidLine {
            position: 1,
            raw: "not json".to_string(),
            reason: "expected value".to_string(),
        });
        assert!(the_good.is_record());
        assert!(!the_bad.is_record());
    }
}
