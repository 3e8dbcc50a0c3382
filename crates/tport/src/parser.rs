//! 🔍 parser.rs: where raw lines go to find out if they are JSON or just pretending.
//!
//! One line in, one `ParseOutcome` out. Always. In order. A bad line gets a
//! name tag (`Invalid`) instead of a quiet disappearance, and then the policy
//! decides whether the show goes on.
//!
//! 🧠 Knowledge graph:
//! - `InputLines` -> `RecordParser::outcomes` -> inspect (sees every outcome)
//! - `InputLines` -> `RecordParser::records` -> sinks (see records, policy applied)
//! - nothing in here ever asks a human anything. prompts live in the CLI.

use std::fmt;
use std::str::FromStr;

use anyhow::Result;
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, error, warn};

use crate::common::{InvalidLine, ParseOutcome, RawLine, Record};
use crate::error::TransportError;

/// 🚦 What to do when a line is not JSON.
///
/// Whatever the choice, the stream length never changes: `Warn` and `Silent`
/// hand an empty object `{}` downstream in the bad line's place, `Abort` ends
/// the stream with a typed error.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvalidLinePolicy {
    /// ⚠️ log a warning with the position, substitute `{}`, keep going
    #[default]
    Warn,
    /// 🤫 debug log only, substitute `{}`, keep going. The "ignore errors" switch.
    Silent,
    /// 💀 first bad line ends the run
    Abort,
}

impl FromStr for InvalidLinePolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "warn" => Ok(Self::Warn),
            "silent" => Ok(Self::Silent),
            "abort" => Ok(Self::Abort),
            other => Err(format!(
                "unknown invalid-line policy '{}', expected one of: warn, silent, abort",
                other
            )),
        }
    }
}

impl fmt::Display for InvalidLinePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Warn => "warn",
            Self::Silent => "silent",
            Self::Abort => "abort",
        };
        f.write_str(name)
    }
}

/// 🔍 Turns lines into outcomes, and outcomes into records.
///
/// The streams it builds hold their own copy, so they borrow nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct RecordParser {
    policy: InvalidLinePolicy,
}

impl RecordParser {
    pub fn new(policy: InvalidLinePolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> InvalidLinePolicy {
        self.policy
    }

    /// 🎯 Classify one line. Pure. No logging, no policy.
    ///
    /// Bytes that aren't UTF-8 are just another way to not be JSON; `raw`
    /// then carries a lossy rendering so there is something to show.
    pub fn classify(&self, line: RawLine) -> ParseOutcome {
        let text = match String::from_utf8(line.bytes) {
            Ok(text) => text,
            Err(err) => {
                let reason = format!("line is not valid UTF-8: {}", err.utf8_error());
                return ParseOutcome::Invalid(InvalidLine {
                    position: line.position,
                    raw: String::from_utf8_lossy(err.as_bytes()).into_owned(),
                    reason,
                });
            }
        };
        match serde_json::from_str::<Record>(&text) {
            Ok(record) => ParseOutcome::Record(record),
            Err(err) => ParseOutcome::Invalid(InvalidLine {
                position: line.position,
                raw: text,
                reason: err.to_string(),
            }),
        }
    }

    /// 📢 The one log line per bad record. Severity depends on the policy.
    fn report(&self, invalid: &InvalidLine) {
        match self.policy {
            InvalidLinePolicy::Warn => {
                warn!("line {}: {}", invalid.position, invalid.reason);
                debug!("line {} raw: {}", invalid.position, invalid.raw);
            }
            InvalidLinePolicy::Silent => {
                debug!(
                    "line {}: {} (ignored) raw: {}",
                    invalid.position, invalid.reason, invalid.raw
                );
            }
            InvalidLinePolicy::Abort => {
                error!("line {}: {}", invalid.position, invalid.reason);
                debug!("line {} raw: {}", invalid.position, invalid.raw);
            }
        }
    }

    /// 🔀 Every line becomes exactly one outcome, positions counted from 0.
    ///
    /// Lines may be `String`s or raw bytes. Read errors from the line stream
    /// pass through untouched; they are I/O trouble, not JSON trouble.
    pub fn outcomes<S, L>(self, lines: S) -> impl Stream<Item = Result<ParseOutcome>> + Send
    where
        S: Stream<Item = Result<L>> + Send,
        L: Into<Vec<u8>>,
    {
        lines.enumerate().map(move |(position, line)| {
            let bytes = line?.into();
            let outcome = self.classify(RawLine { position, bytes });
            if let ParseOutcome::Invalid(invalid) = &outcome {
                self.report(invalid);
            }
            Ok(outcome)
        })
    }

    /// 📦 Records only, with the policy applied to the bad ones.
    ///
    /// Under `Warn` and `Silent` the output has the same length as the input.
    /// Under `Abort` the first bad line surfaces as `TransportError::MalformedLine`.
    pub fn records<S, L>(self, lines: S) -> impl Stream<Item = Result<Record>> + Send
    where
        S: Stream<Item = Result<L>> + Send,
        L: Into<Vec<u8>>,
    {
        let policy = self.policy;
        self.outcomes(lines).map(move |outcome| match outcome? {
            ParseOutcome::Record(record) => Ok(record),
            ParseOutcome::Invalid(invalid) => match policy {
                InvalidLinePolicy::Warn | InvalidLinePolicy::Silent => Ok(json!({})),
                InvalidLinePolicy::Abort => Err(TransportError::MalformedLine {
                    position: invalid.position,
                    reason: invalid.reason,
                }
                .into()),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::{TryStreamExt, stream};

    fn lines(raw: &[&str]) -> impl Stream<Item = Result<String>> + Send + use<> {
        let owned: Vec<Result<String>> = raw.iter().map(|l| Ok(l.to_string())).collect();
        stream::iter(owned)
    }

    const THE_SCENARIO: [&str; 3] = ["{\"a\":1}", "not json", "{\"b\":2}"];

    #[tokio::test]
    async fn the_one_where_every_line_gets_an_outcome() {
        let parser = RecordParser::new(InvalidLinePolicy::Silent);
        let outcomes: Vec<ParseOutcome> =
            parser.outcomes(lines(&THE_SCENARIO)).try_collect().await.unwrap();

        assert_eq!(outcomes.len(), 3);
        assert_eq!(outcomes[0], ParseOutcome::Record(json!({"a": 1})));
        match &outcomes[1] {
            ParseOutcome::Invalid(invalid) => {
                assert_eq!(invalid.position, 1);
                assert_eq!(invalid.raw, "not json");
                assert!(!invalid.reason.is_empty());
            }
            other => panic!("expected Invalid at position 1, got {:?}", other),
        }
        assert_eq!(outcomes[2], ParseOutcome::Record(json!({"b": 2})));
    }

    #[tokio::test]
    async fn the_one_where_bad_lines_become_empty_objects() {
        for policy in [InvalidLinePolicy::Warn, InvalidLinePolicy::Silent] {
            let records: Vec<Record> = RecordParser::new(policy)
                .records(lines(&THE_SCENARIO))
                .try_collect()
                .await
                .unwrap();
            assert_eq!(records, vec![json!({"a": 1}), json!({}), json!({"b": 2})]);
        }
    }

    #[tokio::test]
    async fn the_one_where_abort_means_abort() {
        let mut records = Box::pin(
            RecordParser::new(InvalidLinePolicy::Abort).records(lines(&THE_SCENARIO)),
        );

        assert_eq!(records.try_next().await.unwrap(), Some(json!({"a": 1})));
        let err = records.try_next().await.unwrap_err();
        match err.downcast_ref::<TransportError>() {
            Some(TransportError::MalformedLine { position, .. }) => assert_eq!(*position, 1),
            other => panic!("expected MalformedLine, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn the_one_where_order_survives_a_crowd() {
        let raw: Vec<String> = (0..250)
            .map(|i| {
                if i % 7 == 0 {
                    format!("garbage {}", i)
                } else {
                    format!("{{\"n\":{}}}", i)
                }
            })
            .collect();
        let borrowed: Vec<&str> = raw.iter().map(String::as_str).collect();

        let outcomes: Vec<ParseOutcome> = RecordParser::default()
            .outcomes(lines(&borrowed))
            .try_collect()
            .await
            .unwrap();

        assert_eq!(outcomes.len(), 250);
        for (i, outcome) in outcomes.iter().enumerate() {
            match outcome {
                ParseOutcome::Invalid(invalid) => {
                    assert_eq!(i % 7, 0);
                    assert_eq!(invalid.position, i);
                }
                ParseOutcome::Record(record) => assert_eq!(record["n"], json!(i)),
            }
        }
    }

    #[tokio::test]
    async fn the_one_where_a_blank_line_is_still_a_line() {
        let outcomes: Vec<ParseOutcome> = RecordParser::default()
            .outcomes(lines(&["{}", "", "[1,2]"]))
            .try_collect()
            .await
            .unwrap();
        assert_eq!(outcomes.len(), 3);
        assert!(outcomes[0].is_record());
        assert!(!outcomes[1].is_record());
        // -- arrays are valid JSON. weird for a search index, fine for a parser.
        assert!(outcomes[2].is_record());
    }

    #[tokio::test]
    async fn the_one_where_broken_utf8_is_just_another_bad_line() {
        let raw: Vec<Result<Vec<u8>>> = vec![
            Ok(b"{\"a\":1}".to_vec()),
            Ok(b"{\"bad\":\"\xff\xfe\"}".to_vec()),
            Ok(b"{\"b\":2}".to_vec()),
        ];
        let outcomes: Vec<ParseOutcome> = RecordParser::new(InvalidLinePolicy::Warn)
            .outcomes(stream::iter(raw))
            .try_collect()
            .await
            .unwrap();

        assert_eq!(outcomes.len(), 3);
        assert_eq!(outcomes[0], ParseOutcome::Record(json!({"a": 1})));
        match &outcomes[1] {
            ParseOutcome::Invalid(invalid) => {
                assert_eq!(invalid.position, 1);
                assert!(invalid.reason.contains("UTF-8"));
                assert!(invalid.raw.starts_with("{\"bad\":\""));
                assert!(invalid.raw.contains('\u{FFFD}'));
            }
            other => panic!("expected Invalid at position 1, got {:?}", other),
        }
        assert_eq!(outcomes[2], ParseOutcome::Record(json!({"b": 2})));
    }

    #[test]
    fn the_one_where_policies_parse_and_print() {
        assert_eq!("warn".parse::<InvalidLinePolicy>(), Ok(InvalidLinePolicy::Warn));
        assert_eq!("SILENT".parse::<InvalidLinePolicy>(), Ok(InvalidLinePolicy::Silent));
        assert_eq!(" abort ".parse::<InvalidLinePolicy>(), Ok(InvalidLinePolicy::Abort));
        assert!("yolo".parse::<InvalidLinePolicy>().is_err());
        assert_eq!(InvalidLinePolicy::default().to_string(), "warn");
    }
}
