//! 📂 input.rs: reads lines out of files (or stdin) and hands them over one at a time.
//!
//! Several files read as one long stream. The parser numbers the lines, we
//! just make sure they arrive in order and without their newlines.
//!
//! Lines come out as bytes. Whether they are UTF-8 (let alone JSON) is the
//! parser's call, one line at a time; only real I/O trouble ends the stream.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use futures::{Stream, stream};
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tracing::{debug, trace};

use crate::progress::ProgressMetrics;

// -- 📊 redraw the bar every this many lines. every line would be a light show.
const PROGRESS_EVERY_LINES: u64 = 1000;

/// 🚪 One place lines can come from.
#[derive(Debug, Clone, PartialEq, Eq)]
enum InputSource {
    Stdin,
    File { path: PathBuf, size: u64 },
}

impl InputSource {
    fn label(&self) -> String {
        match self {
            InputSource::Stdin => "<stdin>".to_string(),
            InputSource::File { path, .. } => path.display().to_string(),
        }
    }

    fn size(&self) -> u64 {
        match self {
            InputSource::Stdin => 0,
            InputSource::File { size, .. } => *size,
        }
    }
}

/// 📂 An ordered list of inputs, already checked for existence.
#[derive(Debug)]
pub struct InputLines {
    sources: Vec<InputSource>,
    show_progress: bool,
}

impl InputLines {
    /// 🚀 Stat every path up front. A missing file fails here, before a single
    /// line has gone anywhere. `-` is standard input.
    pub async fn open(paths: &[PathBuf], show_progress: bool) -> Result<Self> {
        let mut sources = Vec::with_capacity(paths.len());
        for path in paths {
            if path.as_os_str() == "-" {
                sources.push(InputSource::Stdin);
                continue;
            }
            let metadata = tokio::fs::metadata(path)
                .await
                .with_context(|| format!("💀 input file '{}' could not be opened", path.display()))?;
            if metadata.is_dir() {
                bail!("💀 input '{}' is a directory, not a file of JSON lines", path.display());
            }
            sources.push(InputSource::File {
                path: path.clone(),
                size: metadata.len(),
            });
        }
        debug!("📂 {} input(s) ready", sources.len());
        Ok(Self {
            sources,
            show_progress,
        })
    }

    /// 📏 Sum of known file sizes. stdin counts as zero because it won't say.
    pub fn total_size(&self) -> u64 {
        self.sources.iter().map(InputSource::size).sum()
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// 🔄 The lazy part. Nothing is opened until the first line is pulled.
    pub fn into_lines(self) -> impl Stream<Item = Result<Vec<u8>>> + Send {
        let state = ReadState {
            pending: self.sources.into_iter().collect(),
            current: None,
            show_progress: self.show_progress,
        };
        stream::try_unfold(state, |mut state| async move {
            match state.next_line().await? {
                Some(line) => Ok(Some((line, state))),
                None => Ok(None),
            }
        })
    }
}

struct OpenInput {
    label: String,
    reader: BufReader<Box<dyn AsyncRead + Send + Unpin>>,
    progress: Option<ProgressMetrics>,
    bytes_since_tick: u64,
    lines_since_tick: u64,
}

struct ReadState {
    pending: VecDeque<InputSource>,
    current: Option<OpenInput>,
    show_progress: bool,
}

impl ReadState {
    async fn open_next(&mut self) -> Result<bool> {
        let Some(source) = self.pending.pop_front() else {
            return Ok(false);
        };
        let label = source.label();
        let reader: Box<dyn AsyncRead + Send + Unpin> = match &source {
            InputSource::Stdin => Box::new(tokio::io::stdin()),
            InputSource::File { path, .. } => Box::new(open_file(path).await?),
        };
        let progress = self
            .show_progress
            .then(|| ProgressMetrics::new(label.clone(), source.size()));
        debug!("📖 reading {}", label);
        self.current = Some(OpenInput {
            label,
            reader: BufReader::new(reader),
            progress,
            bytes_since_tick: 0,
            lines_since_tick: 0,
        });
        Ok(true)
    }

    async fn next_line(&mut self) -> Result<Option<Vec<u8>>> {
        loop {
            if self.current.is_none() && !self.open_next().await? {
                return Ok(None);
            }
            let Some(input) = self.current.as_mut() else {
                continue;
            };

            let mut line = Vec::new();
            let bytes_read = input
                .reader
                .read_until(b'\n', &mut line)
                .await
                .with_context(|| format!("💀 failed reading a line from '{}'", input.label))?;

            if bytes_read == 0 {
                // 🏁 this input is dry. flush the bar and move to the next one.
                if let Some(progress) = input.progress.as_mut() {
                    progress.update(input.bytes_since_tick, input.lines_since_tick);
                    progress.finish();
                }
                trace!("🏁 end of {}", input.label);
                self.current = None;
                continue;
            }

            input.bytes_since_tick += bytes_read as u64;
            input.lines_since_tick += 1;
            if input.lines_since_tick >= PROGRESS_EVERY_LINES {
                if let Some(progress) = input.progress.as_mut() {
                    progress.update(input.bytes_since_tick, input.lines_since_tick);
                }
                input.bytes_since_tick = 0;
                input.lines_since_tick = 0;
            }

            strip_line_ending(&mut line);
            return Ok(Some(line));
        }
    }
}

async fn open_file(path: &Path) -> Result<File> {
    File::open(path)
        .await
        .with_context(|| format!("💀 input file '{}' could not be opened", path.display()))
}

/// ✂️ `\n` and `\r\n` go. Everything else in the line stays.
fn strip_line_ending(line: &mut Vec<u8>) {
    if line.last() == Some(&b'\n') {
        line.pop();
        if line.last() == Some(&b'\r') {
            line.pop();
        }
    }
}
