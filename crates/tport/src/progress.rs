//! 📊 progress.rs: "Are we there yet?" asked every batch load, ever.
//!
//! Two jobs live here:
//! - `ProgressMetrics`: a live indicatif bar fed with bytes/lines as input is read
//! - `stats_table`: the comfy-table summary printed after a write finishes
//!
//! ⚠️ Watching the bar does not make the cluster faster. We checked.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use comfy_table::{Cell, CellAlignment, ContentArrangement, Table, presets::NOTHING};
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

use crate::common::BatchStats;

// -- 📏 one mebibyte. the pedants were right, we just don't tell them.
const MIB: u64 = 1024 * 1024;

// -- 🔄 how far back the rate window looks before forgetting
const RATE_WINDOW: Duration = Duration::from_secs(5);

/// 📦 "1073741824" is not a UI. "1024.00 MiB" is.
fn human_bytes(bytes: u64) -> String {
    if bytes >= MIB {
        format!("{:.2} MiB", bytes as f64 / MIB as f64)
    } else if bytes >= 1024 {
        format!("{:.2} KiB", bytes as f64 / 1024.0)
    } else {
        format!("{} bytes", bytes)
    }
}

/// 🔢 1000000 -> 1,000,000. Eyes everywhere thank you.
fn with_thousands(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

/// ⏱️ MM:SS, or HH:MM:SS if you should really go get lunch.
fn clock(duration: Duration) -> String {
    let secs = duration.as_secs();
    let (h, m, s) = (secs / 3600, (secs % 3600) / 60, secs % 60);
    if h > 0 {
        format!("{:02}:{:02}:{:02}", h, m, s)
    } else {
        format!("{:02}:{:02}", m, s)
    }
}

/// 📊 Live progress for one input read: bytes, lines, rate, ETA.
///
/// Rates come from a sliding 5-second window so one slow chunk doesn't make
/// the numbers look like a seismograph.
pub struct ProgressMetrics {
    label: String,
    total_size: u64,
    bytes: u64,
    lines: u64,
    bar: ProgressBar,
    samples: VecDeque<(Instant, u64, u64)>,
    started: Instant,
}

// 🎭 ProgressBar doesn't do Debug. We print the numbers instead.
impl std::fmt::Debug for ProgressMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressMetrics")
            .field("label", &self.label)
            .field("total_size", &self.total_size)
            .field("bytes", &self.bytes)
            .field("lines", &self.lines)
            .finish()
    }
}

impl ProgressMetrics {
    /// 🚀 Draws to stderr, so stdout stays clean for actual output.
    /// `total_size = 0` means "no idea" (stdin, mostly) and disables percent/ETA.
    pub fn new(label: impl Into<String>, total_size: u64) -> Self {
        let bar = ProgressBar::with_draw_target(Some(total_size), ProgressDrawTarget::stderr());
        // -- the template is a literal; if it ever fails to parse we fall back to the default bar
        if let Ok(style) = ProgressStyle::default_bar().template("{msg}\n| [{bar:40.cyan/blue}]") {
            bar.set_style(style.progress_chars("=>-"));
        }
        let started = Instant::now();
        let mut samples = VecDeque::new();
        samples.push_back((started, 0, 0));
        Self {
            label: label.into(),
            total_size,
            bytes: 0,
            lines: 0,
            bar,
            samples,
            started,
        }
    }

    /// 🔇 Same bookkeeping, nothing drawn. For tests and interactive commands.
    pub fn hidden(label: impl Into<String>, total_size: u64) -> Self {
        let metrics = Self::new(label, total_size);
        metrics.bar.set_draw_target(ProgressDrawTarget::hidden());
        metrics
    }

    pub fn bytes(&self) -> u64 {
        self.bytes
    }

    pub fn lines(&self) -> u64 {
        self.lines
    }

    /// 🔄 Fold in freshly read bytes/lines and redraw.
    pub fn update(&mut self, bytes_read: u64, lines_read: u64) {
        self.bytes += bytes_read;
        self.lines += lines_read;
        let (lines_per_sec, mib_per_sec) = self.rates();
        self.bar.set_message(self.render(lines_per_sec, mib_per_sec));
        self.bar.set_position(self.bytes);
    }

    /// ✅ EOF. Ring the bell.
    pub fn finish(&self) {
        self.bar.finish_and_clear();
    }

    fn rates(&mut self) -> (f64, f64) {
        let now = Instant::now();
        while let Some(&(at, _, _)) = self.samples.front() {
            if now.duration_since(at) > RATE_WINDOW {
                self.samples.pop_front();
            } else {
                break;
            }
        }
        self.samples.push_back((now, self.bytes, self.lines));

        match self.samples.front() {
            Some(&(at, bytes_then, lines_then)) => {
                let elapsed = now.duration_since(at).as_secs_f64();
                if elapsed > 0.0 {
                    let lines = self.lines.saturating_sub(lines_then) as f64 / elapsed;
                    let mib = self.bytes.saturating_sub(bytes_then) as f64 / elapsed / MIB as f64;
                    (lines, mib)
                } else {
                    (0.0, 0.0)
                }
            }
            None => (0.0, 0.0),
        }
    }

    fn render(&self, lines_per_sec: f64, mib_per_sec: f64) -> String {
        let elapsed = self.started.elapsed();
        let percent = if self.total_size > 0 {
            self.bytes as f64 / self.total_size as f64 * 100.0
        } else {
            0.0
        };
        // 🔮 linear extrapolation. the future resembles the past, for file reads at least.
        let remaining = if percent > 0.0 && percent < 100.0 {
            let total = elapsed.as_secs_f64() / (percent / 100.0);
            clock(Duration::from_secs_f64((total - elapsed.as_secs_f64()).max(0.0)))
        } else {
            "--:--".to_string()
        };

        let mut table = Table::new();
        table.load_preset(NOTHING);
        table.set_content_arrangement(ContentArrangement::Dynamic);
        table.add_row(vec![
            Cell::new(format!("{} lines/s", with_thousands(lines_per_sec as u64)))
                .set_alignment(CellAlignment::Right),
            Cell::new(format!("{} lines", with_thousands(self.lines)))
                .set_alignment(CellAlignment::Right),
        ]);
        table.add_row(vec![
            Cell::new(format!("{:.2} MiB/s", mib_per_sec)).set_alignment(CellAlignment::Right),
            Cell::new(format!(
                "{} / {}",
                human_bytes(self.bytes),
                human_bytes(self.total_size)
            ))
            .set_alignment(CellAlignment::Right),
        ]);
        table.add_row(vec![
            Cell::new(format!("{} elapsed", clock(elapsed))).set_alignment(CellAlignment::Right),
            Cell::new(format!("{} remaining ({:.1}%)", remaining, percent))
                .set_alignment(CellAlignment::Right),
        ]);
        format!("input: {}\n{}", self.label, table)
    }
}

/// 🍽️ The end-of-run receipt. Always printed after a write, good news or not.
pub fn stats_table(operation: &str, target: &str, stats: &BatchStats) -> Table {
    let mut table = Table::new();
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["operation", "target", "successful", "failed"]);
    table.add_row(vec![
        Cell::new(operation),
        Cell::new(target),
        Cell::new(with_thousands(stats.succeeded)).set_alignment(CellAlignment::Right),
        Cell::new(with_thousands(stats.failed)).set_alignment(CellAlignment::Right),
    ]);
    table
}

/// 📋 One-column listing (buckets, collections, topics) for stdout.
pub fn listing_table(header: &str, items: &[String]) -> Table {
    let mut table = Table::new();
    table.load_preset(NOTHING);
    table.set_header(vec![header]);
    for item in items {
        table.add_row(vec![item.as_str()]);
    }
    table
}
