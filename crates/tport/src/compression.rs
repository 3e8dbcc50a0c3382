//! 🫁 compression.rs: squish a file with gzip before it leaves the building.
//!
//! The compressed copy lands in a private temp dir and is named `<basename>.gz`,
//! so nobody confuses it for the original. The temp dir goes away when the
//! `CompressedArtifact` is dropped.
//!
//! flate2 is synchronous, so the async entry point runs it on tokio's blocking pool.

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use flate2::Compression;
use flate2::write::GzEncoder;
use tempfile::TempDir;
use tracing::debug;

/// 📦 A gzipped copy of some file, alive for as long as this value is.
#[derive(Debug)]
pub struct CompressedArtifact {
    // -- held for its Drop. the file lives inside.
    _scratch: TempDir,
    path: PathBuf,
    original_len: u64,
    compressed_len: u64,
}

impl CompressedArtifact {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn original_len(&self) -> u64 {
        self.original_len
    }

    pub fn compressed_len(&self) -> u64 {
        self.compressed_len
    }
}

/// 🏷️ `data.json` -> `data.json.gz`
pub fn compressed_name(file_name: &str) -> String {
    format!("{}.gz", file_name)
}

/// 🫁 The blocking part. Streams the file through a `GzEncoder`, never loads it whole.
pub fn gzip_file(source: &Path) -> Result<CompressedArtifact> {
    let file_name = source
        .file_name()
        .and_then(|n| n.to_str())
        .with_context(|| format!("💀 '{}' has no usable file name", source.display()))?;

    let scratch = tempfile::Builder::new()
        .prefix("tport-gz-")
        .tempdir()
        .context("💀 could not create a scratch directory for compression")?;
    let path = scratch.path().join(compressed_name(file_name));

    let input = File::open(source)
        .with_context(|| format!("💀 could not open '{}' for compression", source.display()))?;
    let mut reader = BufReader::new(input);
    let output = File::create(&path)
        .with_context(|| format!("💀 could not create '{}'", path.display()))?;
    let mut encoder = GzEncoder::new(BufWriter::new(output), Compression::default());

    let original_len = io::copy(&mut reader, &mut encoder)
        .with_context(|| format!("💀 gzip failed while reading '{}'", source.display()))?;
    let mut writer = encoder
        .finish()
        .context("💀 gzip could not write its trailer")?;
    writer.flush().context("💀 flushing the compressed file failed")?;
    drop(writer);

    let compressed_len = std::fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
    debug!(
        "🫁 {} -> {} ({} -> {} bytes)",
        source.display(),
        path.display(),
        original_len,
        compressed_len
    );

    Ok(CompressedArtifact {
        _scratch: scratch,
        path,
        original_len,
        compressed_len,
    })
}

/// 🧵 Async wrapper: same thing, off the reactor.
pub async fn compress(source: PathBuf) -> Result<CompressedArtifact> {
    tokio::task::spawn_blocking(move || gzip_file(&source))
        .await
        .context("💀 the compression task panicked or was cancelled")?
}
