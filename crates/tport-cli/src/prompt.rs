//! 🙋 Asking the human. Prompts go to stderr so stdout stays pipeable.

use std::io::Write;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Stdin};

pub struct Prompt<R, W> {
    input: R,
    output: W,
}

impl Prompt<BufReader<Stdin>, std::io::Stderr> {
    pub fn stdio() -> Self {
        Self::new(BufReader::new(tokio::io::stdin()), std::io::stderr())
    }
}

impl<R: AsyncBufRead + Unpin, W: Write> Prompt<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    #[cfg(test)]
    pub fn into_output(self) -> W {
        self.output
    }

    /// ⏯️ Between records. Enter (or anything else) keeps going; n, N or a
    /// closed stdin stops.
    pub async fn keep_going(&mut self) -> Result<bool> {
        let answer = self.ask("--Continue? (Y/n)--").await?;
        Ok(!matches!(answer.as_deref(), None | Some("n") | Some("N")))
    }

    /// 💣 Shows `warning`, then wants exactly `Y`. Everything else is a no.
    pub async fn confirm(&mut self, warning: &str) -> Result<bool> {
        writeln!(self.output, "{}", warning).context("💀 could not write to the terminal")?;
        let answer = self.ask("Are you sure? [Y/n] ").await?;
        Ok(answer.as_deref() == Some("Y"))
    }

    /// `None` when input is closed.
    async fn ask(&mut self, question: &str) -> Result<Option<String>> {
        write!(self.output, "{}", question).context("💀 could not write to the terminal")?;
        self.output.flush().context("💀 could not write to the terminal")?;

        let mut line = String::new();
        let read = self
            .input
            .read_line(&mut line)
            .await
            .context("💀 could not read an answer")?;
        if read == 0 {
            return Ok(None);
        }
        Ok(Some(line.trim().to_string()))
    }
}
