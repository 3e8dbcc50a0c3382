//! 🏷️ The few errors worth a name.
//!
//! Everything else rides in `anyhow` with a context string attached. These are
//! the ones a caller might want to `downcast_ref` and react to.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    /// 💀 A line was not JSON and the policy said stop.
    #[error("line {position} is not valid JSON ({reason}); aborting because the invalid-line policy is 'abort'")]
    MalformedLine { position: usize, reason: String },

    /// 📦 Zero-sized chunks would loop forever. We decline.
    #[error("chunk size must be at least 1, got {0}")]
    InvalidChunkSize(usize),

    /// 📡 The backend answered, and the answer was no.
    #[error("{backend} rejected the request with status {status}: {body}")]
    BackendRejected {
        backend: &'static str,
        status: u16,
        body: String,
    },
}
