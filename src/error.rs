use std::path::PathBuf;
use thiserror::Error;

/// Failures of the durable snapshot path. In-memory state stays authoritative
/// either way; a later mutation re-attempts the write.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to serialize snapshot: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("failed to write snapshot to {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Failures while pulling history pages from the upstream source.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The channel is not visible to us. The scanner skips it cleanly.
    #[error("access denied")]
    AccessDenied,
    /// Anything else: network trouble, rate-limit rejection, malformed reply.
    /// Aborts the current channel's scan, keeping the partial count.
    #[error("{0}")]
    Transport(String),
}
