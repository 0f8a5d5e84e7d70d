// error.rs — Why a verdict could not be persisted, or a log not trusted.
//
// Three stages can fail: handing a verdict to the recorder (queue full,
// worker gone), writing the rolling log (open, append, window rewrite), and
// reading it back (malformed line, broken hash chain). The first two never
// reach an audit caller; the recorder counts and logs them. Only `read_all`
// and `verify_chain` return them, to operators.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuditError {
    /// The recorder queue is full because the sink is not keeping up.
    #[error("verdict recorder queue is full; record dropped")]
    QueueFull,

    #[error("verdict recorder is closed")]
    RecorderClosed,

    /// A window of zero records could never hold a verdict.
    #[error("retention must be at least 1 record")]
    InvalidRetention,

    #[error("failed to open audit log at {path}: {source}")]
    OpenFailed {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Appending a line or rewriting the retained window failed.
    #[error("failed to write verdict log: {0}")]
    WriteFailed(#[from] std::io::Error),

    /// A log line is not a valid verdict record.
    #[error("malformed verdict record: {0}")]
    MalformedRecord(#[from] serde_json::Error),

    /// A record's `previous_hash` does not match the line before it.
    #[error("integrity check failed at line {line}: expected hash {expected}, got {actual}")]
    IntegrityViolation {
        line: usize,
        expected: String,
        actual: String,
    },
}
