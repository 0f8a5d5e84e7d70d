//! # svp-audit
//!
//! Verdict recording for the SVP gate.
//!
//! Every [`Verdict`](svp_policy::Verdict) the gate returns can be handed to a
//! [`VerdictRecorder`], which formats it as a [`VerdictRecord`] and forwards
//! it to a [`LogSink`] on a background thread. Recording never blocks or
//! fails the audit call: persistence failures are logged and counted only.
//!
//! The reference sink, [`RollingAuditLog`], is a JSONL file that keeps the
//! most recent N records, linked by a SHA-256 hash chain.
//!
//! ## Quick Example
//!
//! ```rust,no_run
//! use svp_audit::{RollingAuditLog, VerdictRecorder};
//!
//! let log = RollingAuditLog::open("/tmp/svp-audit.jsonl", 1000).unwrap();
//! let recorder = VerdictRecorder::spawn(log).unwrap();
//! // recorder.record(&verdict);
//! recorder.shutdown();
//! ```

pub mod error;
pub mod log;
pub mod record;
pub mod recorder;
pub mod sink;

pub use error::AuditError;
pub use log::{RollingAuditLog, DEFAULT_RETENTION};
pub use record::VerdictRecord;
pub use recorder::{VerdictRecorder, DEFAULT_QUEUE_CAPACITY};
pub use sink::{LogSink, MemorySink};
