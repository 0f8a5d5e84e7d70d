// record.rs — The persisted form of a verdict.
//
// One VerdictRecord per line in the audit log. Records carry everything
// needed to correlate with the caller's own logs (trace id, timestamp) and
// to explain the decision (status, layer, reason, score), plus the hash of
// the previous line for tamper detection.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use svp_policy::{Layer, Verdict, VerdictStatus};

/// A single audit log entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VerdictRecord {
    pub trace_id: String,

    /// When the audited request was processed (UTC).
    pub timestamp: DateTime<Utc>,

    pub domain: String,

    pub status: VerdictStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layer: Option<Layer>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matched_concept: Option<String>,

    #[serde(default)]
    pub degraded: bool,

    /// SHA-256 of the previous line in the log. Set by the sink on append.
    pub previous_hash: Option<String>,
}

impl From<&Verdict> for VerdictRecord {
    fn from(verdict: &Verdict) -> Self {
        Self {
            trace_id: verdict.trace_id.clone(),
            timestamp: verdict.timestamp,
            domain: verdict.domain.clone(),
            status: verdict.status,
            layer: verdict.layer,
            reason: verdict.reason.clone(),
            score: verdict.score,
            matched_concept: verdict.matched_concept.clone(),
            degraded: verdict.degraded,
            previous_hash: None,
        }
    }
}
