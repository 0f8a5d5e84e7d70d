// recorder_flow.rs — Gate → recorder → rolling audit log.
//
// Audits a fixed sequence of requests through the gate, records every
// verdict, and checks that the log holds exactly the most recent window
// with an intact hash chain.

use std::sync::Arc;

use svp_audit::{RollingAuditLog, VerdictRecorder};
use svp_policy::{
    AuditRequest, Gate, GateSettings, HashingEmbedder, InvariantCatalog, Layer, VerdictStatus,
};
use tempfile::tempdir;

fn gate() -> Gate {
    Gate::new(
        InvariantCatalog::builtin().unwrap(),
        Arc::new(HashingEmbedder::default()),
        GateSettings::default(),
    )
}

#[test]
fn verdicts_are_recorded_with_intact_chain() {
    let dir = tempdir().unwrap();
    let log_path = dir.path().join("audit.jsonl");
    let gate = gate();

    let requests = vec![
        AuditRequest::new("Pay AWS hosting invoice", "FINANCE").with_amount(250.0),
        AuditRequest::new("Pay vendor invoice", "FINANCE").with_amount(6200.0),
        AuditRequest::new("clean up disk", "INFRASTRUCTURE").with_command("rm -rf /"),
    ];

    let mut verdicts = Vec::new();
    {
        let recorder = VerdictRecorder::spawn(RollingAuditLog::open(&log_path, 100).unwrap()).unwrap();
        for request in &requests {
            let verdict = gate.audit(request).unwrap();
            recorder.record(&verdict);
            verdicts.push(verdict);
        }
        assert_eq!(recorder.shutdown(), (3, 0));
    }

    let records = RollingAuditLog::read_all(&log_path).unwrap();
    assert_eq!(records.len(), 3);
    for (record, verdict) in records.iter().zip(&verdicts) {
        assert_eq!(record.trace_id, verdict.trace_id);
        assert_eq!(record.status, verdict.status);
        assert_eq!(record.reason, verdict.reason);
    }
    assert_eq!(records[0].status, VerdictStatus::Verified);
    assert_eq!(records[1].layer, Some(Layer::FinancialLimit));
    assert_eq!(records[2].layer, Some(Layer::LiteralSafety));
    assert_eq!(RollingAuditLog::verify_chain(&log_path).unwrap(), 3);
}

#[test]
fn log_keeps_only_the_most_recent_window() {
    let dir = tempdir().unwrap();
    let log_path = dir.path().join("audit.jsonl");
    let gate = gate();

    let mut trace_ids = Vec::new();
    {
        let recorder = VerdictRecorder::spawn(RollingAuditLog::open(&log_path, 4).unwrap()).unwrap();
        for i in 0..10 {
            let verdict = gate
                .audit_intent("Pay vendor invoice", 1000.0 * i as f64, None, "FINANCE")
                .unwrap();
            recorder.record(&verdict);
            trace_ids.push(verdict.trace_id);
        }
    }

    let kept: Vec<String> = RollingAuditLog::read_all(&log_path)
        .unwrap()
        .into_iter()
        .map(|r| r.trace_id)
        .collect();
    assert_eq!(kept, trace_ids[6..].to_vec());
    assert_eq!(RollingAuditLog::verify_chain(&log_path).unwrap(), 4);
}

#[test]
fn request_errors_produce_no_record() {
    let dir = tempdir().unwrap();
    let log_path = dir.path().join("audit.jsonl");
    let gate = gate();

    {
        let recorder = VerdictRecorder::spawn(RollingAuditLog::open(&log_path, 10).unwrap()).unwrap();
        if let Ok(verdict) = gate.audit_intent("Draft a contract", 0.0, None, "LEGAL") {
            recorder.record(&verdict);
        }
    }

    assert!(RollingAuditLog::read_all(&log_path).unwrap().is_empty());
}
