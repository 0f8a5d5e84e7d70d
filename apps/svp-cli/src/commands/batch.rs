// batch.rs — `svp batch`: audit JSON-lines requests.
//
// Each non-blank input line is one AuditRequest. Each produces exactly one
// output line: the verdict, or `{"line": N, "error": "..."}` when the line
// is unparseable or the request is rejected. The gate is built once and
// shared by every line.

use std::fs::File;
use std::io::{self, BufRead, BufReader, Write};
use std::path::Path;
use std::process::ExitCode;

use anyhow::Context as _;
use serde_json::json;
use svp_policy::{AuditRequest, Gate};

use crate::Context;

pub fn execute(input: Option<&Path>, ctx: &Context) -> anyhow::Result<ExitCode> {
    let gate = ctx.config.open_gate(&ctx.project_root)?;
    let recorder = ctx.config.recorder_for_audit(&ctx.project_root);

    let reader: Box<dyn BufRead> = match input {
        Some(path) if path != Path::new("-") => Box::new(BufReader::new(
            File::open(path).with_context(|| format!("failed to open {}", path.display()))?,
        )),
        _ => Box::new(BufReader::new(io::stdin())),
    };

    let stdout = io::stdout();
    let mut out = stdout.lock();
    let mut audited = 0usize;
    let mut blocked = 0usize;
    let mut errors = 0usize;

    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }

        let output = match audit_line(&gate, &line) {
            Ok(verdict) => {
                audited += 1;
                if verdict.is_blocked() {
                    blocked += 1;
                }
                if let Some(recorder) = &recorder {
                    recorder.record(&verdict);
                }
                serde_json::to_string(&verdict)?
            }
            Err(message) => {
                errors += 1;
                json!({ "line": index + 1, "error": message }).to_string()
            }
        };
        writeln!(out, "{output}")?;
    }
    out.flush()?;

    if let Some(recorder) = recorder {
        let (_, failures) = recorder.shutdown();
        if failures > 0 {
            tracing::warn!(failures, "some verdicts could not be written to the audit log");
        }
    }

    tracing::info!(audited, blocked, errors, "batch complete");
    Ok(ExitCode::SUCCESS)
}

fn audit_line(gate: &Gate, line: &str) -> Result<svp_policy::Verdict, String> {
    let request: AuditRequest =
        serde_json::from_str(line).map_err(|e| format!("invalid request: {e}"))?;
    gate.audit(&request).map_err(|e| e.to_string())
}
