// audit.rs — `svp audit`: evaluate one intent and print the verdict.

use std::process::ExitCode;

use clap::Args;
use svp_policy::AuditRequest;

use crate::Context;

/// Exit code for a BLOCKED verdict. Errors exit 1.
pub const EXIT_BLOCKED: u8 = 2;

#[derive(Args)]
pub struct AuditArgs {
    /// Natural-language description of the planned action.
    #[arg(long)]
    pub intent: String,

    /// Monetary amount involved.
    #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
    pub amount: f64,

    /// Literal command the agent plans to run.
    #[arg(long)]
    pub command: Option<String>,

    /// Catalog domain (case-insensitive).
    #[arg(long)]
    pub domain: String,

    /// Print the evaluation steps alongside the verdict.
    #[arg(long)]
    pub trace: bool,
}

pub fn execute(args: &AuditArgs, ctx: &Context) -> anyhow::Result<ExitCode> {
    let gate = ctx.config.open_gate(&ctx.project_root)?;
    let recorder = ctx.config.recorder_for_audit(&ctx.project_root);

    let mut request =
        AuditRequest::new(args.intent.as_str(), args.domain.as_str()).with_amount(args.amount);
    if let Some(command) = &args.command {
        request = request.with_command(command.as_str());
    }

    let verdict = if args.trace {
        let trace = gate.audit_with_trace(&request)?;
        println!("{}", serde_json::to_string_pretty(&trace)?);
        trace.verdict
    } else {
        let verdict = gate.audit(&request)?;
        println!("{}", serde_json::to_string_pretty(&verdict)?);
        verdict
    };

    if let Some(recorder) = recorder {
        recorder.record(&verdict);
        let (_, failures) = recorder.shutdown();
        if failures > 0 {
            tracing::warn!(failures, "verdict could not be written to the audit log");
        }
    }

    Ok(if verdict.is_blocked() {
        ExitCode::from(EXIT_BLOCKED)
    } else {
        ExitCode::SUCCESS
    })
}
