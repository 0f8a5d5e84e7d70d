// log.rs — Verdict log subcommands: verify, tail.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Subcommand;
use svp_audit::{AuditError, RollingAuditLog};

use crate::Context;

#[derive(Subcommand)]
pub enum LogCommands {
    /// Verify the hash chain of the retained records.
    Verify {
        /// Path to the log (defaults to the configured one).
        #[arg(long)]
        log: Option<PathBuf>,
    },
    /// Show recent verdicts.
    Tail {
        /// Path to the log (defaults to the configured one).
        #[arg(long)]
        log: Option<PathBuf>,
        /// Number of verdicts to show.
        #[arg(short, default_value = "10")]
        n: usize,
    },
}

pub fn execute(cmd: &LogCommands, ctx: &Context) -> anyhow::Result<ExitCode> {
    match cmd {
        LogCommands::Verify { log } => {
            let path = log_path(log, ctx);
            if !path.exists() {
                println!("No audit log found at {}", path.display());
                return Ok(ExitCode::SUCCESS);
            }

            match RollingAuditLog::verify_chain(&path) {
                Ok(checked) => {
                    println!("Audit log verified: {checked} record(s), hash chain intact.");
                }
                Err(AuditError::IntegrityViolation {
                    line,
                    expected,
                    actual,
                }) => {
                    println!("INTEGRITY VIOLATION at line {line}:");
                    println!("  Expected previous_hash: {expected}");
                    println!("  Actual previous_hash:   {actual}");
                    println!();
                    println!("The audit log may have been tampered with.");
                    anyhow::bail!("Audit log integrity check failed");
                }
                Err(e) => return Err(e.into()),
            }
        }

        LogCommands::Tail { log, n } => {
            let path = log_path(log, ctx);
            if !path.exists() {
                println!("No audit log found at {}", path.display());
                return Ok(ExitCode::SUCCESS);
            }

            let records = RollingAuditLog::read_all(&path)?;
            let start = records.len().saturating_sub(*n);
            let recent = &records[start..];

            if recent.is_empty() {
                println!("No verdicts recorded.");
                return Ok(ExitCode::SUCCESS);
            }

            println!(
                "{:<20} {:<9} {:<16} {:<20} REASON",
                "TIMESTAMP", "STATUS", "DOMAIN", "LAYER"
            );
            println!("{}", "-".repeat(90));

            for record in recent {
                println!(
                    "{:<20} {:<9} {:<16} {:<20} {}",
                    record.timestamp.format("%Y-%m-%d %H:%M:%S"),
                    record.status.to_string(),
                    record.domain,
                    record.layer.map(|l| l.as_str()).unwrap_or("-"),
                    record.reason.as_deref().unwrap_or("-"),
                );
            }
        }
    }

    Ok(ExitCode::SUCCESS)
}

fn log_path(log: &Option<PathBuf>, ctx: &Context) -> PathBuf {
    log.clone()
        .unwrap_or_else(|| ctx.config.audit_log_path(&ctx.project_root))
}
