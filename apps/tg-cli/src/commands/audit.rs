// audit.rs - Audit subcommands: verify, tail.

use std::path::PathBuf;

use clap::Subcommand;
use tg_audit::{AuditError, AuditLog};
use tg_gateway::GatewayConfig;

#[derive(Subcommand)]
pub enum AuditCommands {
    /// Verify the audit log hash chain integrity.
    Verify {
        /// Path to audit log (defaults to .toolgate/audit.jsonl).
        #[arg(long)]
        log: Option<PathBuf>,
    },
    /// Show recent consent events.
    Tail {
        /// Path to audit log (defaults to .toolgate/audit.jsonl).
        #[arg(long)]
        log: Option<PathBuf>,
        /// Number of events to show.
        #[arg(short, default_value = "10")]
        n: usize,
    },
}

pub fn execute(cmd: &AuditCommands, config: &GatewayConfig) -> anyhow::Result<()> {
    match cmd {
        AuditCommands::Verify { log } => {
            let Some(path) = log_path(log, config) else {
                println!("No audit log configured.");
                return Ok(());
            };
            if !path.exists() {
                println!("No audit log found at {}", path.display());
                return Ok(());
            }

            match AuditLog::verify_chain(&path) {
                Ok(count) => {
                    println!("Audit log verified: {} event(s), hash chain intact.", count);
                }
                Err(AuditError::IntegrityViolation {
                    line,
                    expected,
                    actual,
                }) => {
                    println!("INTEGRITY VIOLATION at line {}:", line);
                    println!("  Expected previous_hash: {}", expected);
                    println!("  Actual previous_hash:   {}", actual);
                    println!();
                    println!("The audit log may have been tampered with.");
                    anyhow::bail!("Audit log integrity check failed");
                }
                Err(e) => return Err(e.into()),
            }
        }

        AuditCommands::Tail { log, n } => {
            let Some(path) = log_path(log, config) else {
                println!("No audit log configured.");
                return Ok(());
            };
            if !path.exists() {
                println!("No audit log found at {}", path.display());
                return Ok(());
            }

            let events = AuditLog::read_all(&path)?;
            let start = events.len().saturating_sub(*n);
            let recent = &events[start..];

            if recent.is_empty() {
                println!("No audit events.");
                return Ok(());
            }

            println!(
                "{:<20} {:<16} {:<8} {:<24} OUTCOME",
                "TIMESTAMP", "SUBJECT", "ACTION", "SUB-CAPABILITY"
            );
            println!("{}", "-".repeat(84));

            for event in recent {
                println!(
                    "{:<20} {:<16} {:<8} {:<24} {}",
                    event.timestamp.format("%Y-%m-%d %H:%M:%S"),
                    event.subject_id,
                    event.action.to_string(),
                    event.sub_capability_key,
                    event.outcome.as_deref().unwrap_or("-"),
                );
            }
        }
    }

    Ok(())
}

fn log_path(explicit: &Option<PathBuf>, config: &GatewayConfig) -> Option<PathBuf> {
    explicit.clone().or_else(|| config.audit_log.clone())
}
