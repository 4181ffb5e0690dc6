use ferry_core::sync::PassOutcome;
use ferry_core::SyncQueue;

use crate::commands::common::plural;
use crate::error::CliError;

pub async fn run_flush(queue: &SyncQueue) -> Result<(), CliError> {
    report_pass(queue.flush().await)
}

pub fn report_pass(outcome: PassOutcome) -> Result<(), CliError> {
    match describe_pass(&outcome) {
        Some(line) => {
            println!("{line}");
            Ok(())
        }
        None => match outcome {
            PassOutcome::Aborted { reason } => Err(CliError::SyncAborted(reason)),
            _ => Ok(()),
        },
    }
}

pub fn describe_pass(outcome: &PassOutcome) -> Option<String> {
    match outcome {
        PassOutcome::Completed(report) if report.attempted() == 0 => {
            Some("Nothing to sync".to_string())
        }
        PassOutcome::Completed(report) => Some(format!(
            "Synced {}, {} to retry, {} failed",
            plural(report.succeeded, "operation"),
            report.retried,
            report.failed
        )),
        PassOutcome::AlreadyRunning => Some("A sync pass is already running".to_string()),
        PassOutcome::Offline => Some("Offline; nothing was sent".to_string()),
        PassOutcome::Aborted { .. } => None,
    }
}
