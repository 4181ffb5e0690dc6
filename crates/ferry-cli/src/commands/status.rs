use ferry_core::{QueueStatus, SyncQueue};

use crate::commands::common::format_timestamp;
use crate::error::CliError;

pub fn run_status(queue: &SyncQueue, as_json: bool) -> Result<(), CliError> {
    let status = queue.status()?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&status)?);
    } else {
        for line in format_status_lines(&status) {
            println!("{line}");
        }
    }
    Ok(())
}

pub fn format_status_lines(status: &QueueStatus) -> Vec<String> {
    let last_sync = status
        .last_sync_at
        .map_or_else(|| "never".to_string(), format_timestamp);

    vec![
        format!("Network:    {}", if status.online { "online" } else { "offline" }),
        format!("Pending:    {}", status.pending),
        format!("In flight:  {}", status.in_flight),
        format!("Failed:     {}", status.failed),
        format!("Last sync:  {last_sync}"),
    ]
}
