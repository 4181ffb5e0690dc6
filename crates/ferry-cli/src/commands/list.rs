use chrono::Utc;
use ferry_core::SyncQueue;

use crate::commands::common::{
    format_operation_lines, operation_to_list_item, parse_status, OperationListItem,
};
use crate::error::CliError;

pub fn run_list(
    queue: &SyncQueue,
    status: Option<&str>,
    limit: usize,
    as_json: bool,
) -> Result<(), CliError> {
    let status = parse_status(status)?;
    let operations = queue.list(status, limit)?;

    if as_json {
        let json_items = operations
            .iter()
            .map(operation_to_list_item)
            .collect::<Vec<OperationListItem>>();
        println!("{}", serde_json::to_string_pretty(&json_items)?);
        return Ok(());
    }

    if operations.is_empty() {
        println!("Queue is empty.");
        return Ok(());
    }

    for line in format_operation_lines(&operations, Utc::now().timestamp_millis()) {
        println!("{line}");
    }
    Ok(())
}
