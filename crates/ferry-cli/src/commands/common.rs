use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use ferry_core::connectivity::ConnectivityMonitor;
use ferry_core::db::SqliteOperationStore;
use ferry_core::dispatch::HttpTransport;
use ferry_core::{OperationId, OperationStatus, QueueConfig, SyncOperation, SyncQueue};
use serde::Serialize;
use serde_json::Value;

use crate::error::CliError;

#[derive(Debug, Serialize)]
pub struct OperationListItem {
    pub id: String,
    pub kind: String,
    pub status: String,
    pub summary: String,
    pub priority: i32,
    pub attempts: u32,
    pub max_attempts: u32,
    pub scope: Option<String>,
    pub created_at: i64,
    pub next_eligible_at: i64,
    pub relative_time: String,
    pub last_error: Option<String>,
}

pub fn resolve_db_path(cli_db_path: Option<PathBuf>) -> PathBuf {
    cli_db_path
        .or_else(|| env::var_os("FERRY_DB_PATH").map(PathBuf::from))
        .unwrap_or_else(default_db_path)
}

pub fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("ferry")
        .join("queue.db")
}

/// The config file wins over the environment when both are present.
pub fn load_config(config_path: Option<&Path>) -> Result<QueueConfig, CliError> {
    let config = match config_path {
        Some(path) => QueueConfig::load(path)?,
        None => QueueConfig::from_env()?,
    };
    Ok(config)
}

pub fn open_store(db_path: &Path) -> Result<SqliteOperationStore, CliError> {
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    Ok(SqliteOperationStore::open(db_path)?)
}

pub fn open_queue(
    db_path: &Path,
    config: QueueConfig,
    offline: bool,
) -> Result<SyncQueue, CliError> {
    let store = open_store(db_path)?;
    let transport = HttpTransport::new(config.auth_token.clone())?;
    let connectivity = Arc::new(ConnectivityMonitor::new(!offline));

    Ok(SyncQueue::builder(Arc::new(store), transport)
        .config(config)
        .connectivity(connectivity)
        .build()?)
}

pub fn parse_payload(raw: Option<&str>) -> Result<Value, CliError> {
    match raw.map(str::trim) {
        None | Some("") => Ok(Value::Object(serde_json::Map::new())),
        Some(raw) => {
            serde_json::from_str(raw).map_err(|error| CliError::InvalidPayload(error.to_string()))
        }
    }
}

pub fn parse_status(raw: Option<&str>) -> Result<Option<OperationStatus>, CliError> {
    raw.map(|raw| raw.parse::<OperationStatus>().map_err(CliError::InvalidStatus))
        .transpose()
}

pub fn parse_operation_id(raw: &str) -> Result<OperationId, CliError> {
    raw.trim()
        .parse()
        .map_err(|_| CliError::InvalidId(raw.trim().to_string()))
}

pub fn normalize_scope(scope: &str) -> Result<String, CliError> {
    let trimmed = scope.trim();
    if trimmed.is_empty() {
        Err(CliError::EmptyScope)
    } else {
        Ok(trimmed.to_string())
    }
}

pub fn operation_to_list_item(operation: &SyncOperation) -> OperationListItem {
    let now_ms = Utc::now().timestamp_millis();
    OperationListItem {
        id: operation.id.to_string(),
        kind: operation.kind.as_str().to_string(),
        status: operation.status.as_str().to_string(),
        summary: operation.summary(),
        priority: operation.priority,
        attempts: operation.attempts,
        max_attempts: operation.max_attempts,
        scope: operation.scope.clone(),
        created_at: operation.created_at,
        next_eligible_at: operation.next_eligible_at,
        relative_time: format_relative_time(operation.created_at, now_ms),
        last_error: operation.last_error.clone(),
    }
}

pub fn format_operation_lines(operations: &[SyncOperation], now_ms: i64) -> Vec<String> {
    operations
        .iter()
        .map(|operation| {
            let id = operation.id.to_string();
            let short_id = id.chars().take(13).collect::<String>();
            let attempts = format!("{}/{}", operation.attempts, operation.max_attempts);
            let relative_time = format_relative_time(operation.created_at, now_ms);
            let line = format!(
                "{short_id:<13}  {:<18}  {:<30}  {attempts:>5}  {relative_time}",
                operation.status.as_str(),
                operation.summary(),
            );

            match &operation.last_error {
                Some(error) => format!("{line}  ({error})"),
                None => line,
            }
        })
        .collect()
}

pub fn format_timestamp(timestamp_ms: i64) -> String {
    chrono::DateTime::from_timestamp_millis(timestamp_ms).map_or_else(
        || timestamp_ms.to_string(),
        |date_time| date_time.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
    )
}

pub fn format_relative_time(timestamp_ms: i64, now_ms: i64) -> String {
    let diff = now_ms.saturating_sub(timestamp_ms);
    let minute = 60_000;
    let hour = 60 * minute;
    let day = 24 * hour;

    if diff < minute {
        "just now".to_string()
    } else if diff < hour {
        format!("{}m ago", diff / minute)
    } else if diff < day {
        format!("{}h ago", diff / hour)
    } else {
        format!("{}d ago", diff / day)
    }
}

pub fn plural(count: usize, noun: &str) -> String {
    if count == 1 {
        format!("{count} {noun}")
    } else {
        format!("{count} {noun}s")
    }
}
