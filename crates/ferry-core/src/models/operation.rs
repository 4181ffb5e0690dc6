//! Sync operation model

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::OperationKind;

/// A unique identifier for a queued operation, using UUID v7 (time-sortable)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OperationId(Uuid);

impl OperationId {
    /// Create a new unique operation ID using UUID v7
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Get the string representation of this ID
    #[must_use]
    pub fn as_str(&self) -> String {
        self.0.to_string()
    }
}

impl Default for OperationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for OperationId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Lifecycle state of an operation.
///
/// `pending -> in-flight -> {completed | pending | permanently-failed}`.
/// `completed` and `permanently-failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OperationStatus {
    Pending,
    InFlight,
    Completed,
    PermanentlyFailed,
}

impl OperationStatus {
    pub const ALL: [Self; 4] = [
        Self::Pending,
        Self::InFlight,
        Self::Completed,
        Self::PermanentlyFailed,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InFlight => "in-flight",
            Self::Completed => "completed",
            Self::PermanentlyFailed => "permanently-failed",
        }
    }

    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::PermanentlyFailed)
    }
}

impl fmt::Display for OperationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OperationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('_', "-");
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == normalized)
            .ok_or_else(|| format!("unknown operation status: {s}"))
    }
}

/// A single queued mutation awaiting delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncOperation {
    /// Unique identifier, assigned at enqueue time
    pub id: OperationId,
    /// What the operation does; picks the endpoint and default priority
    pub kind: OperationKind,
    /// Kind-specific request body
    pub payload: serde_json::Value,
    /// Higher runs first
    pub priority: i32,
    /// Dispatch attempts made so far
    pub attempts: u32,
    /// Ceiling after which the operation is permanently failed
    pub max_attempts: u32,
    /// Enqueue timestamp (Unix ms)
    pub created_at: i64,
    /// Earliest retry time (Unix ms)
    pub next_eligible_at: i64,
    /// Current lifecycle state
    pub status: OperationStatus,
    /// Optional correlation key, e.g. a league id
    pub scope: Option<String>,
    /// Last status change (Unix ms); the claim time while in flight
    pub updated_at: i64,
    /// Reason for the most recent failed attempt
    pub last_error: Option<String>,
}

impl SyncOperation {
    /// Create a new pending operation, immediately eligible.
    #[must_use]
    pub fn new(
        kind: OperationKind,
        payload: serde_json::Value,
        max_attempts: u32,
        now_ms: i64,
    ) -> Self {
        Self {
            id: OperationId::new(),
            kind,
            payload,
            priority: kind.default_priority(),
            attempts: 0,
            max_attempts,
            created_at: now_ms,
            next_eligible_at: now_ms,
            status: OperationStatus::Pending,
            scope: None,
            updated_at: now_ms,
            last_error: None,
        }
    }

    #[must_use]
    pub const fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    #[must_use]
    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = Some(scope.into());
        self
    }

    /// Whether another retryable failure would exhaust the attempt budget.
    ///
    /// `attempts` already counts the attempt that just failed.
    pub const fn attempts_exhausted(&self) -> bool {
        self.attempts >= self.max_attempts
    }

    /// Human-readable one-liner, e.g. "waiver claim (league-42)".
    #[must_use]
    pub fn summary(&self) -> String {
        match &self.scope {
            Some(scope) => format!("{} ({scope})", self.kind.label()),
            None => self.kind.label().to_string(),
        }
    }
}
