//! Mapping from operation kinds to remote endpoints

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::models::OperationKind;

/// Placeholder substituted with the operation's scope.
pub const SCOPE_PLACEHOLDER: &str = "{scope}";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Post,
    Put,
    Delete,
}

impl HttpMethod {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where and how an operation kind is delivered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    /// Absolute URL, possibly containing `{scope}`
    pub url: String,
    pub method: HttpMethod,
    /// Whether a replay is harmless even without server-side de-duplication.
    /// Ambiguous failures are replayed either way; this only changes how
    /// they are reported.
    pub retry_safe: bool,
}

impl Endpoint {
    pub fn new(url: impl Into<String>, method: HttpMethod) -> Self {
        Self {
            url: url.into(),
            method,
            retry_safe: true,
        }
    }

    #[must_use]
    pub const fn not_retry_safe(mut self) -> Self {
        self.retry_safe = false;
        self
    }

    pub fn needs_scope(&self) -> bool {
        self.url.contains(SCOPE_PLACEHOLDER)
    }

    /// Produce the concrete URL for an operation in `scope`.
    pub fn render(&self, scope: Option<&str>) -> Result<String> {
        if !self.needs_scope() {
            return Ok(self.url.clone());
        }

        let scope = scope.ok_or_else(|| {
            Error::Configuration(format!("endpoint {} requires a scope", self.url))
        })?;
        if scope.is_empty()
            || scope
                .chars()
                .any(|ch| ch.is_whitespace() || matches!(ch, '/' | '?' | '#' | '%'))
        {
            return Err(Error::InvalidInput(format!(
                "scope '{scope}' cannot be used in a URL path"
            )));
        }
        Ok(self.url.replace(SCOPE_PLACEHOLDER, scope))
    }
}

/// Resolves operation kinds to endpoints. Supplied by the host application.
pub trait EndpointResolver: Send + Sync {
    fn resolve(&self, kind: OperationKind) -> Option<Endpoint>;
}

/// Table-backed resolver.
#[derive(Debug, Clone, Default)]
pub struct StaticEndpointResolver {
    routes: HashMap<OperationKind, Endpoint>,
}

impl StaticEndpointResolver {
    /// An empty table; every kind is unmapped.
    pub fn new() -> Self {
        Self::default()
    }

    /// The standard route table rooted at `base_url`.
    pub fn with_defaults(base_url: &str) -> Self {
        let base = base_url.trim_end_matches('/');
        let league = |path: &str| format!("{base}/api/leagues/{SCOPE_PLACEHOLDER}/{path}");

        let routes = [
            (
                OperationKind::LineupChange,
                Endpoint::new(league("lineup"), HttpMethod::Put),
            ),
            (
                OperationKind::WaiverClaim,
                Endpoint::new(league("waivers/claim"), HttpMethod::Post),
            ),
            (
                OperationKind::TradeProposal,
                Endpoint::new(league("trades/propose"), HttpMethod::Post).not_retry_safe(),
            ),
            (
                OperationKind::TradeResponse,
                Endpoint::new(league("trades/respond"), HttpMethod::Post),
            ),
            (
                OperationKind::DraftPick,
                Endpoint::new(league("draft/pick"), HttpMethod::Post),
            ),
            (
                OperationKind::RosterAdd,
                Endpoint::new(league("roster/add"), HttpMethod::Post),
            ),
            (
                OperationKind::RosterDrop,
                Endpoint::new(league("roster/drop"), HttpMethod::Delete),
            ),
            (
                OperationKind::SettingsUpdate,
                Endpoint::new(format!("{base}/api/user/settings"), HttpMethod::Put),
            ),
            (
                OperationKind::ScoreUpdate,
                Endpoint::new(format!("{base}/api/scores/update"), HttpMethod::Put),
            ),
            (
                OperationKind::AnalyticsEvent,
                Endpoint::new(format!("{base}/api/analytics/event"), HttpMethod::Post),
            ),
            (
                OperationKind::ChatMessage,
                Endpoint::new(league("chat"), HttpMethod::Post).not_retry_safe(),
            ),
        ];

        Self {
            routes: routes.into_iter().collect(),
        }
    }

    #[must_use]
    pub fn with_route(mut self, kind: OperationKind, endpoint: Endpoint) -> Self {
        self.routes.insert(kind, endpoint);
        self
    }

    pub fn remove(&mut self, kind: OperationKind) -> Option<Endpoint> {
        self.routes.remove(&kind)
    }
}

impl EndpointResolver for StaticEndpointResolver {
    fn resolve(&self, kind: OperationKind) -> Option<Endpoint> {
        self.routes.get(&kind).cloned()
    }
}
