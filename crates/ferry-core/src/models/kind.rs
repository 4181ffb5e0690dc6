//! Operation kind model

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The closed set of mutations the queue knows how to deliver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OperationKind {
    LineupChange,
    WaiverClaim,
    TradeProposal,
    TradeResponse,
    DraftPick,
    RosterAdd,
    RosterDrop,
    SettingsUpdate,
    ScoreUpdate,
    AnalyticsEvent,
    ChatMessage,
}

impl OperationKind {
    /// Every kind, in declaration order.
    pub const ALL: [Self; 11] = [
        Self::LineupChange,
        Self::WaiverClaim,
        Self::TradeProposal,
        Self::TradeResponse,
        Self::DraftPick,
        Self::RosterAdd,
        Self::RosterDrop,
        Self::SettingsUpdate,
        Self::ScoreUpdate,
        Self::AnalyticsEvent,
        Self::ChatMessage,
    ];

    /// Stable wire/storage name, e.g. `lineup-change`.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::LineupChange => "lineup-change",
            Self::WaiverClaim => "waiver-claim",
            Self::TradeProposal => "trade-proposal",
            Self::TradeResponse => "trade-response",
            Self::DraftPick => "draft-pick",
            Self::RosterAdd => "roster-add",
            Self::RosterDrop => "roster-drop",
            Self::SettingsUpdate => "settings-update",
            Self::ScoreUpdate => "score-update",
            Self::AnalyticsEvent => "analytics-event",
            Self::ChatMessage => "chat-message",
        }
    }

    /// Default priority weight; higher runs first.
    pub const fn default_priority(self) -> i32 {
        match self {
            Self::LineupChange => 10,
            Self::DraftPick => 9,
            Self::TradeResponse => 8,
            Self::WaiverClaim => 7,
            Self::TradeProposal => 6,
            Self::RosterAdd | Self::RosterDrop => 5,
            Self::ScoreUpdate => 4,
            Self::ChatMessage => 3,
            Self::SettingsUpdate => 2,
            Self::AnalyticsEvent => 1,
        }
    }

    /// User-facing text shown when an operation of this kind is stored while offline.
    pub const fn offline_message(self) -> &'static str {
        match self {
            Self::LineupChange => "Lineup changes saved offline. Will sync when online.",
            Self::WaiverClaim => "Waiver claim saved offline. Will process when online.",
            Self::TradeProposal => "Trade proposal saved offline. Will send when online.",
            Self::TradeResponse => "Trade response saved offline. Will sync when online.",
            Self::DraftPick => "Draft pick saved offline. Will sync when online.",
            Self::RosterAdd => "Player add saved offline. Will sync when online.",
            Self::RosterDrop => "Player drop saved offline. Will sync when online.",
            Self::SettingsUpdate => "Settings saved offline. Will sync when online.",
            Self::ScoreUpdate => "Score update saved offline. Will sync when online.",
            Self::AnalyticsEvent => "Event logged offline. Will sync when online.",
            Self::ChatMessage => "Message saved offline. Will send when online.",
        }
    }

    /// Short human-readable label used in failure summaries.
    pub const fn label(self) -> &'static str {
        match self {
            Self::LineupChange => "lineup change",
            Self::WaiverClaim => "waiver claim",
            Self::TradeProposal => "trade proposal",
            Self::TradeResponse => "trade response",
            Self::DraftPick => "draft pick",
            Self::RosterAdd => "roster add",
            Self::RosterDrop => "roster drop",
            Self::SettingsUpdate => "settings update",
            Self::ScoreUpdate => "score update",
            Self::AnalyticsEvent => "analytics event",
            Self::ChatMessage => "chat message",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown kind name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown operation kind: {0}")]
pub struct UnknownKind(pub String);

impl FromStr for OperationKind {
    type Err = UnknownKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('_', "-");
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == normalized)
            .ok_or_else(|| UnknownKind(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_roundtrips_every_kind() {
        for kind in OperationKind::ALL {
            assert_eq!(kind.as_str().parse::<OperationKind>().unwrap(), kind);
        }
    }

    #[test]
    fn parse_accepts_underscores_and_case() {
        assert_eq!(
            "Waiver_Claim".parse::<OperationKind>().unwrap(),
            OperationKind::WaiverClaim
        );
    }

    #[test]
    fn parse_rejects_unknown() {
        let error = "teleport".parse::<OperationKind>().unwrap_err();
        assert_eq!(error.to_string(), "unknown operation kind: teleport");
    }

    #[test]
    fn lineup_outranks_analytics() {
        assert!(
            OperationKind::LineupChange.default_priority()
                > OperationKind::AnalyticsEvent.default_priority()
        );
    }

    #[test]
    fn serde_uses_kebab_case() {
        let json = serde_json::to_string(&OperationKind::TradeResponse).unwrap();
        assert_eq!(json, "\"trade-response\"");
    }
}
