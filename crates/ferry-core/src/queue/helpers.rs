//! Typed enqueue helpers for the fantasy-league operations

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::dispatch::Transport;
use crate::error::Result;
use crate::models::{OperationId, OperationKind};

use super::{EnqueueOptions, SyncQueue};

/// Answer to a trade proposal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeDecision {
    Accept,
    Reject,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RosterAction {
    Add,
    Drop,
}

impl RosterAction {
    pub const fn kind(self) -> OperationKind {
        match self {
            Self::Add => OperationKind::RosterAdd,
            Self::Drop => OperationKind::RosterDrop,
        }
    }
}

/// Adds the enqueue timestamp every helper payload carries.
fn stamped(mut payload: Value, now_ms: i64) -> Value {
    if let Value::Object(fields) = &mut payload {
        fields.insert("timestamp".to_string(), json!(now_ms));
    }
    payload
}

impl<T: Transport> SyncQueue<T> {
    fn enqueue_for_league(
        &self,
        kind: OperationKind,
        league_id: &str,
        payload: Value,
    ) -> Result<OperationId> {
        let payload = stamped(payload, self.clock.now_ms());
        self.enqueue(kind, payload, EnqueueOptions::new().scope(league_id))
    }

    pub fn queue_lineup_change(&self, league_id: &str, changes: Value) -> Result<OperationId> {
        self.enqueue_for_league(
            OperationKind::LineupChange,
            league_id,
            json!({ "leagueId": league_id, "changes": changes }),
        )
    }

    pub fn queue_waiver_claim(
        &self,
        league_id: &str,
        player_id: &str,
        drop_player_id: Option<&str>,
    ) -> Result<OperationId> {
        self.enqueue_for_league(
            OperationKind::WaiverClaim,
            league_id,
            json!({
                "leagueId": league_id,
                "playerId": player_id,
                "dropPlayerId": drop_player_id,
            }),
        )
    }

    pub fn queue_trade_proposal(&self, league_id: &str, proposal: Value) -> Result<OperationId> {
        self.enqueue_for_league(
            OperationKind::TradeProposal,
            league_id,
            json!({ "leagueId": league_id, "proposal": proposal }),
        )
    }

    pub fn queue_trade_response(
        &self,
        league_id: &str,
        trade_id: &str,
        response: TradeDecision,
    ) -> Result<OperationId> {
        self.enqueue_for_league(
            OperationKind::TradeResponse,
            league_id,
            json!({ "leagueId": league_id, "tradeId": trade_id, "response": response }),
        )
    }

    pub fn queue_draft_pick(&self, league_id: &str, player_id: &str, pick: u32) -> Result<OperationId> {
        self.enqueue_for_league(
            OperationKind::DraftPick,
            league_id,
            json!({ "leagueId": league_id, "playerId": player_id, "pick": pick }),
        )
    }

    pub fn queue_roster_change(
        &self,
        league_id: &str,
        action: RosterAction,
        player_id: &str,
    ) -> Result<OperationId> {
        self.enqueue_for_league(
            action.kind(),
            league_id,
            json!({ "leagueId": league_id, "playerId": player_id, "action": action }),
        )
    }

    pub fn queue_chat_message(&self, league_id: &str, message: &str) -> Result<OperationId> {
        self.enqueue_for_league(
            OperationKind::ChatMessage,
            league_id,
            json!({ "leagueId": league_id, "message": message }),
        )
    }

    /// Analytics ride along with the next pass instead of triggering one.
    pub fn queue_analytics_event(&self, event: &str, data: Value) -> Result<OperationId> {
        let payload = stamped(json!({ "event": event, "data": data }), self.clock.now_ms());
        self.enqueue(
            OperationKind::AnalyticsEvent,
            payload,
            EnqueueOptions::new().deferred(),
        )
    }
}
