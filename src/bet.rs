//! Bet ledger entries: the read-only projection of bets placed with the bet service.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::Money;
use crate::model::MatchId;
use crate::odds::{Odds, Outcome, potential_payout};

/// Settlement state of a bet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BetStatus {
    #[serde(alias = "Pending")]
    Pending,
    #[serde(alias = "Won")]
    Won,
    #[serde(alias = "Lost")]
    Lost,
}

impl BetStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, BetStatus::Pending)
    }
}

/// Display group of a bet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Pending,
    Settled,
}

/// Error when recording a settlement.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SettleError {
    #[error("bet on match {0} is already settled as {1:?}")]
    AlreadySettled(MatchId, BetStatus),
    #[error("bet on match {0} cannot be settled to pending")]
    NotTerminal(MatchId),
    #[error("bet on match {0} has negative payout {1}")]
    NegativePayout(MatchId, Money),
}

/// A submitted bet.
///
/// Match, outcome, stake, and odds are frozen at placement. Only the status and
/// payout change, exactly once, when the bet service settles it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "BetRecord", into = "BetRecord")]
pub struct BetLedgerEntry {
    match_id: MatchId,
    outcome: Outcome,
    stake: Money,
    odds: Odds,
    status: BetStatus,
    payout: Option<Money>,
    created_at: DateTime<Utc>,
}

impl BetLedgerEntry {
    pub fn pending(
        match_id: MatchId,
        outcome: Outcome,
        stake: Money,
        odds: Odds,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            match_id,
            outcome,
            stake,
            odds,
            status: BetStatus::Pending,
            payout: None,
            created_at,
        }
    }

    pub fn match_id(&self) -> MatchId {
        self.match_id
    }

    pub fn outcome(&self) -> Outcome {
        self.outcome
    }

    pub fn stake(&self) -> Money {
        self.stake
    }

    /// Odds at placement, never the current quote.
    pub fn odds(&self) -> Odds {
        self.odds
    }

    pub fn status(&self) -> BetStatus {
        self.status
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Record the authoritative settlement from the bet service.
    pub fn settle(&mut self, status: BetStatus, payout: Money) -> Result<(), SettleError> {
        if self.status.is_terminal() {
            return Err(SettleError::AlreadySettled(self.match_id, self.status));
        }
        if !status.is_terminal() {
            return Err(SettleError::NotTerminal(self.match_id));
        }
        if payout.is_negative() {
            return Err(SettleError::NegativePayout(self.match_id, payout));
        }
        self.status = status;
        self.payout = Some(payout);
        Ok(())
    }

    /// Payout to show: none while pending, the recorded figure once settled.
    pub fn displayed_payout(&self) -> Option<Money> {
        match self.status {
            BetStatus::Pending => None,
            BetStatus::Won => self.payout,
            BetStatus::Lost => Some(self.payout.unwrap_or_default()),
        }
    }

    /// Frozen stake x odds, only meaningful before settlement.
    pub fn display_estimate(&self) -> Option<Money> {
        (self.status == BetStatus::Pending).then(|| potential_payout(self.stake, Some(self.odds)))
    }
}

pub fn classify(entry: &BetLedgerEntry) -> Classification {
    match entry.status {
        BetStatus::Pending => Classification::Pending,
        BetStatus::Won | BetStatus::Lost => Classification::Settled,
    }
}

/// Split bets into (pending, settled) by status alone.
pub fn partition(
    entries: impl IntoIterator<Item = BetLedgerEntry>,
) -> (Vec<BetLedgerEntry>, Vec<BetLedgerEntry>) {
    entries
        .into_iter()
        .partition(|entry| classify(entry) == Classification::Pending)
}

/// Bet history as served by the account service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BetHistory {
    #[serde(default)]
    pub pending: Vec<BetLedgerEntry>,
    #[serde(default)]
    pub settled: Vec<BetLedgerEntry>,
}

impl BetHistory {
    /// All entries regardless of the server's grouping.
    pub fn into_entries(self) -> impl Iterator<Item = BetLedgerEntry> {
        self.pending.into_iter().chain(self.settled)
    }
}

/// Wire shape of a bet.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct BetRecord {
    match_id: MatchId,
    #[serde(default)]
    bet_choice: Option<Outcome>,
    /// Older entries carry the outcome here instead.
    #[serde(default, skip_serializing)]
    team: Option<Outcome>,
    stake: Money,
    odds: Odds,
    status: BetStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    payout: Option<Money>,
    created_at: DateTime<Utc>,
}

impl TryFrom<BetRecord> for BetLedgerEntry {
    type Error = String;

    fn try_from(record: BetRecord) -> Result<Self, Self::Error> {
        let outcome = record
            .bet_choice
            .or(record.team)
            .ok_or_else(|| format!("bet on match {} has no outcome", record.match_id))?;
        let payout = match (record.status, record.payout) {
            (BetStatus::Pending, Some(payout)) => {
                warn!(
                    match_id = %record.match_id,
                    payout = %payout,
                    "pending bet carries a payout, ignoring it"
                );
                None
            }
            (BetStatus::Won, None) => {
                warn!(match_id = %record.match_id, "won bet carries no payout");
                None
            }
            (_, payout) => payout,
        };
        Ok(Self {
            match_id: record.match_id,
            outcome,
            stake: record.stake,
            odds: record.odds,
            status: record.status,
            payout,
            created_at: record.created_at,
        })
    }
}

impl From<BetLedgerEntry> for BetRecord {
    fn from(entry: BetLedgerEntry) -> Self {
        Self {
            match_id: entry.match_id,
            bet_choice: Some(entry.outcome),
            team: None,
            stake: entry.stake,
            odds: entry.odds,
            status: entry.status,
            payout: entry.payout,
            created_at: entry.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(match_id: u64) -> BetLedgerEntry {
        BetLedgerEntry::pending(
            MatchId(match_id),
            Outcome::Home,
            Money::from_units(100),
            Odds::from_float(2.5).unwrap(),
            Utc::now(),
        )
    }

    #[test]
    fn pending_has_estimate_but_no_payout() {
        let bet = entry(1);
        assert_eq!(classify(&bet), Classification::Pending);
        assert_eq!(bet.displayed_payout(), None);
        assert_eq!(bet.display_estimate(), Some(Money::from_units(250)));
    }

    #[test]
    fn settle_records_authoritative_payout() {
        let mut bet = entry(1);
        // server figure wins even when it differs from stake x odds
        bet.settle(BetStatus::Won, Money::from_cents(24_990)).unwrap();

        assert_eq!(classify(&bet), Classification::Settled);
        assert_eq!(bet.displayed_payout(), Some(Money::from_cents(24_990)));
        assert_eq!(bet.display_estimate(), None);
        assert_eq!(bet.odds(), Odds::from_float(2.5).unwrap());
    }

    #[test]
    fn settle_happens_exactly_once() {
        let mut bet = entry(1);
        bet.settle(BetStatus::Lost, Money::zero()).unwrap();

        let result = bet.settle(BetStatus::Won, Money::from_units(250));
        assert_eq!(
            result,
            Err(SettleError::AlreadySettled(MatchId(1), BetStatus::Lost))
        );
        assert_eq!(bet.status(), BetStatus::Lost);
    }

    #[test]
    fn settle_to_pending_fails() {
        let mut bet = entry(2);
        assert_eq!(
            bet.settle(BetStatus::Pending, Money::zero()),
            Err(SettleError::NotTerminal(MatchId(2)))
        );
    }

    #[test]
    fn lost_without_payout_displays_zero() {
        let json = r#"{"match_id": 3, "bet_choice": "away", "stake": 10, "odds": 3.1,
                       "status": "lost", "created_at": "2025-05-01T12:00:00Z"}"#;
        let bet: BetLedgerEntry = serde_json::from_str(json).unwrap();
        assert_eq!(bet.displayed_payout(), Some(Money::zero()));
        assert_eq!(bet.outcome(), Outcome::Away);
    }

    #[test]
    fn pending_wire_payout_is_dropped() {
        let json = r#"{"match_id": 3, "team": "draw", "stake": 10, "odds": 3.1,
                       "status": "pending", "payout": 31, "created_at": "2025-05-01T12:00:00Z"}"#;
        let bet: BetLedgerEntry = serde_json::from_str(json).unwrap();
        assert_eq!(bet.outcome(), Outcome::Draw);
        assert_eq!(bet.displayed_payout(), None);
    }

    #[test]
    fn won_without_payout_stays_won() {
        let json = r#"{"match_id": 5, "bet_choice": "home", "stake": 10, "odds": 2,
                       "status": "won", "created_at": "2025-05-01T12:00:00Z"}"#;
        let bet: BetLedgerEntry = serde_json::from_str(json).unwrap();
        assert_eq!(bet.status(), BetStatus::Won);
        assert_eq!(classify(&bet), Classification::Settled);
        assert_eq!(bet.displayed_payout(), None);
        assert_eq!(bet.display_estimate(), None);
    }

    #[test]
    fn bet_choice_wins_over_team() {
        let json = r#"{"match_id": 4, "team": "home", "bet_choice": "away", "stake": 5,
                       "odds": 2, "status": "Won", "payout": 10, "created_at": "2025-05-01T12:00:00Z"}"#;
        let bet: BetLedgerEntry = serde_json::from_str(json).unwrap();
        assert_eq!(bet.outcome(), Outcome::Away);
        assert_eq!(bet.displayed_payout(), Some(Money::from_units(10)));

        let missing = r#"{"match_id": 4, "stake": 5, "odds": 2, "status": "pending",
                          "created_at": "2025-05-01T12:00:00Z"}"#;
        assert!(serde_json::from_str::<BetLedgerEntry>(missing).is_err());
    }

    #[test]
    fn partition_is_exhaustive_and_disjoint() {
        let mut won = entry(2);
        won.settle(BetStatus::Won, Money::from_units(250)).unwrap();
        let mut lost = entry(3);
        lost.settle(BetStatus::Lost, Money::zero()).unwrap();
        let all = vec![entry(1), won, lost, entry(4)];

        let (pending, settled) = partition(all.clone());
        assert_eq!(pending.len() + settled.len(), all.len());
        assert!(pending.iter().all(|b| b.status() == BetStatus::Pending));
        assert!(settled.iter().all(|b| b.status().is_terminal()));
        for bet in &all {
            let in_pending = pending.contains(bet);
            let in_settled = settled.contains(bet);
            assert!(in_pending ^ in_settled);
        }
    }

    #[test]
    fn history_regroups_by_status() {
        let mut won = entry(2);
        won.settle(BetStatus::Won, Money::from_units(250)).unwrap();
        // server misfiled a settled bet under pending
        let history = BetHistory {
            pending: vec![entry(1), won],
            settled: vec![],
        };
        let (pending, settled) = partition(history.into_entries());
        assert_eq!(pending.len(), 1);
        assert_eq!(settled.len(), 1);
    }
}
