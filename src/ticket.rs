//! Bet ticket: the in-progress selection for a single match.
//!
//! ```text
//! Empty -> OutcomeSelected -> Ready -> Submitting -> Submitted
//!                               ^          |
//!                               +- Failed <+
//! ```
//!
//! Odds are snapshotted into a [`BetSlip`] when submission starts, so a catalog
//! refresh that lands while the bet is in flight cannot change what is placed.

use tracing::{debug, info, warn};

use crate::Money;
use crate::bet::BetLedgerEntry;
use crate::error::{Error, Result, ValidationError};
use crate::model::{Identity, MatchId, MatchSummary};
use crate::odds::{Odds, OddsQuote, Outcome, potential_payout};
use crate::service::BetService;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TicketState {
    Empty,
    OutcomeSelected,
    Ready,
    Submitting,
    Submitted,
    /// Submission failed. The ticket is editable and can be resubmitted.
    Failed { reason: String },
}

impl TicketState {
    fn is_locked(&self) -> bool {
        matches!(self, TicketState::Submitting | TicketState::Submitted)
    }

    fn lock_reason(&self) -> &'static str {
        match self {
            TicketState::Submitting => "submitting",
            _ => "submitted",
        }
    }
}

/// Frozen bet request, taken at the `Ready -> Submitting` transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BetSlip {
    pub identity: Identity,
    pub match_id: MatchId,
    pub outcome: Outcome,
    pub stake: Money,
    pub odds: Odds,
}

#[derive(Debug, Clone)]
pub struct BetTicket {
    match_id: MatchId,
    quote: OddsQuote,
    outcome: Option<Outcome>,
    stake: Money,
    state: TicketState,
    slip: Option<BetSlip>,
}

impl BetTicket {
    /// Open an empty ticket on a match, copying its current quote.
    pub fn open(summary: &MatchSummary) -> Self {
        Self {
            match_id: summary.id,
            quote: summary.odds.clone(),
            outcome: None,
            stake: Money::zero(),
            state: TicketState::Empty,
            slip: None,
        }
    }

    pub fn match_id(&self) -> MatchId {
        self.match_id
    }

    pub fn outcome(&self) -> Option<Outcome> {
        self.outcome
    }

    pub fn stake(&self) -> Money {
        self.stake
    }

    pub fn state(&self) -> &TicketState {
        &self.state
    }

    /// Live quote while editable; the slip holds the frozen one once submitting.
    pub fn quote(&self) -> &OddsQuote {
        &self.quote
    }

    /// Odds for the selected outcome: frozen once submitting, live before.
    pub fn odds(&self) -> Option<Odds> {
        match &self.slip {
            Some(slip) => Some(slip.odds),
            None => self.quote.get(self.outcome?),
        }
    }

    pub fn potential_payout(&self) -> Money {
        potential_payout(self.stake, self.odds())
    }

    /// Reason of the last failed submission, if the ticket is in `Failed`.
    pub fn failure(&self) -> Option<&str> {
        match &self.state {
            TicketState::Failed { reason } => Some(reason),
            _ => None,
        }
    }

    pub fn select(&mut self, outcome: Outcome) -> Result<(), ValidationError> {
        self.ensure_editable()?;
        if !self.quote.is_offered(outcome) {
            return Err(ValidationError::OutcomeNotOffered(outcome));
        }
        self.outcome = Some(outcome);
        self.recompute_state();
        Ok(())
    }

    /// Zero is accepted (the field is being edited) but keeps the ticket un-submittable.
    pub fn set_stake(&mut self, stake: Money) -> Result<(), ValidationError> {
        self.ensure_editable()?;
        if stake.is_negative() {
            return Err(ValidationError::NonPositiveStake(stake));
        }
        self.stake = stake;
        self.recompute_state();
        Ok(())
    }

    /// Apply a refreshed match snapshot. Ignored once submission has started.
    ///
    /// Returns whether the quote was applied.
    pub fn refresh_odds(&mut self, summary: &MatchSummary) -> bool {
        if summary.id != self.match_id {
            return false;
        }
        if self.state.is_locked() {
            debug!(match_id = %self.match_id, "ticket locked, ignoring odds refresh");
            return false;
        }
        self.quote = summary.odds.clone();
        if let Some(outcome) = self.outcome {
            if !self.quote.is_offered(outcome) {
                info!(match_id = %self.match_id, %outcome, "outcome withdrawn, clearing selection");
                self.outcome = None;
            }
        }
        self.recompute_state();
        true
    }

    /// Check every submission precondition without changing state.
    pub fn validate(&self, identity: Option<&Identity>) -> Result<(), ValidationError> {
        self.ensure_editable()?;
        let outcome = self.outcome.ok_or(ValidationError::NoOutcome)?;
        if !self.stake.is_positive() {
            return Err(ValidationError::NonPositiveStake(self.stake));
        }
        if self.quote.get(outcome).is_none() {
            return Err(ValidationError::OutcomeNotOffered(outcome));
        }
        if identity.is_none_or(|identity| identity.subject.is_empty()) {
            return Err(ValidationError::NotAuthenticated);
        }
        Ok(())
    }

    pub fn is_submittable(&self, identity: Option<&Identity>) -> bool {
        self.validate(identity).is_ok()
    }

    /// Validate, freeze the selection into a [`BetSlip`], and enter `Submitting`.
    pub fn begin_submit(&mut self, identity: Option<&Identity>) -> Result<BetSlip, ValidationError> {
        self.validate(identity)?;
        let (Some(identity), Some(outcome)) = (identity, self.outcome) else {
            return Err(ValidationError::NotAuthenticated);
        };
        let odds = self
            .quote
            .get(outcome)
            .ok_or(ValidationError::OutcomeNotOffered(outcome))?;

        let slip = BetSlip {
            identity: identity.clone(),
            match_id: self.match_id,
            outcome,
            stake: self.stake,
            odds,
        };
        self.slip = Some(slip.clone());
        self.state = TicketState::Submitting;
        Ok(slip)
    }

    /// Record the bet service's answer for the slip returned by [`begin_submit`](Self::begin_submit).
    pub fn complete_submit(&mut self, result: Result<BetLedgerEntry>) -> Result<BetLedgerEntry> {
        if self.state != TicketState::Submitting {
            debug!(match_id = %self.match_id, state = ?self.state, "no submission in flight, ignoring result");
            return result;
        }
        match result {
            Ok(entry) => {
                if let Some(slip) = &self.slip {
                    if entry.odds() != slip.odds {
                        warn!(
                            match_id = %self.match_id,
                            frozen = %slip.odds,
                            recorded = %entry.odds(),
                            "bet service recorded different odds"
                        );
                    }
                }
                info!(
                    match_id = %entry.match_id(),
                    outcome = %entry.outcome(),
                    stake = %entry.stake(),
                    odds = %entry.odds(),
                    "bet placed"
                );
                self.state = TicketState::Submitted;
                Ok(entry)
            }
            Err(err) => {
                info!(match_id = %self.match_id, reason = %err, "bet submission failed");
                self.slip = None;
                self.state = TicketState::Failed {
                    reason: err.to_string(),
                };
                Err(err)
            }
        }
    }

    /// Submit once. Failures are returned, never retried.
    pub async fn submit(
        &mut self,
        identity: Option<&Identity>,
        service: &dyn BetService,
    ) -> Result<BetLedgerEntry> {
        let slip = self.begin_submit(identity).map_err(Error::from)?;
        let result = service.place_bet(&slip).await;
        self.complete_submit(result)
    }

    fn ensure_editable(&self) -> Result<(), ValidationError> {
        if self.state.is_locked() {
            return Err(ValidationError::TicketLocked(self.state.lock_reason()));
        }
        Ok(())
    }

    fn recompute_state(&mut self) {
        self.state = match self.outcome {
            None => TicketState::Empty,
            Some(_) if self.stake.is_positive() => TicketState::Ready,
            Some(_) => TicketState::OutcomeSelected,
        };
    }
}
