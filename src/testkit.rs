//! Shared test utilities available to both unit and integration tests.
//!
//! Enabled via `#[cfg(test)]` (unit tests) or the `testkit` feature
//! (integration tests).
//!
//! [`MemoryBackend`] implements every collaborator trait in memory. It keeps
//! per-user accounts, enforces the withdraw check the way the account service
//! does, counts calls so tests can assert that nothing reached the "network",
//! and can be scripted to fail.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;

use crate::Money;
use crate::bet::{BetHistory, BetLedgerEntry, BetStatus, partition};
use crate::error::{DomainRejection, Error, Result, TransportError};
use crate::model::{
    BalanceTransaction, Identity, MatchDetail, MatchId, MatchInfo, MatchStatus, MatchSummary,
    Sport, StatLine, Team, TransactionKind, TxId,
};
use crate::odds::OddsQuote;
use crate::service::{AccountService, BalanceUpdate, BetService, MatchFeed, MatchLookup};
use crate::ticket::BetSlip;

/// Build a not-started match with the given decimal odds.
pub fn match_summary(
    id: u64,
    sport: Sport,
    home: Option<f64>,
    draw: Option<f64>,
    away: Option<f64>,
) -> MatchSummary {
    MatchSummary {
        id: MatchId(id),
        sport,
        home: Team::named(format!("Home {id}")),
        away: Team::named(format!("Away {id}")),
        league: "Test League".to_string(),
        venue: None,
        scheduled: None,
        status: MatchStatus::NotStarted,
        score: None,
        odds: OddsQuote::from_floats(home, draw, away),
    }
}

/// Number of calls received per collaborator operation.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CallCounts {
    pub matches: usize,
    pub match_detail: usize,
    pub lookup: usize,
    pub place_bet: usize,
    pub balance: usize,
    pub apply_transaction: usize,
    pub transactions: usize,
    pub bets: usize,
}

#[derive(Debug, Default)]
struct Account {
    balance: Money,
    transactions: Vec<BalanceTransaction>,
    bets: Vec<BetLedgerEntry>,
}

#[derive(Debug, Default)]
struct State {
    matches: HashMap<Sport, Vec<MatchSummary>>,
    stats: HashMap<MatchId, Vec<StatLine>>,
    failing_lookups: HashSet<MatchId>,
    lookup_delays: HashMap<MatchId, Duration>,
    closed_markets: HashSet<MatchId>,
    accounts: HashMap<String, Account>,
    next_failure: Option<Error>,
    next_tx_id: TxId,
    calls: CallCounts,
}

impl State {
    fn take_failure(&mut self) -> Result<()> {
        match self.next_failure.take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn account(&mut self, identity: &Identity) -> Result<&mut Account> {
        if identity.token.is_empty() {
            return Err(DomainRejection::Rejected("missing access token".into()).into());
        }
        self.accounts.get_mut(&identity.subject).ok_or_else(|| {
            DomainRejection::Rejected(format!("unknown user '{}'", identity.subject)).into()
        })
    }

    fn find_match(&self, id: MatchId) -> Option<&MatchSummary> {
        self.matches.values().flatten().find(|m| m.id == id)
    }
}

/// In-memory implementation of every collaborator.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    state: Mutex<State>,
}

/// Builders
impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_matches(self, sport: Sport, matches: Vec<MatchSummary>) -> Self {
        self.set_matches(sport, matches);
        self
    }

    pub fn with_account(self, subject: &str, balance: Money) -> Self {
        self.state().accounts.insert(
            subject.to_string(),
            Account {
                balance,
                ..Account::default()
            },
        );
        self
    }

    pub fn with_stats(self, id: MatchId, stats: Vec<StatLine>) -> Self {
        self.state().stats.insert(id, stats);
        self
    }

    pub fn with_closed_market(self, id: MatchId) -> Self {
        self.state().closed_markets.insert(id);
        self
    }

    pub fn with_failing_lookup(self, id: MatchId) -> Self {
        self.state().failing_lookups.insert(id);
        self
    }

    pub fn with_lookup_delay(self, id: MatchId, delay: Duration) -> Self {
        self.state().lookup_delays.insert(id, delay);
        self
    }
}

/// Runtime control and inspection
impl MemoryBackend {
    pub fn set_matches(&self, sport: Sport, matches: Vec<MatchSummary>) {
        self.state().matches.insert(sport, matches);
    }

    /// The next collaborator call of any kind fails with `err`.
    pub fn fail_next_call(&self, err: impl Into<Error>) {
        self.state().next_failure = Some(err.into());
    }

    /// Settle every pending bet of `subject` on `match_id`, crediting wins.
    pub fn settle(&self, subject: &str, match_id: MatchId, status: BetStatus, payout: Money) {
        let mut state = self.state();
        let Some(account) = state.accounts.get_mut(subject) else {
            return;
        };
        let mut credited = Money::zero();
        for bet in account.bets.iter_mut().filter(|b| b.match_id() == match_id) {
            if bet.settle(status, payout).is_ok() && status == BetStatus::Won {
                credited += payout;
            }
        }
        account.balance += credited;
    }

    pub fn calls(&self) -> CallCounts {
        self.state().calls
    }

    pub fn balance_of(&self, subject: &str) -> Option<Money> {
        self.state().accounts.get(subject).map(|a| a.balance)
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl MatchFeed for MemoryBackend {
    async fn matches(&self, sport: Sport) -> Result<Vec<MatchSummary>> {
        let mut state = self.state();
        state.calls.matches += 1;
        state.take_failure()?;
        Ok(state.matches.get(&sport).cloned().unwrap_or_default())
    }

    async fn match_detail(&self, sport: Sport, id: MatchId) -> Result<MatchDetail> {
        let mut state = self.state();
        state.calls.match_detail += 1;
        state.take_failure()?;
        let summary = state
            .matches
            .get(&sport)
            .and_then(|matches| matches.iter().find(|m| m.id == id))
            .cloned()
            .ok_or_else(|| DomainRejection::Rejected(format!("match {id} not found")))?;
        let stats = state.stats.get(&id).cloned().unwrap_or_default();
        Ok(MatchDetail { summary, stats })
    }
}

#[async_trait]
impl MatchLookup for MemoryBackend {
    async fn lookup(&self, id: MatchId) -> Result<MatchInfo> {
        let delay = {
            let mut state = self.state();
            state.calls.lookup += 1;
            state.lookup_delays.get(&id).copied()
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state();
        state.take_failure()?;
        if state.failing_lookups.contains(&id) {
            return Err(TransportError::Status {
                status: 500,
                body: format!("lookup of match {id} failed"),
            }
            .into());
        }
        state
            .find_match(id)
            .map(MatchSummary::info)
            .ok_or_else(|| DomainRejection::Rejected(format!("match {id} not found")).into())
    }
}

#[async_trait]
impl BetService for MemoryBackend {
    async fn place_bet(&self, slip: &BetSlip) -> Result<BetLedgerEntry> {
        let mut state = self.state();
        state.calls.place_bet += 1;
        state.take_failure()?;
        if state.closed_markets.contains(&slip.match_id) {
            return Err(DomainRejection::MarketClosed(slip.match_id).into());
        }
        let entry = BetLedgerEntry::pending(
            slip.match_id,
            slip.outcome,
            slip.stake,
            slip.odds,
            Utc::now(),
        );
        state.account(&slip.identity)?.bets.push(entry.clone());
        Ok(entry)
    }
}

#[async_trait]
impl AccountService for MemoryBackend {
    async fn balance(&self, identity: &Identity) -> Result<Money> {
        let mut state = self.state();
        state.calls.balance += 1;
        state.take_failure()?;
        Ok(state.account(identity)?.balance)
    }

    async fn apply_transaction(
        &self,
        identity: &Identity,
        kind: TransactionKind,
        amount: Money,
    ) -> Result<BalanceUpdate> {
        let mut state = self.state();
        state.calls.apply_transaction += 1;
        state.take_failure()?;
        state.next_tx_id += 1;
        let id = state.next_tx_id;

        let account = state.account(identity)?;
        if !amount.is_positive() {
            return Err(DomainRejection::Rejected(format!("invalid amount {amount}")).into());
        }
        let description = match kind {
            TransactionKind::Deposit => {
                account.balance += amount;
                format!("Deposited ${amount}")
            }
            TransactionKind::Withdraw => {
                if account.balance < amount {
                    return Err(DomainRejection::InsufficientFunds {
                        available: account.balance,
                        requested: amount,
                    }
                    .into());
                }
                account.balance -= amount;
                format!("Withdrew ${amount}")
            }
        };
        account.transactions.push(BalanceTransaction {
            id,
            kind,
            amount,
            description,
            created_at: Utc::now(),
        });

        Ok(BalanceUpdate {
            balance: account.balance,
            message: Some(format!("{kind} successful")),
        })
    }

    async fn transactions(&self, identity: &Identity) -> Result<Vec<BalanceTransaction>> {
        let mut state = self.state();
        state.calls.transactions += 1;
        state.take_failure()?;
        Ok(state.account(identity)?.transactions.clone())
    }

    async fn bets(&self, identity: &Identity) -> Result<BetHistory> {
        let mut state = self.state();
        state.calls.bets += 1;
        state.take_failure()?;
        let (pending, settled) = partition(state.account(identity)?.bets.clone());
        Ok(BetHistory { pending, settled })
    }
}
