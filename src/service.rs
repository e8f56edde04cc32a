//! Collaborator interfaces.
//!
//! The wagering core never talks to the network directly. It is handed
//! implementations of these traits: [`crate::http::HttpBackend`] in production,
//! the in-memory backend from `testkit` in tests.

use async_trait::async_trait;

use crate::Money;
use crate::bet::{BetHistory, BetLedgerEntry};
use crate::error::Result;
use crate::model::{
    BalanceTransaction, Identity, MatchDetail, MatchId, MatchInfo, MatchSummary, Sport,
    TransactionKind,
};
use crate::ticket::BetSlip;

/// Source of the authenticated identity. `None` means "signed out".
pub trait IdentityProvider: Send + Sync {
    fn current(&self) -> Option<Identity>;
}

/// Identity fixed at construction, e.g. from CLI flags.
#[derive(Debug, Clone, Default)]
pub struct StaticIdentity(pub Option<Identity>);

impl IdentityProvider for StaticIdentity {
    fn current(&self) -> Option<Identity> {
        self.0.clone()
    }
}

#[async_trait]
pub trait MatchFeed: Send + Sync {
    /// Full list of matches for a sport.
    async fn matches(&self, sport: Sport) -> Result<Vec<MatchSummary>>;

    /// One match with per-team statistics.
    async fn match_detail(&self, sport: Sport, id: MatchId) -> Result<MatchDetail>;
}

#[async_trait]
pub trait MatchLookup: Send + Sync {
    /// Team names for a match, including finished ones.
    async fn lookup(&self, id: MatchId) -> Result<MatchInfo>;
}

#[async_trait]
pub trait BetService: Send + Sync {
    /// Place a frozen bet on behalf of `slip.identity`. Returns the created
    /// pending entry or a rejection.
    async fn place_bet(&self, slip: &BetSlip) -> Result<BetLedgerEntry>;
}

/// Authoritative balance after a transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BalanceUpdate {
    pub balance: Money,
    pub message: Option<String>,
}

#[async_trait]
pub trait AccountService: Send + Sync {
    async fn balance(&self, identity: &Identity) -> Result<Money>;

    async fn apply_transaction(
        &self,
        identity: &Identity,
        kind: TransactionKind,
        amount: Money,
    ) -> Result<BalanceUpdate>;

    /// Transaction history, oldest first.
    async fn transactions(&self, identity: &Identity) -> Result<Vec<BalanceTransaction>>;

    async fn bets(&self, identity: &Identity) -> Result<BetHistory>;
}
