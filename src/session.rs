//! Signed-in session: the single owner of a user's balance ledger and bet history.
//!
//! Created when an identity becomes available and consumed on logout, so views
//! share one projection instead of keeping their own copies.

use tracing::{info, warn};

use crate::Money;
use crate::bet::BetLedgerEntry;
use crate::catalog::{Catalog, Freshness};
use crate::error::{Error, Result, ValidationError};
use crate::history::{HistoryView, Reconciler};
use crate::ledger::BalanceLedger;
use crate::model::Identity;
use crate::service::{AccountService, BetService, IdentityProvider, MatchLookup};
use crate::ticket::BetTicket;

#[derive(Debug)]
pub struct Session {
    ledger: BalanceLedger,
    history: HistoryView,
    history_freshness: Freshness,
}

impl Session {
    /// Start a session for the provider's current identity.
    ///
    /// Returns `None` while signed out: account operations are unavailable, not failed.
    pub fn start(provider: &dyn IdentityProvider) -> Option<Self> {
        let identity = provider.current()?;
        info!(user = %identity.subject, "session started");
        Some(Self {
            ledger: BalanceLedger::new(identity),
            history: HistoryView::default(),
            history_freshness: Freshness::Empty,
        })
    }

    pub fn identity(&self) -> &Identity {
        self.ledger.owner()
    }

    pub fn ledger(&self) -> &BalanceLedger {
        &self.ledger
    }

    pub fn balance(&self) -> Option<Money> {
        self.ledger.balance()
    }

    pub fn history(&self) -> &HistoryView {
        &self.history
    }

    pub fn history_freshness(&self) -> &Freshness {
        &self.history_freshness
    }

    /// Fail if the provider now reports a different (or no) identity.
    pub fn ensure_current(&self, provider: &dyn IdentityProvider) -> Result<(), ValidationError> {
        let current = provider.current().ok_or(ValidationError::NotAuthenticated)?;
        self.ledger.ensure_owner(&current).map_err(|err| match err {
            Error::Validation(v) => v,
            _ => ValidationError::ForeignIdentity(current.subject.clone()),
        })
    }

    /// Initial load: balance and transaction history.
    pub async fn load(&mut self, account: &dyn AccountService) -> Result<Money> {
        let balance = self.ledger.load_balance(account).await?;
        if let Err(err) = self.ledger.refresh_history(account).await {
            warn!(user = %self.identity().subject, reason = %err, "initial history load failed");
        }
        Ok(balance)
    }

    pub async fn deposit(&mut self, account: &dyn AccountService, amount: Money) -> Result<Money> {
        self.ledger.deposit(account, amount).await
    }

    pub async fn withdraw(&mut self, account: &dyn AccountService, amount: Money) -> Result<Money> {
        self.ledger.withdraw(account, amount).await
    }

    /// Submit a ticket as this session's user.
    pub async fn place_bet(
        &self,
        ticket: &mut BetTicket,
        bets: &dyn BetService,
    ) -> Result<BetLedgerEntry> {
        ticket.submit(Some(self.identity()), bets).await
    }

    /// Fetch bet history and reconcile it with match names.
    ///
    /// On failure the last reconciled view is kept and marked stale.
    pub async fn refresh_history(
        &mut self,
        account: &dyn AccountService,
        lookup: &dyn MatchLookup,
        catalogs: &[&Catalog],
    ) -> Result<&HistoryView> {
        self.history_freshness = Freshness::Loading;
        let history = match account.bets(self.identity()).await {
            Ok(history) => history,
            Err(err) => {
                warn!(user = %self.identity().subject, reason = %err, "bet history fetch failed");
                self.history_freshness = Freshness::Stale {
                    reason: err.to_string(),
                };
                return Err(err);
            }
        };

        let reconciler = catalogs
            .iter()
            .fold(Reconciler::new(lookup), |r, catalog| r.with_catalog(catalog));
        self.history = reconciler.reconcile(history.into_entries()).await;
        self.history_freshness = Freshness::Fresh;
        Ok(&self.history)
    }

    /// End the session, dropping every per-user projection.
    pub fn logout(self) {
        info!(user = %self.identity().subject, "session ended");
    }
}
