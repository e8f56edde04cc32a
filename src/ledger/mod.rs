//! Balance ledger: the signed-in user's balance and transaction history.
//!
//! The account service is the source of truth. The balance is only ever replaced
//! with the value it returns, never adjusted locally, and every successful
//! mutation is followed by a history refresh so the two never disagree on screen.

use tracing::{info, warn};

use crate::Money;
use crate::catalog::Freshness;
use crate::error::{Error, Result, ValidationError};
use crate::model::{BalanceTransaction, Identity, TransactionKind};
use crate::service::AccountService;

mod error;
pub use error::ReplayError;

mod replay;
pub use replay::LocalLedger;

/// Balance implied by a transaction history: initial + deposits - withdrawals.
///
/// `None` when the running balance leaves the representable range.
pub fn recompute(initial: Money, transactions: &[BalanceTransaction]) -> Option<Money> {
    transactions
        .iter()
        .try_fold(initial, |balance, tx| tx.apply_to(balance))
}

/// Comparison of a recomputed balance with the one the account service reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reconciliation {
    /// `None` when the history does not add up to a representable balance.
    pub expected: Option<Money>,
    pub recorded: Option<Money>,
}

impl Reconciliation {
    /// `recorded - expected`, when both are known.
    pub fn drift(&self) -> Option<Money> {
        self.recorded?.checked_sub(self.expected?)
    }

    pub fn is_consistent(&self) -> bool {
        self.drift() == Some(Money::zero())
    }
}

/// Read projection of one user's account.
#[derive(Debug)]
pub struct BalanceLedger {
    owner: Identity,
    balance: Option<Money>,
    transactions: Vec<BalanceTransaction>,
    history: Freshness,
    last_message: Option<String>,
}

impl BalanceLedger {
    pub fn new(owner: Identity) -> Self {
        Self {
            owner,
            balance: None,
            transactions: Vec::new(),
            history: Freshness::Empty,
            last_message: None,
        }
    }

    pub fn owner(&self) -> &Identity {
        &self.owner
    }

    /// Last balance reported by the account service, `None` before the first load.
    pub fn balance(&self) -> Option<Money> {
        self.balance
    }

    pub fn transactions(&self) -> &[BalanceTransaction] {
        &self.transactions
    }

    pub fn history_freshness(&self) -> &Freshness {
        &self.history
    }

    /// Message from the last successful transaction, e.g. "Deposit successful".
    pub fn last_message(&self) -> Option<&str> {
        self.last_message.as_deref()
    }

    pub async fn load_balance(&mut self, service: &dyn AccountService) -> Result<Money> {
        let balance = service.balance(&self.owner).await?;
        self.balance = Some(balance);
        Ok(balance)
    }

    pub async fn deposit(&mut self, service: &dyn AccountService, amount: Money) -> Result<Money> {
        self.apply_transaction(service, TransactionKind::Deposit, amount).await
    }

    pub async fn withdraw(&mut self, service: &dyn AccountService, amount: Money) -> Result<Money> {
        self.apply_transaction(service, TransactionKind::Withdraw, amount).await
    }

    /// Submit one transaction and adopt the balance the service returns.
    ///
    /// A rejected withdrawal leaves the balance untouched and is never retried.
    pub async fn apply_transaction(
        &mut self,
        service: &dyn AccountService,
        kind: TransactionKind,
        amount: Money,
    ) -> Result<Money> {
        if !amount.is_positive() {
            return Err(ValidationError::NonPositiveAmount(amount).into());
        }
        if self.owner.subject.is_empty() {
            return Err(ValidationError::NotAuthenticated.into());
        }

        let update = match service.apply_transaction(&self.owner, kind, amount).await {
            Ok(update) => update,
            Err(err) => {
                info!(
                    user = %self.owner.subject,
                    amount = %amount,
                    reason = %err,
                    "{kind} rejected"
                );
                return Err(err);
            }
        };
        info!(
            user = %self.owner.subject,
            amount = %amount,
            balance = %update.balance,
            "{kind} applied"
        );
        self.balance = Some(update.balance);
        self.last_message = update.message;

        // the mutation already happened; a failed refresh only marks history stale
        if let Err(err) = self.refresh_history(service).await {
            warn!(user = %self.owner.subject, reason = %err, "history refresh after {kind} failed");
        }
        Ok(update.balance)
    }

    /// Replace the transaction history with the service's. On failure the last
    /// known history is kept and marked stale.
    pub async fn refresh_history(&mut self, service: &dyn AccountService) -> Result<usize> {
        self.history = Freshness::Loading;
        match service.transactions(&self.owner).await {
            Ok(transactions) => {
                let count = transactions.len();
                self.transactions = transactions;
                self.history = Freshness::Fresh;
                Ok(count)
            }
            Err(err) => {
                self.history = Freshness::Stale {
                    reason: err.to_string(),
                };
                Err(err)
            }
        }
    }

    /// Recompute the balance locally from `initial` and the loaded history and
    /// compare it with the recorded one.
    pub fn reconcile(&self, initial: Money) -> Reconciliation {
        let reconciliation = Reconciliation {
            expected: recompute(initial, &self.transactions),
            recorded: self.balance,
        };
        match (reconciliation.expected, reconciliation.drift()) {
            (None, _) => warn!(
                user = %self.owner.subject,
                "transaction history overflows the balance range"
            ),
            (Some(expected), Some(drift)) if drift != Money::zero() => warn!(
                user = %self.owner.subject,
                expected = %expected,
                drift = %drift,
                "balance does not match transaction history"
            ),
            _ => {}
        }
        reconciliation
    }

    pub(crate) fn ensure_owner(&self, identity: &Identity) -> Result<(), Error> {
        if identity.subject != self.owner.subject {
            return Err(ValidationError::ForeignIdentity(identity.subject.clone()).into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{DomainRejection, ErrorKind, TransportError};
    use crate::testkit::MemoryBackend;

    const ALICE: &str = "auth0|alice";

    fn alice() -> Identity {
        Identity::new(ALICE, "token")
    }

    fn backend(balance: i64) -> MemoryBackend {
        MemoryBackend::new().with_account(ALICE, Money::from_units(balance))
    }

    async fn loaded(backend: &MemoryBackend) -> BalanceLedger {
        let mut ledger = BalanceLedger::new(alice());
        ledger.load_balance(backend).await.unwrap();
        ledger
    }

    #[tokio::test]
    async fn deposit_adopts_service_balance_and_refreshes_history() {
        let backend = backend(200);
        let mut ledger = loaded(&backend).await;

        let balance = ledger.deposit(&backend, Money::from_units(50)).await.unwrap();

        assert_eq!(balance, Money::from_units(250));
        assert_eq!(ledger.balance(), Some(Money::from_units(250)));
        assert_eq!(ledger.transactions().len(), 1);
        assert_eq!(ledger.history_freshness(), &Freshness::Fresh);
        assert_eq!(ledger.last_message(), Some("deposit successful"));
        assert_eq!(backend.calls().transactions, 1);
    }

    #[tokio::test]
    async fn overdraft_is_rejected_and_balance_unchanged() {
        let backend = backend(200);
        let mut ledger = loaded(&backend).await;
        ledger.deposit(&backend, Money::from_units(50)).await.unwrap();

        let err = ledger
            .withdraw(&backend, Money::from_units(300))
            .await
            .unwrap_err();

        assert_eq!(
            err,
            Error::Rejected(DomainRejection::InsufficientFunds {
                available: Money::from_units(250),
                requested: Money::from_units(300),
            })
        );
        assert_eq!(ledger.balance(), Some(Money::from_units(250)));
        // one call each, no retry
        assert_eq!(backend.calls().apply_transaction, 2);
    }

    #[tokio::test]
    async fn deposit_then_withdraw_round_trips() {
        for units in [1, 37, 200] {
            let backend = backend(200);
            let mut ledger = loaded(&backend).await;
            let before = ledger.balance().unwrap();

            ledger.deposit(&backend, Money::from_units(units)).await.unwrap();
            ledger.withdraw(&backend, Money::from_units(units)).await.unwrap();

            assert_eq!(ledger.balance(), Some(before));
        }
    }

    #[tokio::test]
    async fn non_positive_amount_never_reaches_service() {
        let backend = backend(200);
        let mut ledger = loaded(&backend).await;

        let err = ledger.deposit(&backend, Money::zero()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        let err = ledger
            .withdraw(&backend, Money::from_cents(-100))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(backend.calls().apply_transaction, 0);
    }

    #[tokio::test]
    async fn transport_failure_is_surfaced_and_not_retried() {
        let backend = backend(200);
        let mut ledger = loaded(&backend).await;
        backend.fail_next_call(TransportError::Unreachable("connection reset".into()));

        let err = ledger
            .withdraw(&backend, Money::from_units(10))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Transport);
        assert_eq!(backend.calls().apply_transaction, 1);
        assert_eq!(ledger.balance(), Some(Money::from_units(200)));
        assert_eq!(backend.balance_of(ALICE), Some(Money::from_units(200)));
    }

    #[tokio::test]
    async fn failed_history_refresh_keeps_last_history() {
        let backend = backend(200);
        let mut ledger = loaded(&backend).await;
        ledger.deposit(&backend, Money::from_units(10)).await.unwrap();

        backend.fail_next_call(TransportError::Unreachable("down".into()));
        assert!(ledger.refresh_history(&backend).await.is_err());

        assert_eq!(ledger.transactions().len(), 1);
        assert!(matches!(ledger.history_freshness(), Freshness::Stale { .. }));
    }

    #[tokio::test]
    async fn reconcile_matches_recorded_balance() {
        let backend = backend(200);
        let mut ledger = loaded(&backend).await;
        ledger.deposit(&backend, Money::from_units(50)).await.unwrap();
        ledger.withdraw(&backend, Money::from_units(20)).await.unwrap();

        let reconciliation = ledger.reconcile(Money::from_units(200));
        assert_eq!(reconciliation.expected, Some(Money::from_units(230)));
        assert!(reconciliation.is_consistent());

        let off = ledger.reconcile(Money::from_units(190));
        assert_eq!(off.drift(), Some(Money::from_units(10)));
    }

    #[test]
    fn recompute_sums_deposits_minus_withdrawals() {
        let tx = |id, kind, units| BalanceTransaction {
            id,
            kind,
            amount: Money::from_units(units),
            description: String::new(),
            created_at: chrono::Utc::now(),
        };
        let history = vec![
            tx(1, TransactionKind::Deposit, 100),
            tx(2, TransactionKind::Withdraw, 30),
            tx(3, TransactionKind::Deposit, 5),
        ];
        assert_eq!(
            recompute(Money::from_units(10), &history),
            Some(Money::from_units(85))
        );
    }

    #[test]
    fn recompute_reports_overflow() {
        let deposit = |id| BalanceTransaction {
            id,
            kind: TransactionKind::Deposit,
            amount: Money::from_cents(i64::MAX / 2 + 1),
            description: String::new(),
            created_at: chrono::Utc::now(),
        };
        assert_eq!(recompute(Money::zero(), &[deposit(1), deposit(2)]), None);
        assert!(recompute(Money::zero(), &[deposit(1)]).is_some());
    }

    #[test]
    fn foreign_identity_is_refused() {
        let ledger = BalanceLedger::new(alice());
        let bob = Identity::new("auth0|bob", "token");
        assert!(ledger.ensure_owner(&alice()).is_ok());
        assert_eq!(
            ledger.ensure_owner(&bob).unwrap_err().kind(),
            ErrorKind::Validation
        );
    }
}
