//! Local replay of balance transactions.
//!
//! Recomputes a balance from a transaction history without the account service,
//! applying the same rules it enforces. Used to reconcile client-side totals and
//! by the `reconcile` command. Also supports an async stream of transactions.

use std::collections::HashSet;

use tokio_stream::{Stream, StreamExt};
use tracing::info;

use super::ReplayError;
use crate::Money;
use crate::model::{BalanceTransaction, TransactionKind, TxId};

pub struct LocalLedger {
    balance: Money,
    /// Applied transaction ids, for duplicate checking
    seen: HashSet<TxId>,
    applied: Vec<BalanceTransaction>,
    skipped: usize,
}

/// Public API
impl LocalLedger {
    pub fn new(initial: Money) -> Self {
        Self {
            balance: initial,
            seen: HashSet::new(),
            applied: Vec::new(),
            skipped: 0,
        }
    }

    /// Replay the given transaction stream
    pub async fn run(&mut self, mut stream: impl Stream<Item = BalanceTransaction> + Unpin) {
        while let Some(tx) = stream.next().await {
            // a rejected transaction must not stop the replay
            let _ = self.apply(tx);
        }
    }

    pub fn balance(&self) -> Money {
        self.balance
    }

    /// Transactions that were applied, in order.
    pub fn applied(&self) -> &[BalanceTransaction] {
        &self.applied
    }

    pub fn skipped(&self) -> usize {
        self.skipped
    }

    /// Apply a single transaction on top of the current balance
    pub fn apply(&mut self, tx: BalanceTransaction) -> Result<(), ReplayError> {
        let result = self.check(&tx);
        Self::log_result(&tx, &result);
        match result {
            Ok(balance) => {
                self.balance = balance;
                self.seen.insert(tx.id);
                self.applied.push(tx);
                Ok(())
            }
            Err(e) => {
                self.skipped += 1;
                Err(e)
            }
        }
    }
}

/// Private API
impl LocalLedger {
    /// Small helper to log `apply` results
    fn log_result(tx: &BalanceTransaction, result: &Result<Money, ReplayError>) {
        match result {
            Ok(_) => info!(
                tx = tx.id,
                amount = %tx.amount,
                "{} applied",
                tx.kind
            ),
            Err(e) => info!(
                tx = tx.id,
                amount = %tx.amount,
                reason = %e,
                "{} skipped",
                tx.kind
            ),
        }
    }

    /// Checks a transaction against the current state and returns the balance
    /// it would leave:
    /// - Ensure transaction ID is unique
    /// - Ensure the amount is positive
    /// - For withdrawals, ensure the balance covers the amount
    /// - Ensure the new balance stays in range
    fn check(&self, tx: &BalanceTransaction) -> Result<Money, ReplayError> {
        if self.seen.contains(&tx.id) {
            return Err(ReplayError::DuplicateTxId(tx.id));
        }
        if !tx.amount.is_positive() {
            return Err(ReplayError::NonPositiveAmount(tx.id, tx.amount));
        }
        if tx.kind == TransactionKind::Withdraw && self.balance < tx.amount {
            return Err(ReplayError::InsufficientFunds {
                tx: tx.id,
                available: self.balance,
                requested: tx.amount,
            });
        }
        tx.apply_to(self.balance).ok_or(ReplayError::Overflow {
            tx: tx.id,
            balance: self.balance,
        })
    }
}

impl Default for LocalLedger {
    fn default() -> Self {
        Self::new(Money::zero())
    }
}
