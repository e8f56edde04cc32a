//! Error types for local transaction replay.

use thiserror::Error;

use crate::Money;
use crate::model::TxId;

/// Reason a transaction was skipped by [`LocalLedger::apply`](super::LocalLedger::apply).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReplayError {
    #[error("duplicate transaction id {0}")]
    DuplicateTxId(TxId),

    #[error("transaction {0}: amount must be positive, got {1}")]
    NonPositiveAmount(TxId, Money),

    #[error("transaction {tx}: insufficient funds, available {available}, requested {requested}")]
    InsufficientFunds {
        tx: TxId,
        available: Money,
        requested: Money,
    },

    #[error("transaction {tx}: balance {balance} would overflow")]
    Overflow { tx: TxId, balance: Money },
}
