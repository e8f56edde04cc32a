//! Error taxonomy for wagering operations.
//!
//! Three families the caller must be able to tell apart:
//! - [`ValidationError`]: local, raised before any network call.
//! - [`TransportError`]: the collaborator was unreachable or answered garbage.
//! - [`DomainRejection`]: the collaborator explicitly refused the request.

use thiserror::Error;

use crate::Money;
use crate::model::MatchId;
use crate::odds::Outcome;

/// Top-level error returned by operations that may reach a collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("transport failed: {0}")]
    Transport(#[from] TransportError),

    #[error("rejected: {0}")]
    Rejected(#[from] DomainRejection),
}

/// Coarse classification of [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Transport,
    Rejection,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Validation(_) => ErrorKind::Validation,
            Error::Transport(_) => ErrorKind::Transport,
            Error::Rejected(_) => ErrorKind::Rejection,
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Local precondition failure. Never reaches the network.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("no outcome selected")]
    NoOutcome,
    #[error("outcome '{0}' is not offered for this match")]
    OutcomeNotOffered(Outcome),
    #[error("stake must be greater than zero, got {0}")]
    NonPositiveStake(Money),
    #[error("amount must be greater than zero, got {0}")]
    NonPositiveAmount(Money),
    #[error("no authenticated identity")]
    NotAuthenticated,
    #[error("identity '{0}' does not own this session")]
    ForeignIdentity(String),
    #[error("ticket is locked while {0}")]
    TicketLocked(&'static str),
}

/// Collaborator unreachable or response unusable.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("service unreachable: {0}")]
    Unreachable(String),
    #[error("service returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("malformed response: {0}")]
    Malformed(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            TransportError::Malformed(err.to_string())
        } else {
            TransportError::Unreachable(err.to_string())
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::Transport(err.into())
    }
}

/// Collaborator explicitly refused the request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DomainRejection {
    #[error("insufficient funds: available {available}, requested {requested}")]
    InsufficientFunds { available: Money, requested: Money },
    #[error("market for match {0} is closed")]
    MarketClosed(MatchId),
    #[error("{0}")]
    Rejected(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_distinguishes_families() {
        let validation: Error = ValidationError::NoOutcome.into();
        let transport: Error = TransportError::Unreachable("refused".into()).into();
        let rejection: Error = DomainRejection::MarketClosed(MatchId(3)).into();

        assert_eq!(validation.kind(), ErrorKind::Validation);
        assert_eq!(transport.kind(), ErrorKind::Transport);
        assert_eq!(rejection.kind(), ErrorKind::Rejection);
    }

    #[test]
    fn messages_are_human_readable() {
        let err: Error = DomainRejection::InsufficientFunds {
            available: Money::from_units(250),
            requested: Money::from_units(300),
        }
        .into();
        assert_eq!(
            err.to_string(),
            "rejected: insufficient funds: available 250.00, requested 300.00"
        );
        assert_eq!(
            ValidationError::NonPositiveStake(Money::zero()).to_string(),
            "stake must be greater than zero, got 0.00"
        );
    }
}
