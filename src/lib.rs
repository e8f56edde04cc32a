pub mod bet;
pub mod catalog;
pub mod config;
pub mod csv;
pub mod error;
pub mod history;
pub mod http;
pub mod ledger;
pub mod model;
pub mod money;
pub mod odds;
pub mod service;
pub mod session;
pub mod ticket;

#[cfg(any(test, feature = "testkit"))]
pub mod testkit;

pub use error::{Error, ErrorKind, Result};
pub use money::Money;
pub use odds::{Odds, OddsQuote, Outcome, potential_payout};
