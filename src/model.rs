//! Core domain records shared by the catalog, ticket, and ledgers.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::Money;
use crate::odds::OddsQuote;

/// Authenticated subject plus the access token carried on every call.
#[derive(Clone, PartialEq, Eq)]
pub struct Identity {
    pub subject: String,
    pub token: String,
}

impl Identity {
    pub fn new(subject: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            token: token.into(),
        }
    }
}

// tokens stay out of logs
impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Identity")
            .field("subject", &self.subject)
            .field("token", &"<redacted>")
            .finish()
    }
}

/// Match identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MatchId(pub u64);

impl fmt::Display for MatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Balance transaction identifier.
pub type TxId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sport {
    Football,
    Basketball,
    Nfl,
}

impl Sport {
    /// Path segment used by the match feed.
    pub fn as_str(self) -> &'static str {
        match self {
            Sport::Football => "football",
            Sport::Basketball => "basketball",
            Sport::Nfl => "nfl",
        }
    }

    /// Whether the sport quotes a draw.
    pub fn is_three_way(self) -> bool {
        matches!(self, Sport::Football)
    }
}

impl fmt::Display for Sport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Sport {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "football" | "soccer" => Ok(Sport::Football),
            "basketball" => Ok(Sport::Basketball),
            "nfl" | "american-football" => Ok(Sport::Nfl),
            other => Err(format!("unknown sport '{other}'")),
        }
    }
}

/// Lifecycle status of a match, parsed from the feed's status code.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum MatchStatus {
    NotStarted,
    Live,
    Finished,
    /// Postponed, cancelled, suspended, or a code we do not know.
    Other(String),
}

impl MatchStatus {
    pub fn code(&self) -> &str {
        match self {
            MatchStatus::NotStarted => "NS",
            MatchStatus::Live => "LIVE",
            MatchStatus::Finished => "FT",
            MatchStatus::Other(code) => code,
        }
    }
}

impl From<&str> for MatchStatus {
    fn from(code: &str) -> Self {
        match code.trim().to_ascii_uppercase().as_str() {
            "NS" => MatchStatus::NotStarted,
            "LIVE" | "1H" | "2H" | "HT" | "ET" | "Q1" | "Q2" | "Q3" | "Q4" | "OT" => {
                MatchStatus::Live
            }
            "FT" | "AET" | "PEN" => MatchStatus::Finished,
            _ => MatchStatus::Other(code.to_string()),
        }
    }
}

impl From<String> for MatchStatus {
    fn from(code: String) -> Self {
        MatchStatus::from(code.as_str())
    }
}

impl From<MatchStatus> for String {
    fn from(status: MatchStatus) -> Self {
        status.code().to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Team {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logo: Option<String>,
}

impl Team {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            logo: None,
        }
    }
}

/// Live or final score. Sides are `None` until the feed reports them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Score {
    pub home: Option<u32>,
    pub away: Option<u32>,
}

impl fmt::Display for Score {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let side = |s: Option<u32>| s.map_or_else(|| "-".to_string(), |v| v.to_string());
        write!(f, "{} - {}", side(self.home), side(self.away))
    }
}

/// One match as returned by a catalog fetch. Immutable once fetched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchSummary {
    pub id: MatchId,
    pub sport: Sport,
    pub home: Team,
    pub away: Team,
    pub league: String,
    pub venue: Option<String>,
    pub scheduled: Option<DateTime<Utc>>,
    pub status: MatchStatus,
    pub score: Option<Score>,
    #[serde(default)]
    pub odds: OddsQuote,
}

impl MatchSummary {
    pub fn is_live(&self) -> bool {
        self.status == MatchStatus::Live
    }

    pub fn is_upcoming(&self) -> bool {
        self.status == MatchStatus::NotStarted
    }

    /// `needle` must already be lowercase.
    pub(crate) fn matches_lowercase(&self, needle: &str) -> bool {
        [&self.home.name, &self.away.name, &self.league]
            .iter()
            .any(|field| field.to_lowercase().contains(needle))
    }

    pub fn info(&self) -> MatchInfo {
        MatchInfo {
            home: self.home.name.clone(),
            away: self.away.name.clone(),
        }
    }
}

/// A per-team statistic from the match detail endpoint, e.g. possession.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatLine {
    pub kind: String,
    pub home: String,
    pub away: String,
}

impl StatLine {
    /// Home share of the combined value, in percent.
    pub fn home_share(&self) -> f64 {
        self.share(true)
    }

    pub fn away_share(&self) -> f64 {
        self.share(false)
    }

    fn share(&self, home: bool) -> f64 {
        let h = leading_number(&self.home);
        let a = leading_number(&self.away);
        let total = if h + a == 0.0 { 1.0 } else { h + a };
        (if home { h } else { a }) / total * 100.0
    }
}

/// Numeric prefix of a stat value ("55%" is 55), zero when there is none.
fn leading_number(raw: &str) -> f64 {
    let raw = raw.trim();
    let end = raw
        .char_indices()
        .take_while(|(i, c)| c.is_ascii_digit() || *c == '.' || (*i == 0 && *c == '-'))
        .count();
    // byte count equals char count here since all accepted chars are ASCII
    raw[..end].parse().unwrap_or(0.0)
}

/// Match summary plus per-team statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchDetail {
    pub summary: MatchSummary,
    pub stats: Vec<StatLine>,
}

/// Team names for a match, as served by the match-lookup endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchInfo {
    pub home: String,
    pub away: String,
}

/// Direction of a balance transaction. Amounts are always positive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    #[serde(alias = "add", alias = "Deposit")]
    Deposit,
    #[serde(alias = "Withdraw", alias = "withdrawal")]
    Withdraw,
}

impl TransactionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            TransactionKind::Deposit => "deposit",
            TransactionKind::Withdraw => "withdraw",
        }
    }
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "deposit" | "add" => Ok(TransactionKind::Deposit),
            "withdraw" | "withdrawal" => Ok(TransactionKind::Withdraw),
            other => Err(format!("unknown transaction type '{other}'")),
        }
    }
}

/// Append-only balance history record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceTransaction {
    pub id: TxId,
    #[serde(rename = "type")]
    pub kind: TransactionKind,
    pub amount: Money,
    #[serde(default)]
    pub description: String,
    pub created_at: DateTime<Utc>,
}

impl BalanceTransaction {
    /// Balance after this transaction, or `None` if it leaves the `i64` range.
    pub fn apply_to(&self, balance: Money) -> Option<Money> {
        match self.kind {
            TransactionKind::Deposit => balance.checked_add(self.amount),
            TransactionKind::Withdraw => balance.checked_sub(self.amount),
        }
    }
}
