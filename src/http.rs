//! REST implementation of the collaborator traits.
//!
//! Response payloads are decoded into private wire structs and normalized into
//! domain types here, so the rest of the crate never sees the feed's two match
//! shapes or the backend's transaction type spellings.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::Money;
use crate::bet::{BetHistory, BetLedgerEntry};
use crate::config::ApiConfig;
use crate::error::{DomainRejection, Error, Result, TransportError};
use crate::model::{
    BalanceTransaction, Identity, MatchDetail, MatchId, MatchInfo, MatchStatus, MatchSummary,
    Score, Sport, StatLine, Team, TransactionKind,
};
use crate::odds::{Odds, OddsQuote, Outcome};
use crate::service::{AccountService, BalanceUpdate, BetService, MatchFeed, MatchLookup};
use crate::ticket::BetSlip;

/// Client for the betting backend.
pub struct HttpBackend {
    base_url: String,
    http: Client,
}

impl std::fmt::Debug for HttpBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpBackend")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl HttpBackend {
    pub fn new(config: &ApiConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| TransportError::Unreachable(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            http,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn get<T: DeserializeOwned>(&self, path: &str, identity: Option<&Identity>) -> Result<T> {
        let request = authorize(self.http.get(self.url(path)), identity);
        self.send(path, request).await
    }

    async fn post<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
        identity: Option<&Identity>,
    ) -> Result<T> {
        let request = authorize(self.http.post(self.url(path)).json(body), identity);
        self.send(path, request).await
    }

    async fn send<T: DeserializeOwned>(&self, path: &str, request: RequestBuilder) -> Result<T> {
        let response = request.send().await.map_err(|e| {
            warn!(path, reason = %e, "request failed");
            TransportError::Unreachable(e.to_string())
        })?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| TransportError::Unreachable(e.to_string()))?;
        debug!(path, status = status.as_u16(), "response received");

        if !status.is_success() {
            return Err(status_error(status, body));
        }
        decode(&body)
    }
}

fn authorize(request: RequestBuilder, identity: Option<&Identity>) -> RequestBuilder {
    match identity {
        Some(identity) if !identity.token.is_empty() => request.bearer_auth(&identity.token),
        _ => request,
    }
}

/// An empty body decodes as JSON `null`.
fn decode<T: DeserializeOwned>(body: &str) -> Result<T> {
    let body = if body.trim().is_empty() { "null" } else { body };
    serde_json::from_str(body).map_err(|e| TransportError::Malformed(e.to_string()).into())
}

/// 4xx is the backend refusing the request; anything else is a transport failure.
fn status_error(status: StatusCode, body: String) -> Error {
    if status.is_client_error() {
        let message = serde_json::from_str::<ErrorBody>(&body)
            .ok()
            .and_then(|b| b.message)
            .or_else(|| (!body.trim().is_empty()).then(|| body.trim().to_string()))
            .unwrap_or_else(|| format!("request rejected with status {}", status.as_u16()));
        return DomainRejection::Rejected(message).into();
    }
    TransportError::Status {
        status: status.as_u16(),
        body,
    }
    .into()
}

/// `{prefix}/{subject}{suffix}` with the subject percent-encoded. Auth
/// subjects contain `|` and may contain `/`.
fn user_path(prefix: &str, identity: &Identity, suffix: &str) -> String {
    format!("{prefix}/{}{suffix}", urlencoding::encode(&identity.subject))
}

fn transaction_type(kind: TransactionKind) -> &'static str {
    match kind {
        TransactionKind::Deposit => "add",
        TransactionKind::Withdraw => "Withdraw",
    }
}

// Wire types

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawTeams {
    home: Team,
    away: Team,
}

/// A stat value is either a number or a string like "55%".
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawStatValue {
    Number(f64),
    Text(String),
}

impl From<RawStatValue> for String {
    fn from(value: RawStatValue) -> Self {
        match value {
            RawStatValue::Number(n) => n.to_string(),
            RawStatValue::Text(s) => s,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawStat {
    #[serde(rename = "type")]
    kind: String,
    home: RawStatValue,
    away: RawStatValue,
}

/// Match as served by the feed: nested `teams` (football) or flat
/// `homeTeam`/`awayTeam` (other sports and detail pages).
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawMatch {
    id: u64,
    #[serde(default)]
    date: Option<String>,
    #[serde(default)]
    league: Option<String>,
    #[serde(default)]
    venue: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    teams: Option<RawTeams>,
    #[serde(default)]
    home_team: Option<String>,
    #[serde(default)]
    away_team: Option<String>,
    #[serde(default)]
    score: Option<Score>,
    #[serde(default)]
    odds: Option<OddsQuote>,
    #[serde(default)]
    stats: Vec<RawStat>,
}

impl RawMatch {
    fn into_detail(self, sport: Sport) -> Result<MatchDetail, TransportError> {
        let id = MatchId(self.id);
        let (home, away) = match (self.teams, self.home_team, self.away_team) {
            (Some(teams), _, _) => (teams.home, teams.away),
            (None, Some(home), Some(away)) => (Team::named(home), Team::named(away)),
            _ => {
                return Err(TransportError::Malformed(format!(
                    "match {id} has no team names"
                )));
            }
        };
        if home.name.trim().is_empty() || away.name.trim().is_empty() {
            return Err(TransportError::Malformed(format!(
                "match {id} has an empty team name"
            )));
        }

        let scheduled = self.date.as_deref().and_then(parse_date);
        let score = self.score.filter(|s| s.home.is_some() || s.away.is_some());
        let summary = MatchSummary {
            id,
            sport,
            home,
            away,
            league: self.league.unwrap_or_default(),
            venue: self.venue.filter(|v| !v.is_empty()),
            scheduled,
            status: self
                .status
                .as_deref()
                .map_or(MatchStatus::NotStarted, MatchStatus::from),
            score,
            odds: self.odds.unwrap_or_default(),
        };
        let stats = self
            .stats
            .into_iter()
            .map(|s| StatLine {
                kind: s.kind,
                home: s.home.into(),
                away: s.away.into(),
            })
            .collect();
        Ok(MatchDetail { summary, stats })
    }
}

fn parse_date(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|d| d.with_timezone(&Utc))
}

#[derive(Debug, Deserialize)]
struct RawMatchInfo {
    #[serde(alias = "homeTeam")]
    home_team: String,
    #[serde(alias = "awayTeam")]
    away_team: String,
}

#[derive(Debug, Serialize)]
struct BetRequest<'a> {
    auth0_id: &'a str,
    #[serde(rename = "matchId")]
    match_id: MatchId,
    team: Outcome,
    stake: Money,
    odds: Odds,
}

impl<'a> From<&'a BetSlip> for BetRequest<'a> {
    fn from(slip: &'a BetSlip) -> Self {
        Self {
            auth0_id: &slip.identity.subject,
            match_id: slip.match_id,
            team: slip.outcome,
            stake: slip.stake,
            odds: slip.odds,
        }
    }
}

#[derive(Debug, Serialize)]
struct TransactionRequest {
    amount: Money,
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Deserialize)]
struct RawUser {
    balance: Money,
}

#[derive(Debug, Deserialize)]
struct RawBalanceUpdate {
    balance: Money,
    #[serde(default)]
    message: Option<String>,
}

#[async_trait]
impl MatchFeed for HttpBackend {
    async fn matches(&self, sport: Sport) -> Result<Vec<MatchSummary>> {
        let raw: Vec<RawMatch> = self.get(&format!("/api/{sport}/matches"), None).await?;
        let matches = raw
            .into_iter()
            .map(|m| m.into_detail(sport).map(|d| d.summary))
            .collect::<Result<Vec<_>, _>>()?;
        debug!(%sport, count = matches.len(), "matches fetched");
        Ok(matches)
    }

    async fn match_detail(&self, sport: Sport, id: MatchId) -> Result<MatchDetail> {
        let raw: RawMatch = self.get(&format!("/api/{sport}/match/{id}"), None).await?;
        Ok(raw.into_detail(sport)?)
    }
}

#[async_trait]
impl MatchLookup for HttpBackend {
    async fn lookup(&self, id: MatchId) -> Result<MatchInfo> {
        let raw: RawMatchInfo = self.get(&format!("/match/{id}"), None).await?;
        Ok(MatchInfo {
            home: raw.home_team,
            away: raw.away_team,
        })
    }
}

#[async_trait]
impl BetService for HttpBackend {
    async fn place_bet(&self, slip: &BetSlip) -> Result<BetLedgerEntry> {
        let body = BetRequest::from(slip);
        let response: serde_json::Value = self.post("/api/bets", &body, Some(&slip.identity)).await?;

        // the backend may answer with the created bet or with an acknowledgement only
        match serde_json::from_value::<BetLedgerEntry>(response) {
            Ok(entry) => Ok(entry),
            Err(_) => Ok(BetLedgerEntry::pending(
                slip.match_id,
                slip.outcome,
                slip.stake,
                slip.odds,
                Utc::now(),
            )),
        }
    }
}

#[async_trait]
impl AccountService for HttpBackend {
    async fn balance(&self, identity: &Identity) -> Result<Money> {
        let path = user_path("/users", identity, "");
        let user: RawUser = self.get(&path, Some(identity)).await?;
        Ok(user.balance)
    }

    async fn apply_transaction(
        &self,
        identity: &Identity,
        kind: TransactionKind,
        amount: Money,
    ) -> Result<BalanceUpdate> {
        let path = user_path("/accounts/users", identity, "/balance");
        let body = TransactionRequest {
            amount,
            kind: transaction_type(kind),
        };
        let update: RawBalanceUpdate = self.post(&path, &body, Some(identity)).await?;
        Ok(BalanceUpdate {
            balance: update.balance,
            message: update.message,
        })
    }

    async fn transactions(&self, identity: &Identity) -> Result<Vec<BalanceTransaction>> {
        let path = user_path("/accounts/users", identity, "/transactions");
        self.get(&path, Some(identity)).await
    }

    async fn bets(&self, identity: &Identity) -> Result<BetHistory> {
        let path = user_path("/users", identity, "/bets");
        self.get(&path, Some(identity)).await
    }
}
