//! Bet history reconciliation.
//!
//! Joins bet entries with match names for display. Lookups are deduplicated,
//! served from loaded catalogs first, and the rest are fetched concurrently.
//! A failed lookup only degrades its own rows to an id label.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use futures_util::future::join_all;
use tracing::{debug, warn};

use crate::bet::{BetLedgerEntry, BetStatus, partition};
use crate::catalog::Catalog;
use crate::model::{MatchId, MatchInfo};
use crate::service::MatchLookup;

/// Human-readable match label for a history row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchLabel {
    Teams { home: String, away: String },
    IdOnly(MatchId),
}

impl fmt::Display for MatchLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatchLabel::Teams { home, away } => write!(f, "{home} vs {away}"),
            MatchLabel::IdOnly(id) => write!(f, "Match #{id}"),
        }
    }
}

impl From<MatchInfo> for MatchLabel {
    fn from(info: MatchInfo) -> Self {
        MatchLabel::Teams {
            home: info.home,
            away: info.away,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryRow {
    pub entry: BetLedgerEntry,
    pub label: MatchLabel,
}

impl HistoryRow {
    /// One-line summary, e.g. `Arsenal vs Chelsea - Bet HOME`.
    pub fn headline(&self) -> String {
        format!(
            "{} - Bet {}",
            self.label,
            self.entry.outcome().as_str().to_uppercase()
        )
    }

    pub fn status_label(&self) -> &'static str {
        match self.entry.status() {
            BetStatus::Pending => "Pending",
            BetStatus::Won => "Won",
            BetStatus::Lost => "Lost",
        }
    }
}

/// Bets split into two disjoint groups by status.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HistoryView {
    pub pending: Vec<HistoryRow>,
    pub settled: Vec<HistoryRow>,
}

impl HistoryView {
    pub fn len(&self) -> usize {
        self.pending.len() + self.settled.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn rows(&self) -> impl Iterator<Item = &HistoryRow> {
        self.pending.iter().chain(&self.settled)
    }
}

pub struct Reconciler<'a> {
    lookup: &'a dyn MatchLookup,
    catalogs: Vec<&'a Catalog>,
}

impl<'a> Reconciler<'a> {
    pub fn new(lookup: &'a dyn MatchLookup) -> Self {
        Self {
            lookup,
            catalogs: Vec::new(),
        }
    }

    /// Resolve names from an already loaded catalog before asking the lookup service.
    pub fn with_catalog(mut self, catalog: &'a Catalog) -> Self {
        self.catalogs.push(catalog);
        self
    }

    pub async fn reconcile(&self, entries: impl IntoIterator<Item = BetLedgerEntry>) -> HistoryView {
        let (pending, settled) = partition(entries);
        let ids: BTreeSet<MatchId> = pending
            .iter()
            .chain(&settled)
            .map(BetLedgerEntry::match_id)
            .collect();
        let labels = self.resolve(ids).await;

        let to_rows = |entries: Vec<BetLedgerEntry>| -> Vec<HistoryRow> {
            entries
                .into_iter()
                .map(|entry| {
                    let label = labels
                        .get(&entry.match_id())
                        .cloned()
                        .unwrap_or(MatchLabel::IdOnly(entry.match_id()));
                    HistoryRow { entry, label }
                })
                .collect()
        };
        HistoryView {
            pending: to_rows(pending),
            settled: to_rows(settled),
        }
    }

    async fn resolve(&self, ids: BTreeSet<MatchId>) -> BTreeMap<MatchId, MatchLabel> {
        let mut labels: BTreeMap<MatchId, MatchLabel> = BTreeMap::new();
        let mut missing = Vec::new();
        for id in ids {
            match self.catalogs.iter().find_map(|c| c.get(id)) {
                Some(summary) => {
                    labels.insert(id, summary.info().into());
                }
                None => missing.push(id),
            }
        }
        debug!(cached = labels.len(), fetching = missing.len(), "resolving match labels");

        let lookups = missing
            .into_iter()
            .map(|id| async move { (id, self.lookup.lookup(id).await) });
        for (id, result) in join_all(lookups).await {
            match result {
                Ok(info) => {
                    labels.insert(id, info.into());
                }
                Err(err) => {
                    warn!(match_id = %id, reason = %err, "match lookup failed, using id label");
                }
            }
        }
        labels
    }
}
