//! Match catalog: the latest full snapshot of a sport's matches.
//!
//! A refresh replaces the whole snapshot or nothing. Responses from superseded
//! refreshes are discarded so a slow fetch can never overwrite a fresher one.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::error::{Result, TransportError};
use crate::model::{MatchId, MatchSummary, Sport};
use crate::service::MatchFeed;

/// What the view should show next to the catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Freshness {
    /// Never fetched.
    Empty,
    /// A fetch is in flight. The previous snapshot, if any, is still served.
    Loading,
    Fresh,
    /// The last fetch failed; serving the last known good snapshot.
    Stale { reason: String },
}

/// Handle for one refresh. Only the most recent token can apply its result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshToken(u64);

#[derive(Debug)]
pub struct Catalog {
    sport: Sport,
    matches: Vec<MatchSummary>,
    index: HashMap<MatchId, usize>,
    generation: u64,
    freshness: Freshness,
    fetched_at: Option<DateTime<Utc>>,
}

impl Catalog {
    pub fn new(sport: Sport) -> Self {
        Self {
            sport,
            matches: Vec::new(),
            index: HashMap::new(),
            generation: 0,
            freshness: Freshness::Empty,
            fetched_at: None,
        }
    }

    pub fn sport(&self) -> Sport {
        self.sport
    }

    pub fn freshness(&self) -> &Freshness {
        &self.freshness
    }

    pub fn fetched_at(&self) -> Option<DateTime<Utc>> {
        self.fetched_at
    }

    /// Every match in the snapshot, in feed order, finished ones included.
    pub fn all(&self) -> &[MatchSummary] {
        &self.matches
    }

    pub fn get(&self, id: MatchId) -> Option<&MatchSummary> {
        self.index.get(&id).map(|&i| &self.matches[i])
    }

    pub fn live(&self) -> impl Iterator<Item = &MatchSummary> + '_ {
        self.matches.iter().filter(|m| m.is_live())
    }

    pub fn upcoming(&self) -> impl Iterator<Item = &MatchSummary> + '_ {
        self.matches.iter().filter(|m| m.is_upcoming())
    }

    /// Case-insensitive substring match on team names and league, whitespace
    /// included. An empty query matches everything.
    pub fn search(&self, query: &str) -> Vec<&MatchSummary> {
        let needle = query.to_lowercase();
        self.matches
            .iter()
            .filter(|m| needle.is_empty() || m.matches_lowercase(&needle))
            .collect()
    }

    pub fn begin_refresh(&mut self) -> RefreshToken {
        self.generation += 1;
        self.freshness = Freshness::Loading;
        RefreshToken(self.generation)
    }

    /// Apply the result of the refresh identified by `token`.
    ///
    /// Returns `Ok(Some(count))` when the snapshot was replaced, `Ok(None)` when the
    /// token was superseded and the result discarded. On error the previous
    /// snapshot is kept and the catalog is marked stale.
    pub fn complete_refresh(
        &mut self,
        token: RefreshToken,
        result: Result<Vec<MatchSummary>>,
    ) -> Result<Option<usize>> {
        if token.0 != self.generation {
            debug!(
                sport = %self.sport,
                token = token.0,
                current = self.generation,
                "discarding superseded catalog response"
            );
            return Ok(None);
        }

        let applied = result.and_then(|matches| {
            let index = build_index(&matches)?;
            Ok((matches, index))
        });

        match applied {
            Ok((matches, index)) => {
                let count = matches.len();
                self.matches = matches;
                self.index = index;
                self.freshness = Freshness::Fresh;
                self.fetched_at = Some(Utc::now());
                info!(sport = %self.sport, count, "catalog refreshed");
                Ok(Some(count))
            }
            Err(err) => {
                warn!(
                    sport = %self.sport,
                    reason = %err,
                    kept = self.matches.len(),
                    "catalog refresh failed, keeping last snapshot"
                );
                self.freshness = Freshness::Stale {
                    reason: err.to_string(),
                };
                Err(err)
            }
        }
    }

    /// Fetch and apply a full snapshot from `feed`.
    pub async fn refresh(&mut self, feed: &dyn MatchFeed) -> Result<Option<usize>> {
        let token = self.begin_refresh();
        let result = feed.matches(self.sport).await;
        self.complete_refresh(token, result)
    }
}

fn build_index(matches: &[MatchSummary]) -> Result<HashMap<MatchId, usize>> {
    let mut index = HashMap::with_capacity(matches.len());
    for (i, summary) in matches.iter().enumerate() {
        if index.insert(summary.id, i).is_some() {
            return Err(TransportError::Malformed(format!(
                "duplicate match id {} in catalog",
                summary.id
            ))
            .into());
        }
    }
    Ok(index)
}

/// Group matches by league, leagues in first-seen order.
pub fn by_league<'a>(
    matches: impl IntoIterator<Item = &'a MatchSummary>,
) -> Vec<(&'a str, Vec<&'a MatchSummary>)> {
    let mut groups: Vec<(&'a str, Vec<&'a MatchSummary>)> = Vec::new();
    for summary in matches {
        match groups.iter_mut().find(|(league, _)| *league == summary.league) {
            Some((_, group)) => group.push(summary),
            None => groups.push((summary.league.as_str(), vec![summary])),
        }
    }
    groups
}

/// "Show N, load more" window over a filtered list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Paging {
    limit: usize,
    step: usize,
}

impl Paging {
    pub fn new(step: usize) -> Self {
        Self { limit: step, step }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn visible<'a, T>(&self, items: &'a [T]) -> &'a [T] {
        &items[..items.len().min(self.limit)]
    }

    pub fn has_more(&self, total: usize) -> bool {
        total > self.limit
    }

    pub fn load_more(&mut self) {
        self.limit += self.step;
    }
}

impl Default for Paging {
    fn default() -> Self {
        Self::new(5)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Error, ErrorKind};
    use crate::model::{MatchStatus, Team};
    use crate::testkit::{MemoryBackend, match_summary};

    fn with_status(id: u64, status: MatchStatus) -> MatchSummary {
        MatchSummary {
            status,
            ..match_summary(id, Sport::Football, Some(2.0), Some(3.0), Some(4.0))
        }
    }

    fn named(id: u64, home: &str, away: &str, league: &str) -> MatchSummary {
        MatchSummary {
            home: Team::named(home),
            away: Team::named(away),
            league: league.to_string(),
            ..match_summary(id, Sport::Football, Some(2.0), Some(3.0), Some(4.0))
        }
    }

    fn loaded(matches: Vec<MatchSummary>) -> Catalog {
        let mut catalog = Catalog::new(Sport::Football);
        let token = catalog.begin_refresh();
        catalog.complete_refresh(token, Ok(matches)).unwrap();
        catalog
    }

    #[test]
    fn new_catalog_is_empty() {
        let catalog = Catalog::new(Sport::Nfl);
        assert_eq!(catalog.freshness(), &Freshness::Empty);
        assert!(catalog.all().is_empty());
    }

    #[test]
    fn classifies_live_and_upcoming() {
        let catalog = loaded(vec![
            with_status(1, MatchStatus::Live),
            with_status(2, MatchStatus::NotStarted),
            with_status(3, MatchStatus::Finished),
            with_status(4, MatchStatus::Other("PST".into())),
        ]);

        let live: Vec<_> = catalog.live().map(|m| m.id).collect();
        let upcoming: Vec<_> = catalog.upcoming().map(|m| m.id).collect();
        assert_eq!(live, vec![MatchId(1)]);
        assert_eq!(upcoming, vec![MatchId(2)]);
        // excluded from buckets, still addressable
        assert!(catalog.get(MatchId(3)).is_some());
        assert!(catalog.get(MatchId(4)).is_some());
    }

    #[test]
    fn search_is_case_insensitive_over_teams_and_league() {
        let catalog = loaded(vec![
            named(1, "Arsenal", "Chelsea", "Premier League"),
            named(2, "Real Madrid", "Barcelona", "La Liga"),
            named(3, "Lakers", "Celtics", "NBA"),
        ]);

        let ids = |q: &str| catalog.search(q).iter().map(|m| m.id.0).collect::<Vec<_>>();
        assert_eq!(ids("arsenal"), vec![1]);
        assert_eq!(ids("BARCA"), Vec::<u64>::new());
        assert_eq!(ids("barc"), vec![2]);
        assert_eq!(ids("liga"), vec![2]);
        assert_eq!(ids("e"), vec![1, 2, 3]);
        assert_eq!(ids(""), vec![1, 2, 3]);
        assert_eq!(ids("real "), vec![2]);
        assert_eq!(ids(" arsenal"), Vec::<u64>::new());
        assert_eq!(catalog.all().len(), 3);
    }

    #[test]
    fn superseded_response_is_discarded() {
        let mut catalog = Catalog::new(Sport::Football);
        let slow = catalog.begin_refresh();
        let fast = catalog.begin_refresh();

        let applied = catalog
            .complete_refresh(fast, Ok(vec![with_status(2, MatchStatus::Live)]))
            .unwrap();
        assert_eq!(applied, Some(1));

        let applied = catalog
            .complete_refresh(slow, Ok(vec![with_status(1, MatchStatus::Live)]))
            .unwrap();
        assert_eq!(applied, None);
        assert!(catalog.get(MatchId(2)).is_some());
        assert!(catalog.get(MatchId(1)).is_none());
        assert_eq!(catalog.freshness(), &Freshness::Fresh);
    }

    #[test]
    fn failed_refresh_keeps_last_snapshot() {
        let mut catalog = loaded(vec![with_status(1, MatchStatus::Live)]);
        let token = catalog.begin_refresh();
        assert_eq!(catalog.freshness(), &Freshness::Loading);
        assert_eq!(catalog.all().len(), 1);

        let err = catalog
            .complete_refresh(
                token,
                Err(TransportError::Unreachable("timeout".into()).into()),
            )
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Transport);
        assert!(matches!(catalog.freshness(), Freshness::Stale { .. }));
        assert!(catalog.get(MatchId(1)).is_some());
    }

    #[test]
    fn duplicate_ids_reject_whole_snapshot() {
        let mut catalog = loaded(vec![with_status(1, MatchStatus::Live)]);
        let token = catalog.begin_refresh();
        let result = catalog.complete_refresh(
            token,
            Ok(vec![
                with_status(7, MatchStatus::Live),
                with_status(7, MatchStatus::NotStarted),
            ]),
        );

        assert!(matches!(
            result,
            Err(Error::Transport(TransportError::Malformed(_)))
        ));
        assert_eq!(catalog.all().len(), 1);
        assert!(catalog.get(MatchId(7)).is_none());
    }

    #[tokio::test]
    async fn refresh_replaces_snapshot_wholesale() {
        let backend = MemoryBackend::new().with_matches(
            Sport::Football,
            vec![with_status(1, MatchStatus::Live), with_status(2, MatchStatus::NotStarted)],
        );
        let mut catalog = Catalog::new(Sport::Football);
        assert_eq!(catalog.refresh(&backend).await.unwrap(), Some(2));

        backend.set_matches(Sport::Football, vec![with_status(3, MatchStatus::NotStarted)]);
        assert_eq!(catalog.refresh(&backend).await.unwrap(), Some(1));

        assert!(catalog.get(MatchId(1)).is_none());
        assert!(catalog.get(MatchId(3)).is_some());
        assert!(catalog.fetched_at().is_some());
    }

    #[test]
    fn groups_by_league_in_first_seen_order() {
        let catalog = loaded(vec![
            named(1, "A", "B", "Serie A"),
            named(2, "C", "D", "Bundesliga"),
            named(3, "E", "F", "Serie A"),
        ]);
        let groups = by_league(catalog.all());
        let summary: Vec<_> = groups
            .iter()
            .map(|(league, ms)| (*league, ms.iter().map(|m| m.id.0).collect::<Vec<_>>()))
            .collect();
        assert_eq!(
            summary,
            vec![("Serie A", vec![1, 3]), ("Bundesliga", vec![2])]
        );
    }

    #[test]
    fn paging_loads_more_in_steps() {
        let items: Vec<u32> = (0..12).collect();
        let mut paging = Paging::default();
        assert_eq!(paging.visible(&items).len(), 5);
        assert!(paging.has_more(items.len()));

        paging.load_more();
        paging.load_more();
        assert_eq!(paging.visible(&items).len(), 12);
        assert!(!paging.has_more(items.len()));
    }
}
