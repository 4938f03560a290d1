// Remaining-schedule sources: live per-team lookup with an estimator fallback.

pub mod estimator;

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::standings::TeamRecord;

pub use estimator::RoundRobinEstimator;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// An unplayed game. Shared read-only by every trial of a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemainingGame {
    pub home: String,
    pub away: String,
    pub date: DateTime<Utc>,
}

impl RemainingGame {
    pub fn new(home: impl Into<String>, away: impl Into<String>, date: DateTime<Utc>) -> Self {
        Self {
            home: home.into(),
            away: away.into(),
            date,
        }
    }

    pub fn involves(&self, team_code: &str) -> bool {
        self.home == team_code || self.away == team_code
    }

    /// Identity used for de-duplication: calendar date plus the sorted pair.
    fn dedup_key(&self) -> (String, String, String) {
        let (a, b) = if self.home <= self.away {
            (&self.home, &self.away)
        } else {
            (&self.away, &self.home)
        };
        (
            self.date.format("%Y-%m-%d").to_string(),
            a.clone(),
            b.clone(),
        )
    }
}

/// One entry of a team's season schedule as returned by a fetcher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledGame {
    pub home: String,
    pub away: String,
    pub start_time: DateTime<Utc>,
}

#[derive(Debug, thiserror::Error)]
pub enum ScheduleError {
    #[error("failed to fetch schedule for {team}: {message}")]
    Fetch { team: String, message: String },

    #[error("no schedule data: all {failed} team lookups failed")]
    AllFetchesFailed { failed: usize },
}

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// Supplies the conference's remaining games in chronological order.
#[async_trait]
pub trait ScheduleSource: Send + Sync {
    async fn remaining_games(
        &self,
        conference: &[TeamRecord],
    ) -> Result<Vec<RemainingGame>, ScheduleError>;
}

/// Fetches one team's full season schedule.
#[async_trait]
pub trait TeamScheduleFetcher: Send + Sync {
    async fn fetch_team_schedule(&self, team_code: &str)
        -> Result<Vec<ScheduledGame>, ScheduleError>;
}

// ---------------------------------------------------------------------------
// Live source
// ---------------------------------------------------------------------------

/// Queries every conference team's schedule concurrently and merges them.
#[derive(Debug, Clone)]
pub struct LiveScheduleSource<F> {
    fetcher: F,
}

impl<F: TeamScheduleFetcher> LiveScheduleSource<F> {
    pub fn new(fetcher: F) -> Self {
        Self { fetcher }
    }

    /// Fetch and merge, keeping only games after `now`.
    pub async fn remaining_games_after(
        &self,
        conference: &[TeamRecord],
        now: DateTime<Utc>,
    ) -> Result<Vec<RemainingGame>, ScheduleError> {
        let lookups = conference
            .iter()
            .map(|team| self.fetcher.fetch_team_schedule(&team.team_code));
        let results = join_all(lookups).await;

        let mut schedules = Vec::with_capacity(results.len());
        let mut failed = 0;
        for result in results {
            match result {
                Ok(schedule) => schedules.push(schedule),
                Err(e) => {
                    warn!("{e}");
                    failed += 1;
                }
            }
        }

        let games = merge_team_schedules(&schedules, conference, now);
        info!(
            "fetched schedules for {} teams ({} failed), {} remaining conference games",
            conference.len(),
            failed,
            games.len()
        );

        if schedules.is_empty() && failed > 0 {
            return Err(ScheduleError::AllFetchesFailed { failed });
        }
        Ok(games)
    }
}

#[async_trait]
impl<F: TeamScheduleFetcher> ScheduleSource for LiveScheduleSource<F> {
    async fn remaining_games(
        &self,
        conference: &[TeamRecord],
    ) -> Result<Vec<RemainingGame>, ScheduleError> {
        self.remaining_games_after(conference, Utc::now()).await
    }
}

/// Merge per-team schedules into one de-duplicated, chronologically sorted
/// list of future games between conference teams.
pub fn merge_team_schedules(
    schedules: &[Vec<ScheduledGame>],
    conference: &[TeamRecord],
    now: DateTime<Utc>,
) -> Vec<RemainingGame> {
    let members: HashSet<&str> = conference.iter().map(|t| t.team_code.as_str()).collect();
    let mut seen = HashSet::new();
    let mut games = Vec::new();

    for game in schedules.iter().flatten() {
        if game.start_time <= now {
            continue;
        }
        if !members.contains(game.home.as_str()) || !members.contains(game.away.as_str()) {
            continue;
        }
        let remaining = RemainingGame::new(&game.home, &game.away, game.start_time);
        if seen.insert(remaining.dedup_key()) {
            games.push(remaining);
        }
    }

    games.sort_by_key(|g| g.date);
    games
}

// ---------------------------------------------------------------------------
// Fallback wrapper
// ---------------------------------------------------------------------------

/// Uses `primary`, and the round-robin estimate whenever it fails.
#[derive(Debug, Clone)]
pub struct FallbackScheduleSource<P> {
    primary: P,
    estimator: RoundRobinEstimator,
}

impl<P: ScheduleSource> FallbackScheduleSource<P> {
    pub fn new(primary: P, estimator: RoundRobinEstimator) -> Self {
        Self { primary, estimator }
    }
}

#[async_trait]
impl<P: ScheduleSource> ScheduleSource for FallbackScheduleSource<P> {
    async fn remaining_games(
        &self,
        conference: &[TeamRecord],
    ) -> Result<Vec<RemainingGame>, ScheduleError> {
        match self.primary.remaining_games(conference).await {
            Ok(games) => Ok(games),
            Err(e) => {
                warn!("schedule lookup failed, estimating remaining games: {e}");
                self.estimator.remaining_games(conference).await
            }
        }
    }
}

/// A fixed game list, filtered to the requested conference.
#[derive(Debug, Clone, Default)]
pub struct StaticSchedule {
    games: Vec<RemainingGame>,
}

impl StaticSchedule {
    pub fn new(mut games: Vec<RemainingGame>) -> Self {
        games.sort_by_key(|g| g.date);
        Self { games }
    }
}

#[async_trait]
impl ScheduleSource for StaticSchedule {
    async fn remaining_games(
        &self,
        conference: &[TeamRecord],
    ) -> Result<Vec<RemainingGame>, ScheduleError> {
        let members: HashSet<&str> = conference.iter().map(|t| t.team_code.as_str()).collect();
        Ok(self
            .games
            .iter()
            .filter(|g| members.contains(g.home.as_str()) && members.contains(g.away.as_str()))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::standings::record::test_support::record;
    use chrono::{Duration, TimeZone};
    use std::collections::HashMap;

    fn at(day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, day, hour, 0, 0).unwrap()
    }

    fn sg(home: &str, away: &str, start: DateTime<Utc>) -> ScheduledGame {
        ScheduledGame {
            home: home.into(),
            away: away.into(),
            start_time: start,
        }
    }

    fn conference() -> Vec<TeamRecord> {
        vec![
            record("AAA", "Atlantic", 30, 25, 5),
            record("BBB", "Atlantic", 30, 25, 5),
            record("CCC", "Metro", 30, 25, 5),
        ]
    }

    struct MapFetcher {
        schedules: HashMap<String, Vec<ScheduledGame>>,
    }

    #[async_trait]
    impl TeamScheduleFetcher for MapFetcher {
        async fn fetch_team_schedule(
            &self,
            team_code: &str,
        ) -> Result<Vec<ScheduledGame>, ScheduleError> {
            self.schedules
                .get(team_code)
                .cloned()
                .ok_or_else(|| ScheduleError::Fetch {
                    team: team_code.to_string(),
                    message: "not found".into(),
                })
        }
    }

    #[test]
    fn merge_dedups_filters_and_sorts() {
        let now = at(1, 12);
        let aaa = vec![
            sg("AAA", "BBB", at(5, 19)),
            sg("CCC", "AAA", at(3, 19)),
            sg("AAA", "ZZZ", at(4, 19)),
            sg("BBB", "AAA", at(1, 10)),
        ];
        // Same AAA-BBB game seen from BBB's side, plus a later rematch.
        let bbb = vec![sg("AAA", "BBB", at(5, 19)), sg("BBB", "AAA", at(9, 19))];

        let games = merge_team_schedules(&[aaa, bbb], &conference(), now);
        assert_eq!(
            games,
            vec![
                RemainingGame::new("CCC", "AAA", at(3, 19)),
                RemainingGame::new("AAA", "BBB", at(5, 19)),
                RemainingGame::new("BBB", "AAA", at(9, 19)),
            ]
        );
    }

    #[test]
    fn dedup_key_ignores_home_away_and_time_of_day() {
        let a = RemainingGame::new("AAA", "BBB", at(5, 12));
        let b = RemainingGame::new("BBB", "AAA", at(5, 19));
        assert_eq!(a.dedup_key(), b.dedup_key());
    }

    #[tokio::test]
    async fn live_source_tolerates_partial_failures() {
        let fetcher = MapFetcher {
            schedules: HashMap::from([(
                "AAA".to_string(),
                vec![sg("AAA", "CCC", at(10, 19))],
            )]),
        };
        let source = LiveScheduleSource::new(fetcher);
        let games = source
            .remaining_games_after(&conference(), at(1, 0))
            .await
            .unwrap();
        assert_eq!(games.len(), 1);
    }

    #[tokio::test]
    async fn season_over_with_one_failed_fetch_is_empty() {
        // AAA and BBB only report games that have already been played.
        let fetcher = MapFetcher {
            schedules: HashMap::from([
                ("AAA".to_string(), vec![sg("AAA", "BBB", at(1, 19))]),
                ("BBB".to_string(), vec![sg("AAA", "BBB", at(1, 19))]),
            ]),
        };
        let source = LiveScheduleSource::new(fetcher);
        let games = source
            .remaining_games_after(&conference(), at(2, 0))
            .await
            .unwrap();
        assert!(games.is_empty());
    }

    #[tokio::test]
    async fn live_source_fails_when_nothing_fetched() {
        let source = LiveScheduleSource::new(MapFetcher {
            schedules: HashMap::new(),
        });
        let err = source
            .remaining_games_after(&conference(), at(1, 0))
            .await
            .unwrap_err();
        assert!(matches!(err, ScheduleError::AllFetchesFailed { failed: 3 }));
    }

    #[tokio::test]
    async fn fallback_uses_estimator_on_failure() {
        let source = FallbackScheduleSource::new(
            LiveScheduleSource::new(MapFetcher {
                schedules: HashMap::new(),
            }),
            RoundRobinEstimator::new(82),
        );
        let games = source.remaining_games(&conference()).await.unwrap();
        assert!(!games.is_empty());
        assert!(games.windows(2).all(|w| w[0].date <= w[1].date));
        assert!(games[0].date >= Utc::now() - Duration::minutes(1));
    }

    #[tokio::test]
    async fn static_schedule_filters_to_conference() {
        let source = StaticSchedule::new(vec![
            RemainingGame::new("AAA", "XXX", at(2, 19)),
            RemainingGame::new("BBB", "CCC", at(3, 19)),
        ]);
        let games = source.remaining_games(&conference()).await.unwrap();
        assert_eq!(games, vec![RemainingGame::new("BBB", "CCC", at(3, 19))]);
    }
}
