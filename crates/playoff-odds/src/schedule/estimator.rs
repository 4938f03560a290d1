// Deterministic round-robin estimate of the remaining schedule.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tracing::info;

use super::{RemainingGame, ScheduleError, ScheduleSource};
use crate::standings::TeamRecord;

/// Days between estimated game days.
const DAYS_BETWEEN_GAMES: i64 = 2;

/// Pairs conference teams round by round until every team has used up its
/// remaining games, alternating home and away, one game day every two days.
#[derive(Debug, Clone)]
pub struct RoundRobinEstimator {
    season_length: u32,
}

impl RoundRobinEstimator {
    pub fn new(season_length: u32) -> Self {
        Self { season_length }
    }

    /// Estimated games starting at `start`, sorted chronologically.
    ///
    /// Every game consumes one remaining game from each side, so no team is
    /// scheduled past the season length. Each round is one game day in which
    /// a team plays at most once; rotating the first opponent tried spreads
    /// the games across the conference. When remaining counts are uneven a
    /// team may be left with games nobody can fill.
    pub fn estimate(&self, conference: &[TeamRecord], start: DateTime<Utc>) -> Vec<RemainingGame> {
        let mut games = Vec::new();
        let n = conference.len();
        if n < 2 {
            return games;
        }

        let mut left: Vec<u32> = conference
            .iter()
            .map(|t| t.games_remaining(self.season_length))
            .collect();

        let mut round = 0usize;
        loop {
            let date = start + Duration::days(round as i64 * DAYS_BETWEEN_GAMES);
            let mut busy = vec![false; n];
            let mut scheduled = false;

            for i in 0..n {
                if busy[i] || left[i] == 0 {
                    continue;
                }
                let opponent = (0..n - 1)
                    .map(|k| (i + 1 + (round + k) % (n - 1)) % n)
                    .find(|&j| !busy[j] && left[j] > 0);
                let Some(j) = opponent else {
                    continue;
                };

                let (home, away) = if round % 2 == 0 { (i, j) } else { (j, i) };
                games.push(RemainingGame::new(
                    &conference[home].team_code,
                    &conference[away].team_code,
                    date,
                ));
                busy[i] = true;
                busy[j] = true;
                left[i] -= 1;
                left[j] -= 1;
                scheduled = true;
            }

            if !scheduled {
                break;
            }
            round += 1;
        }

        let unfilled: u32 = left.iter().sum();
        info!(
            "estimated {} remaining games over {} game days ({} unfilled)",
            games.len(),
            round,
            unfilled
        );
        games
    }
}

#[async_trait]
impl ScheduleSource for RoundRobinEstimator {
    async fn remaining_games(
        &self,
        conference: &[TeamRecord],
    ) -> Result<Vec<RemainingGame>, ScheduleError> {
        Ok(self.estimate(conference, Utc::now()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::standings::record::test_support::record;
    use chrono::TimeZone;
    use std::collections::{HashMap, HashSet};

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap()
    }

    fn conference(games_played: u32) -> Vec<TeamRecord> {
        ["AAA", "BBB", "CCC", "DDD"]
            .iter()
            .map(|code| {
                let wins = games_played / 2;
                record(code, "Atlantic", wins, games_played - wins, 0)
            })
            .collect()
    }

    #[test]
    fn deterministic_and_sorted() {
        let estimator = RoundRobinEstimator::new(82);
        let a = estimator.estimate(&conference(70), start());
        let b = estimator.estimate(&conference(70), start());
        assert_eq!(a, b);
        assert!(a.windows(2).all(|w| w[0].date <= w[1].date));
        assert!(a.iter().all(|g| g.home != g.away));
    }

    fn games_per_team(games: &[RemainingGame]) -> HashMap<String, u32> {
        let mut counts = HashMap::new();
        for g in games {
            *counts.entry(g.home.clone()).or_default() += 1;
            *counts.entry(g.away.clone()).or_default() += 1;
        }
        counts
    }

    #[test]
    fn every_team_plays_exactly_its_remaining_games() {
        let estimator = RoundRobinEstimator::new(82);
        let teams = conference(70);
        let games = estimator.estimate(&teams, start());
        assert_eq!(games.len(), 24);
        let counts = games_per_team(&games);
        for t in &teams {
            assert_eq!(counts[&t.team_code], 12, "{}", t.team_code);
        }
    }

    #[test]
    fn sixteen_teams_finish_the_season() {
        let teams: Vec<TeamRecord> = (0..16)
            .map(|i| record(&format!("T{i:02}"), "Atlantic", 30, 25, 5))
            .collect();
        let games = RoundRobinEstimator::new(82).estimate(&teams, start());
        let counts = games_per_team(&games);
        for t in &teams {
            assert_eq!(t.games_played + counts[&t.team_code], 82);
        }
        // A full round every game day.
        assert_eq!(games.len(), 16 * 22 / 2);
        assert_eq!(games.last().unwrap().date, start() + Duration::days(21 * 2));
        // Opponents rotate rather than repeating one pairing.
        let mut opponents: HashMap<&str, HashSet<&str>> = HashMap::new();
        for g in &games {
            opponents.entry(g.home.as_str()).or_default().insert(g.away.as_str());
            opponents.entry(g.away.as_str()).or_default().insert(g.home.as_str());
        }
        assert!(opponents.values().all(|o| o.len() >= 8));
    }

    #[test]
    fn uneven_remaining_never_overschedules() {
        let mut teams = conference(70);
        // AAA has 2 left, BBB 12, CCC 20, DDD 7.
        for (t, gp) in teams.iter_mut().zip([80, 70, 62, 75]) {
            let wins = gp / 2;
            *t = record(&t.team_code, "Atlantic", wins, gp - wins, 0);
        }
        let games = RoundRobinEstimator::new(82).estimate(&teams, start());
        let counts = games_per_team(&games);
        for t in &teams {
            let played = counts.get(&t.team_code).copied().unwrap_or(0);
            assert!(played <= t.games_remaining(82), "{}", t.team_code);
        }
        // Nobody plays twice on the same day.
        let mut days: HashSet<(String, DateTime<Utc>)> = HashSet::new();
        for g in &games {
            assert!(days.insert((g.home.clone(), g.date)));
            assert!(days.insert((g.away.clone(), g.date)));
        }
    }

    #[test]
    fn finished_season_yields_nothing() {
        let estimator = RoundRobinEstimator::new(82);
        assert!(estimator.estimate(&conference(82), start()).is_empty());
    }

    #[test]
    fn single_team_yields_nothing() {
        let estimator = RoundRobinEstimator::new(82);
        let teams = vec![record("AAA", "Atlantic", 30, 30, 0)];
        assert!(estimator.estimate(&teams, start()).is_empty());
    }

    #[test]
    fn first_game_is_on_start_date() {
        let games = RoundRobinEstimator::new(82).estimate(&conference(70), start());
        assert_eq!(games[0].date, start());
        assert_eq!(games[0].home, "AAA");
        assert_eq!(games[0].away, "BBB");
    }
}
