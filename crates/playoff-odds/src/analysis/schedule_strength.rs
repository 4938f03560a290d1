// Remaining-schedule difficulty and key-game detection.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::config::SeasonConfig;
use crate::schedule::RemainingGame;
use crate::standings::tiebreak::sorted_standings;
use crate::standings::TeamRecord;

const TOP_TEAM_POINTS: u32 = 100;
const BOTTOM_TEAM_POINTS: u32 = 80;
const CRUCIAL_IMPORTANCE: f64 = 0.65;
const MUST_WIN_IMPORTANCE: f64 = 0.80;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DifficultyTier {
    Easy,
    Average,
    Hard,
    Brutal,
}

impl DifficultyTier {
    pub fn from_difficulty(difficulty: f64) -> Self {
        if difficulty < 3.5 {
            DifficultyTier::Easy
        } else if difficulty < 5.5 {
            DifficultyTier::Average
        } else if difficulty < 7.5 {
            DifficultyTier::Hard
        } else {
            DifficultyTier::Brutal
        }
    }
}

impl fmt::Display for DifficultyTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            DifficultyTier::Easy => "Easy",
            DifficultyTier::Average => "Average",
            DifficultyTier::Hard => "Hard",
            DifficultyTier::Brutal => "Brutal",
        };
        f.write_str(label)
    }
}

/// An upcoming game whose importance clears the crucial threshold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrucialGame {
    pub date: DateTime<Utc>,
    pub opponent: String,
    pub is_home: bool,
    pub is_division_game: bool,
    pub is_direct_competitor: bool,
    pub is_playoff_team: bool,
    pub opponent_points: u32,
    pub opponent_rank: usize,
    pub importance: f64,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamScheduleStrength {
    pub team_code: String,
    pub remaining_games: usize,
    pub home_games: usize,
    pub away_games: usize,
    pub avg_opponent_points: f64,
    pub avg_opponent_point_pct: f64,
    pub median_opponent_points: f64,
    pub std_dev_opponent_points: f64,
    pub division_games: usize,
    pub conference_games: usize,
    pub non_conference_games: usize,
    pub playoff_team_games: usize,
    /// Games against teams above 100 points.
    pub top_team_games: usize,
    /// Games against teams below 80 points.
    pub bottom_team_games: usize,
    pub back_to_backs: usize,
    pub three_in_fours: usize,
    /// 0 (easy) to 10 (brutal).
    pub difficulty: f64,
    pub tier: DifficultyTier,
    pub crucial_games: Vec<CrucialGame>,
    pub must_win_games: usize,
}

impl TeamScheduleStrength {
    fn empty(team_code: &str) -> Self {
        Self {
            team_code: team_code.to_string(),
            remaining_games: 0,
            home_games: 0,
            away_games: 0,
            avg_opponent_points: 0.0,
            avg_opponent_point_pct: 0.0,
            median_opponent_points: 0.0,
            std_dev_opponent_points: 0.0,
            division_games: 0,
            conference_games: 0,
            non_conference_games: 0,
            playoff_team_games: 0,
            top_team_games: 0,
            bottom_team_games: 0,
            back_to_backs: 0,
            three_in_fours: 0,
            difficulty: NEUTRAL_DIFFICULTY,
            tier: DifficultyTier::from_difficulty(NEUTRAL_DIFFICULTY),
            crucial_games: Vec::new(),
            must_win_games: 0,
        }
    }
}

const NEUTRAL_DIFFICULTY: f64 = 5.0;

/// Spread of difficulty across a conference.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DifficultySummary {
    pub average: f64,
    pub std_dev: f64,
    pub min: f64,
    pub max: f64,
}

// ---------------------------------------------------------------------------
// Analyzer
// ---------------------------------------------------------------------------

/// Standings lookup with conference ranks precomputed.
#[derive(Debug, Clone)]
pub struct ScheduleAnalyzer<'a> {
    teams: HashMap<&'a str, &'a TeamRecord>,
    ranks: HashMap<String, usize>,
    all: &'a [TeamRecord],
    season: &'a SeasonConfig,
}

impl<'a> ScheduleAnalyzer<'a> {
    pub fn new(standings: &'a [TeamRecord], season: &'a SeasonConfig) -> Self {
        let teams = standings
            .iter()
            .map(|t| (t.team_code.as_str(), t))
            .collect();

        let mut by_conference: HashMap<&str, Vec<TeamRecord>> = HashMap::new();
        for t in standings {
            by_conference
                .entry(t.conference.as_str())
                .or_default()
                .push(t.clone());
        }
        let mut ranks = HashMap::new();
        for members in by_conference.values() {
            for (i, t) in sorted_standings(members).iter().enumerate() {
                ranks.insert(t.team_code.clone(), i + 1);
            }
        }

        Self {
            teams,
            ranks,
            all: standings,
            season,
        }
    }

    /// Conference rank, or one past the last place when unknown.
    pub fn rank_of(&self, team: &TeamRecord) -> usize {
        self.ranks
            .get(&team.team_code)
            .copied()
            .unwrap_or(self.all.len() + 1)
    }

    pub fn is_playoff_team(&self, team: &TeamRecord) -> bool {
        self.rank_of(team) <= self.season.playoff_spots
    }

    /// Same conference, within 10 points, and either both on the bubble
    /// (5th to 12th) or within 5 points.
    pub fn is_direct_competitor(&self, a: &TeamRecord, b: &TeamRecord) -> bool {
        if a.conference != b.conference {
            return false;
        }
        let diff = a.points.abs_diff(b.points);
        if diff > 10 {
            return false;
        }
        let bubble = |rank: usize| (5..=12).contains(&rank);
        (bubble(self.rank_of(a)) && bubble(self.rank_of(b))) || diff <= 5
    }

    /// Importance of a game for `team`, in `[0, 1]`.
    pub fn game_importance(&self, team: &TeamRecord, opponent: &TeamRecord, is_home: bool) -> f64 {
        let mut importance: f64 = 0.4;
        let competitor = self.is_direct_competitor(team, opponent);

        if team.division == opponent.division {
            importance += 0.15;
        }
        if competitor {
            importance += 0.20;
        }
        if self.is_playoff_team(opponent) {
            importance += 0.10;
        }
        let remaining = team.games_remaining(self.season.games_per_season);
        if remaining < 20 {
            importance += f64::from(20 - remaining) / 20.0 * 0.15;
        }
        if !is_home && opponent.point_pct > 0.600 {
            importance += 0.05;
        }
        if is_home && competitor {
            importance += 0.05;
        }
        importance.min(1.0)
    }

    pub fn analyze_team_schedule(
        &self,
        team_code: &str,
        games: &[RemainingGame],
    ) -> TeamScheduleStrength {
        let mut strength = TeamScheduleStrength::empty(team_code);
        let Some(team) = self.teams.get(team_code).copied() else {
            return strength;
        };

        let mut opponent_points: Vec<f64> = Vec::new();
        let mut total_opponent_pct = 0.0;
        let mut previous: Option<DateTime<Utc>> = None;
        let mut window: Vec<DateTime<Utc>> = Vec::new();

        for game in games {
            let (opponent_code, is_home) = if game.home == team_code {
                (&game.away, true)
            } else if game.away == team_code {
                (&game.home, false)
            } else {
                continue;
            };

            if is_home {
                strength.home_games += 1;
            } else {
                strength.away_games += 1;
            }
            strength.remaining_games += 1;

            let Some(opponent) = self.teams.get(opponent_code.as_str()).copied() else {
                continue;
            };

            opponent_points.push(f64::from(opponent.points));
            total_opponent_pct += opponent.point_pct;

            let playoff_team = self.is_playoff_team(opponent);
            if playoff_team {
                strength.playoff_team_games += 1;
            }
            if opponent.points > TOP_TEAM_POINTS {
                strength.top_team_games += 1;
            }
            if opponent.points < BOTTOM_TEAM_POINTS {
                strength.bottom_team_games += 1;
            }
            if opponent.division == team.division {
                strength.division_games += 1;
            }
            if opponent.conference == team.conference {
                strength.conference_games += 1;
            } else {
                strength.non_conference_games += 1;
            }

            if let Some(prev) = previous {
                let hours = (game.date - prev).num_minutes() as f64 / 60.0;
                if (18.0..=30.0).contains(&hours) {
                    strength.back_to_backs += 1;
                }
            }
            previous = Some(game.date);

            let cutoff = game.date - Duration::hours(96);
            window.push(game.date);
            window.retain(|d| *d >= cutoff);
            if window.len() >= 3 {
                strength.three_in_fours += 1;
            }

            let importance = self.game_importance(team, opponent, is_home);
            if importance > CRUCIAL_IMPORTANCE {
                strength.crucial_games.push(CrucialGame {
                    date: game.date,
                    opponent: opponent.team_code.clone(),
                    is_home,
                    is_division_game: opponent.division == team.division,
                    is_direct_competitor: self.is_direct_competitor(team, opponent),
                    is_playoff_team: playoff_team,
                    opponent_points: opponent.points,
                    opponent_rank: self.rank_of(opponent),
                    importance,
                    description: self.describe(team, opponent, is_home, importance),
                });
                if importance > MUST_WIN_IMPORTANCE {
                    strength.must_win_games += 1;
                }
            }
        }

        if !opponent_points.is_empty() {
            let n = opponent_points.len() as f64;
            strength.avg_opponent_point_pct = total_opponent_pct / n;
            strength.avg_opponent_points = opponent_points.iter().sum::<f64>() / n;
            strength.median_opponent_points = median(&mut opponent_points);
            let variance = opponent_points
                .iter()
                .map(|p| (p - strength.avg_opponent_points).powi(2))
                .sum::<f64>()
                / n;
            strength.std_dev_opponent_points = variance.sqrt();
        }

        strength.difficulty = difficulty(&strength);
        strength.tier = DifficultyTier::from_difficulty(strength.difficulty);
        strength.crucial_games.sort_by_key(|g| g.date);
        strength
    }

    /// Difficulty spread across every team of `conference`.
    pub fn conference_summary(&self, conference: &str, games: &[RemainingGame]) -> DifficultySummary {
        let difficulties: Vec<f64> = self
            .all
            .iter()
            .filter(|t| t.conference == conference)
            .map(|t| self.analyze_team_schedule(&t.team_code, games).difficulty)
            .collect();
        if difficulties.is_empty() {
            return DifficultySummary::default();
        }
        let n = difficulties.len() as f64;
        let average = difficulties.iter().sum::<f64>() / n;
        let variance = difficulties.iter().map(|d| (d - average).powi(2)).sum::<f64>() / n;
        DifficultySummary {
            average,
            std_dev: variance.sqrt(),
            min: difficulties.iter().copied().fold(f64::INFINITY, f64::min),
            max: difficulties.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        }
    }

    fn describe(&self, team: &TeamRecord, opponent: &TeamRecord, is_home: bool, importance: f64) -> String {
        let location = if is_home { "vs" } else { "@" };
        let mut description = if importance > 0.85 {
            format!(
                "CRITICAL: {location} {} (Rank #{})",
                opponent.team_name,
                self.rank_of(opponent)
            )
        } else if importance > 0.75 {
            format!("Must-Win: {location} {}", opponent.team_name)
        } else {
            format!("Key Game: {location} {}", opponent.team_name)
        };

        if self.is_direct_competitor(team, opponent) {
            description.push_str(" (Direct Competitor)");
        } else if self.is_playoff_team(opponent) {
            description.push_str(" (Playoff Team)");
        }
        if team.division == opponent.division {
            description.push_str(" [Division]");
        }
        description
    }
}

/// Analyze `team_code`'s remaining games against the full standings.
pub fn analyze_team_schedule(
    team_code: &str,
    standings: &[TeamRecord],
    games: &[RemainingGame],
    season: &SeasonConfig,
) -> TeamScheduleStrength {
    ScheduleAnalyzer::new(standings, season).analyze_team_schedule(team_code, games)
}

/// Weighted 0-10 score: opponent point pct 35%, playoff opponents 25%, top
/// opponents 15%, road games 10%, division games 10%, back-to-backs 5%.
fn difficulty(s: &TeamScheduleStrength) -> f64 {
    if s.remaining_games == 0 {
        return NEUTRAL_DIFFICULTY;
    }
    let n = s.remaining_games as f64;
    let share = |count: usize| count as f64 / n * 10.0;

    let opponent = (s.avg_opponent_point_pct - 0.400) / 0.200 * 10.0 * 0.35;
    let score = opponent
        + share(s.playoff_team_games) * 0.25
        + share(s.top_team_games) * 0.15
        + share(s.away_games) * 0.10
        + share(s.division_games) * 0.10
        + share(s.back_to_backs) * 0.05;
    score.clamp(0.0, 10.0)
}

fn median(values: &mut [f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.sort_by(f64::total_cmp);
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) / 2.0
    } else {
        values[mid]
    }
}
