// Hypothetical scenarios: forced results, fixed win rates, and the
// state-derived cache key for their results.

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::schedule::RemainingGame;
use crate::standings::{GameDecision, TeamRecord};

/// Point percentage treated as an even team when scaling forced results.
const EVEN_POINT_PCT: f64 = 0.5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WhatIfScenario {
    pub name: String,
    pub description: String,
    /// Forced wins over the team's next games.
    pub win_next: u32,
    /// Forced losses after the forced wins.
    pub lose_next: u32,
    /// Fixed win probability for the team's remaining games; 0 keeps the
    /// configured predictor.
    pub win_rate: f64,
}

impl WhatIfScenario {
    pub fn win_next(n: u32) -> Self {
        Self {
            name: format!("Win Next {n}"),
            description: format!("What if we win the next {n} games?"),
            win_next: n,
            lose_next: 0,
            win_rate: 0.0,
        }
    }

    pub fn lose_next(n: u32) -> Self {
        Self {
            name: format!("Lose Next {n}"),
            description: format!("What if we lose the next {n} games?"),
            win_next: 0,
            lose_next: n,
            win_rate: 0.0,
        }
    }

    pub fn with_win_rate(name: &str, description: &str, win_rate: f64) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            win_next: 0,
            lose_next: 0,
            win_rate,
        }
    }

    pub fn forced_games(&self) -> u32 {
        self.win_next + self.lose_next
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Likelihood {
    Likely,
    Possible,
    Unlikely,
    Neutral,
}

impl fmt::Display for Likelihood {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Likelihood::Likely => "likely",
            Likelihood::Possible => "possible",
            Likelihood::Unlikely => "unlikely",
            Likelihood::Neutral => "neutral",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WhatIfResult {
    pub scenario: WhatIfScenario,
    pub trials: usize,
    pub projected_points: u32,
    /// "W-L-OTL" after the forced results.
    pub projected_record: String,
    pub playoff_odds: f64,
    /// Percentage points versus the unmodified baseline.
    pub playoff_odds_change: f64,
    pub avg_final_points: f64,
    pub median_final_points: u32,
    /// Baseline average rank minus scenario average rank.
    pub rank_improvement: f64,
    /// Baseline magic number minus scenario magic number.
    pub magic_number_change: i64,
    pub likelihood: Likelihood,
}

/// Cache key over the scenario and the team's current state: SHA-256 of
/// `code|name|points|games_played|win_next|lose_next|win_rate`, first 128
/// bits as hex.
pub fn cache_key(team_code: &str, scenario: &WhatIfScenario, points: u32, games_played: u32) -> String {
    let data = format!(
        "{}|{}|{}|{}|{}|{}|{:.3}",
        team_code,
        scenario.name,
        points,
        games_played,
        scenario.win_next,
        scenario.lose_next,
        scenario.win_rate
    );
    let digest = Sha256::digest(data.as_bytes());
    hex::encode(&digest[..16])
}

/// Baseline record with the scenario's forced results applied.
#[derive(Debug, Clone, PartialEq)]
pub struct AppliedScenario {
    pub record: TeamRecord,
    /// Forced results actually applied, after capping at games remaining.
    pub forced_games: u32,
}

/// Apply forced wins, then forced losses, never exceeding the games left.
/// Forced wins are regulation wins; forced losses are regulation losses.
pub fn apply_scenario(baseline: &TeamRecord, scenario: &WhatIfScenario, season_length: u32) -> AppliedScenario {
    let remaining = baseline.games_remaining(season_length);
    let wins = scenario.win_next.min(remaining);
    let losses = scenario.lose_next.min(remaining - wins);

    let mut record = baseline.clone();
    for _ in 0..wins {
        record.record_win(GameDecision::Regulation);
    }
    for _ in 0..losses {
        record.record_loss(GameDecision::Regulation);
    }
    record.refresh_point_pct();

    AppliedScenario {
        record,
        forced_games: wins + losses,
    }
}

/// Drop the first `count` games involving `team_code`, keeping every other
/// game in its original order.
pub fn filter_scenario_games(games: &[RemainingGame], team_code: &str, count: u32) -> Vec<RemainingGame> {
    let mut skipped = 0;
    games
        .iter()
        .filter(|g| {
            if skipped < count && g.involves(team_code) {
                skipped += 1;
                false
            } else {
                true
            }
        })
        .cloned()
        .collect()
}

/// How plausible the scenario is given the team's point percentage.
pub fn likelihood(scenario: &WhatIfScenario, point_pct: f64) -> Likelihood {
    let grade = |forced: u32, rate: f64| {
        let forced = f64::from(forced);
        let expected = forced * rate / EVEN_POINT_PCT;
        if expected >= forced * 0.8 {
            Likelihood::Likely
        } else if expected >= forced * 0.5 {
            Likelihood::Possible
        } else {
            Likelihood::Unlikely
        }
    };

    match (scenario.win_next, scenario.lose_next) {
        (w, 0) if w > 0 => grade(w, point_pct),
        (0, l) if l > 0 => grade(l, 1.0 - point_pct),
        (0, 0) if scenario.win_rate > 0.0 => {
            let gap = (scenario.win_rate - point_pct).abs();
            if gap <= 0.10 {
                Likelihood::Likely
            } else if gap <= 0.20 {
                Likelihood::Possible
            } else {
                Likelihood::Unlikely
            }
        }
        _ => Likelihood::Neutral,
    }
}

/// Stock scenarios that fit within the team's remaining games.
pub fn common_scenarios(team: &TeamRecord, season_length: u32) -> Vec<WhatIfScenario> {
    let remaining = team.games_remaining(season_length);
    [
        WhatIfScenario::win_next(3),
        WhatIfScenario::win_next(5),
        WhatIfScenario::win_next(10),
        WhatIfScenario::lose_next(3),
        WhatIfScenario::lose_next(5),
        WhatIfScenario::with_win_rate("Go .500", "What if we go 50/50 the rest of the way?", 0.50),
        WhatIfScenario::with_win_rate("Hot Streak", "What if we go .700 the rest of the way?", 0.70),
        WhatIfScenario::with_win_rate("Cold Streak", "What if we go .300 the rest of the way?", 0.30),
    ]
    .into_iter()
    .filter(|s| s.forced_games() <= remaining)
    .collect()
}
