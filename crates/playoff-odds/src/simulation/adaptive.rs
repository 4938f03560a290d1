// Trial count recommendation from how contested a team's position is.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::{AdaptiveConfig, SeasonConfig};
use crate::standings::tiebreak::{rank_in, sorted_standings};
use crate::standings::TeamRecord;

/// Gap reported when the conference is too small to have a cutoff team.
const DEFAULT_POINTS_GAP: i64 = 10;
/// Points within which a division berth is considered contested.
const DIVISION_RACE_WINDOW: i64 = 5;

/// Human-readable label for a recommended trial count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PrecisionTier {
    Critical,
    High,
    Elevated,
    Standard,
    Quick,
}

impl PrecisionTier {
    /// Tier for `count`. Counts between the fixed bands are `Elevated` when
    /// any urgency reason applies, `Standard` otherwise.
    pub fn classify(count: usize, reasons: &[&str]) -> Self {
        match count {
            c if c >= 8000 => PrecisionTier::Critical,
            c if c >= 6000 => PrecisionTier::High,
            5000 => PrecisionTier::Standard,
            c if c <= 2000 => PrecisionTier::Quick,
            _ if !reasons.is_empty() => PrecisionTier::Elevated,
            _ => PrecisionTier::Standard,
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            PrecisionTier::Critical => "maximum precision: tight race with few games left",
            PrecisionTier::High => "extra precision: bubble team or late season",
            PrecisionTier::Elevated => "more trials than usual",
            PrecisionTier::Standard => "default trial count",
            PrecisionTier::Quick => "fewer trials: position is clear",
        }
    }
}

impl fmt::Display for PrecisionTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            PrecisionTier::Critical => "CRITICAL",
            PrecisionTier::High => "HIGH",
            PrecisionTier::Elevated => "ELEVATED",
            PrecisionTier::Standard => "STANDARD",
            PrecisionTier::Quick => "QUICK",
        };
        f.write_str(label)
    }
}

/// A recommended trial count with the reasons behind it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrialRecommendation {
    pub trial_count: usize,
    pub tier: PrecisionTier,
    pub reasons: Vec<String>,
}

/// Recommended number of trials for `team` given its conference.
pub fn recommend_trial_count(
    team: &TeamRecord,
    conference: &[TeamRecord],
    adaptive: &AdaptiveConfig,
    season: &SeasonConfig,
) -> usize {
    recommend(team, conference, adaptive, season).trial_count
}

pub fn recommend(
    team: &TeamRecord,
    conference: &[TeamRecord],
    adaptive: &AdaptiveConfig,
    season: &SeasonConfig,
) -> TrialRecommendation {
    let sorted = sorted_standings(conference);
    let rank = rank_in(&sorted, &team.team_code).unwrap_or(sorted.len() + 1);
    let games_remaining = team.games_remaining(season.games_per_season);
    let gap = points_gap(team, &sorted, rank, season.playoff_spots);

    let mut count = adaptive.default as i64;

    if games_remaining < 5 {
        count += 2000;
    } else if games_remaining <= 10 {
        count += 1000;
    } else if games_remaining >= 40 {
        count -= 1000;
    }

    if (7..=10).contains(&rank) {
        count += 2000;
    } else if (5..=12).contains(&rank) {
        count += 1000;
    } else if rank <= 3 || rank >= 14 {
        count -= 1000;
    }

    if gap <= 2 {
        count += 1500;
    } else if gap <= 5 {
        count += 500;
    } else if gap >= 10 {
        count -= 1000;
    }

    if team.point_pct >= 0.650 || team.point_pct <= 0.350 {
        count -= 1000;
    }

    if in_division_race(team, &sorted, season.division_spots) {
        count += 1000;
    }

    let clamped = count.clamp(adaptive.min as i64, adaptive.max as i64);
    let trial_count = (((clamped + 50) / 100) * 100) as usize;

    let mut reasons = Vec::new();
    if games_remaining <= 10 {
        reasons.push("late season");
    }
    if (7..=10).contains(&rank) {
        reasons.push("on bubble");
    }
    if gap <= 5 {
        reasons.push("tight race");
    }

    TrialRecommendation {
        trial_count,
        tier: PrecisionTier::classify(trial_count, &reasons),
        reasons: reasons.into_iter().map(String::from).collect(),
    }
}

/// Points between the team and the qualification cutoff: ahead of the first
/// team out when in, behind the last team in when out.
fn points_gap(team: &TeamRecord, sorted: &[TeamRecord], rank: usize, spots: usize) -> i64 {
    let points = i64::from(team.points);
    if rank <= spots {
        match sorted.get(spots) {
            Some(first_out) => points - i64::from(first_out.points),
            None => DEFAULT_POINTS_GAP,
        }
    } else {
        match spots.checked_sub(1).and_then(|i| sorted.get(i)) {
            Some(last_in) => i64::from(last_in.points) - points,
            None => DEFAULT_POINTS_GAP,
        }
    }
}

/// Top of the division with the last berth contested, or first team out of
/// the division berths within reach of the last one.
fn in_division_race(team: &TeamRecord, sorted: &[TeamRecord], spots: usize) -> bool {
    let division: Vec<&TeamRecord> = sorted
        .iter()
        .filter(|t| t.division == team.division)
        .collect();
    if division.len() < 2 || spots == 0 {
        return false;
    }
    let Some(pos) = division.iter().position(|t| t.team_code == team.team_code) else {
        return false;
    };
    let div_rank = pos + 1;
    let last_in = spots - 1;

    if div_rank <= spots && division.len() > spots {
        i64::from(division[last_in].points) - i64::from(division[spots].points)
            <= DIVISION_RACE_WINDOW
    } else if div_rank == spots + 1 {
        i64::from(division[last_in].points) - i64::from(team.points) <= DIVISION_RACE_WINDOW
    } else {
        false
    }
}
