// Clinch and elimination numbers relative to the playoff line.

use serde::{Deserialize, Serialize};

use crate::config::SeasonConfig;
use crate::standings::tiebreak::{rank_in, sorted_standings};
use crate::standings::TeamRecord;

/// Buffer reported when there is no team below the line to compare with.
const UNCATCHABLE_BUFFER: u32 = 999;
/// Top teams above this many points are treated as clinched.
const CLINCHED_POINTS: u32 = 100;
const CLINCHED_RANK: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TiebreakerAdvantage {
    Favorable,
    Unfavorable,
    Neutral,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MagicNumbers {
    /// Points needed to clinch (in) or to reach the line (out); 0 once
    /// clinched.
    pub magic_number: u32,
    pub magic_number_wins: u32,
    pub can_clinch_playoffs: bool,
    pub clinch_scenario: String,
    /// Points lead over the comparison team before elimination risk.
    pub elimination_number: u32,
    pub can_be_eliminated: bool,
    pub elimination_scenario: String,
    pub max_possible_points: u32,
    pub min_possible_points: u32,
    pub points_behind_last_in: u32,
    pub points_ahead_first_out: u32,
    pub teams_to_jump: usize,
    pub teams_holding_off: usize,
    pub tiebreaker_advantage: TiebreakerAdvantage,
    /// ROW difference against the last team in (or first team out).
    pub row_vs_nearby: i64,
}

pub fn calculate_magic_numbers(
    team: &TeamRecord,
    conference: &[TeamRecord],
    season: &SeasonConfig,
) -> MagicNumbers {
    let season_length = season.games_per_season;
    let spots = season.playoff_spots;
    let remaining = team.games_remaining(season_length);
    let sorted = sorted_standings(conference);
    let rank = rank_in(&sorted, &team.team_code).unwrap_or(sorted.len() + 1);
    let last_in = spots.checked_sub(1).and_then(|i| sorted.get(i));
    let first_out = sorted.get(spots);

    let mut mn = MagicNumbers {
        magic_number: 0,
        magic_number_wins: 0,
        can_clinch_playoffs: true,
        clinch_scenario: String::new(),
        elimination_number: 0,
        can_be_eliminated: true,
        elimination_scenario: String::new(),
        max_possible_points: team.points + 2 * remaining,
        min_possible_points: team.points,
        points_behind_last_in: last_in.map_or(0, |t| t.points.saturating_sub(team.points)),
        points_ahead_first_out: first_out.map_or(0, |t| team.points.saturating_sub(t.points)),
        teams_to_jump: (1..rank).filter(|r| *r <= spots).count(),
        teams_holding_off: sorted.len().saturating_sub(rank.max(spots)),
        tiebreaker_advantage: tiebreaker_position(team, last_in, first_out),
        row_vs_nearby: last_in
            .or(first_out)
            .map_or(0, |t| i64::from(team.row()) - i64::from(t.row())),
    };

    let in_position = rank <= spots;

    if in_position {
        mn.magic_number = clinch_number(team, first_out, rank, season_length);
        if mn.magic_number == 0 {
            mn.clinch_scenario = "CLINCHED: playoff spot secured".to_string();
            mn.can_be_eliminated = false;
        } else {
            mn.magic_number_wins = mn.magic_number.div_ceil(2);
            mn.clinch_scenario = format!(
                "Need {} points ({} wins) to clinch",
                mn.magic_number, mn.magic_number_wins
            );
        }
    } else if let Some(line) = last_in {
        let needed = (line.points + 2 * line.games_remaining(season_length) + 1)
            .saturating_sub(team.points);
        mn.magic_number = needed;
        mn.magic_number_wins = needed.div_ceil(2);
        if needed > 2 * remaining {
            mn.can_clinch_playoffs = false;
            mn.clinch_scenario = "ELIMINATED: cannot reach a playoff position".to_string();
        } else {
            mn.clinch_scenario = format!(
                "Need {} points ({} wins) to reach a playoff position",
                needed, mn.magic_number_wins
            );
        }
    }

    if !in_position {
        if !mn.can_clinch_playoffs {
            mn.elimination_number = 0;
            mn.can_be_eliminated = false;
            mn.elimination_scenario = "ELIMINATED: mathematically out of the playoffs".to_string();
        } else {
            mn.elimination_number = elimination_buffer(team, last_in);
            mn.elimination_scenario = format!(
                "Can lose {} more games before elimination risk",
                mn.elimination_number / 2
            );
        }
    } else if first_out.is_some() {
        let buffer = elimination_buffer(team, first_out);
        mn.elimination_number = buffer;
        if buffer > 2 * remaining {
            mn.can_be_eliminated = false;
            mn.elimination_scenario = "SAFE: cannot be eliminated".to_string();
        } else {
            mn.elimination_scenario = format!("Buffer of {buffer} points before elimination risk");
        }
    }

    mn
}

/// Points needed to finish above the first team out's best case, capped at
/// the points still available.
fn clinch_number(
    team: &TeamRecord,
    first_out: Option<&TeamRecord>,
    rank: usize,
    season_length: u32,
) -> u32 {
    if rank <= CLINCHED_RANK && team.points > CLINCHED_POINTS {
        return 0;
    }
    let Some(chaser) = first_out else {
        return 0;
    };
    let chaser_max = chaser.points + 2 * chaser.games_remaining(season_length);
    let needed = (chaser_max + 1).saturating_sub(team.points);
    needed.min(2 * team.games_remaining(season_length))
}

fn elimination_buffer(team: &TeamRecord, other: Option<&TeamRecord>) -> u32 {
    match other {
        Some(other) => team.points.saturating_sub(other.points),
        None => UNCATCHABLE_BUFFER,
    }
}

fn tiebreaker_position(
    team: &TeamRecord,
    last_in: Option<&TeamRecord>,
    first_out: Option<&TeamRecord>,
) -> TiebreakerAdvantage {
    let row = team.row();
    let mut favorable = 0;
    let mut unfavorable = 0;
    for other in [last_in, first_out].into_iter().flatten() {
        match row.cmp(&other.row()) {
            std::cmp::Ordering::Greater => favorable += 1,
            std::cmp::Ordering::Less => unfavorable += 1,
            std::cmp::Ordering::Equal => {}
        }
    }
    match favorable.cmp(&unfavorable) {
        std::cmp::Ordering::Greater => TiebreakerAdvantage::Favorable,
        std::cmp::Ordering::Less => TiebreakerAdvantage::Unfavorable,
        std::cmp::Ordering::Equal => TiebreakerAdvantage::Neutral,
    }
}
