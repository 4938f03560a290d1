// Official standings order with the full tiebreaker chain.

use std::cmp::Ordering;

use super::record::TeamRecord;

/// Compare two records by the official ranking rules.
///
/// Returns `Ordering::Less` when `a` ranks above `b`. Criteria, in order:
/// 1. Points (more is better)
/// 2. Games played (fewer is better at equal points)
/// 3. ROW (more is better)
/// 4. Total wins (more is better)
/// 5. Goal differential (more is better)
/// 6. Goals for (more is better)
/// 7. Team name (alphabetical)
/// 8. Team code (alphabetical), so distinct records never compare equal.
pub fn compare_standings(a: &TeamRecord, b: &TeamRecord) -> Ordering {
    b.points
        .cmp(&a.points)
        .then_with(|| a.games_played.cmp(&b.games_played))
        .then_with(|| b.row().cmp(&a.row()))
        .then_with(|| b.wins.cmp(&a.wins))
        .then_with(|| b.goal_differential().cmp(&a.goal_differential()))
        .then_with(|| b.goals_for.cmp(&a.goals_for))
        .then_with(|| a.team_name.cmp(&b.team_name))
        .then_with(|| a.team_code.cmp(&b.team_code))
}

/// Sort records in place, best first.
pub fn sort_standings(teams: &mut [TeamRecord]) {
    teams.sort_by(compare_standings);
}

/// Return a sorted copy of `teams`.
pub fn sorted_standings(teams: &[TeamRecord]) -> Vec<TeamRecord> {
    let mut sorted = teams.to_vec();
    sort_standings(&mut sorted);
    sorted
}

/// 1-based position of `team_code` in an already sorted table.
pub fn rank_in(sorted: &[TeamRecord], team_code: &str) -> Option<usize> {
    sorted
        .iter()
        .position(|t| t.team_code == team_code)
        .map(|idx| idx + 1)
}

/// 1-based position of `team` among the teams of its own division in an
/// already sorted conference table.
pub fn division_rank_in(sorted: &[TeamRecord], team: &TeamRecord) -> usize {
    let mut rank = 0;
    for t in sorted.iter().filter(|t| t.division == team.division) {
        rank += 1;
        if t.team_code == team.team_code {
            return rank;
        }
    }
    rank
}

/// Conference rank of `team_code`, sorting a copy of `conference` first.
pub fn conference_rank(conference: &[TeamRecord], team_code: &str) -> Option<usize> {
    rank_in(&sorted_standings(conference), team_code)
}
