// Team record: one row of the standings table.

use serde::{Deserialize, Serialize};

/// Fraction of wins assumed to come in regulation or overtime when the
/// standings feed does not report ROW.
const ESTIMATED_ROW_SHARE: f64 = 0.85;

/// How a game was decided. Determines point allocation and whether the win
/// counts toward ROW.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GameDecision {
    Regulation,
    Overtime,
    Shootout,
}

impl GameDecision {
    /// Points awarded to the losing side.
    pub fn loser_points(&self) -> u32 {
        match self {
            GameDecision::Regulation => 0,
            GameDecision::Overtime | GameDecision::Shootout => 1,
        }
    }

    /// Whether the win counts toward regulation-plus-overtime wins.
    pub fn counts_toward_row(&self) -> bool {
        !matches!(self, GameDecision::Shootout)
    }
}

/// A single team's season-to-date record.
///
/// Invariants for a well-formed record:
/// `points == 2 * wins + ot_losses` and
/// `games_played == wins + losses + ot_losses`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamRecord {
    /// Short team code (e.g. "TOR").
    pub team_code: String,
    /// Full display name; the final alphabetical tiebreaker.
    pub team_name: String,
    pub conference: String,
    pub division: String,
    pub games_played: u32,
    pub wins: u32,
    /// Regulation losses.
    pub losses: u32,
    /// Overtime and shootout losses (one point each).
    pub ot_losses: u32,
    pub regulation_wins: u32,
    /// Regulation plus overtime wins (ROW). Zero when the feed omits it.
    pub regulation_plus_ot_wins: u32,
    pub points: u32,
    pub goals_for: u32,
    pub goals_against: u32,
    /// Points earned divided by points available.
    pub point_pct: f64,
}

impl TeamRecord {
    /// ROW for tiebreaking. Feeds that leave ROW at zero get an estimate of
    /// 85% of total wins, so shootout-heavy records are not overrated.
    pub fn row(&self) -> u32 {
        if self.regulation_plus_ot_wins > 0 {
            return self.regulation_plus_ot_wins;
        }
        if self.wins == 0 {
            return 0;
        }
        (f64::from(self.wins) * ESTIMATED_ROW_SHARE) as u32
    }

    pub fn goal_differential(&self) -> i64 {
        i64::from(self.goals_for) - i64::from(self.goals_against)
    }

    /// Games left in a season of `season_length` games (never negative).
    pub fn games_remaining(&self, season_length: u32) -> u32 {
        season_length.saturating_sub(self.games_played)
    }

    /// Recompute `point_pct` from points and games played.
    pub fn refresh_point_pct(&mut self) {
        self.point_pct = if self.games_played > 0 {
            f64::from(self.points) / f64::from(self.games_played * 2)
        } else {
            0.0
        };
    }

    /// Credit a win decided as `decision`.
    pub fn record_win(&mut self, decision: GameDecision) {
        self.wins += 1;
        self.points += 2;
        if decision == GameDecision::Regulation {
            self.regulation_wins += 1;
        }
        if decision.counts_toward_row() {
            self.regulation_plus_ot_wins += 1;
        }
        self.games_played += 1;
        self.refresh_point_pct();
    }

    /// Charge a loss decided as `decision`.
    pub fn record_loss(&mut self, decision: GameDecision) {
        match decision {
            GameDecision::Regulation => self.losses += 1,
            GameDecision::Overtime | GameDecision::Shootout => self.ot_losses += 1,
        }
        self.points += decision.loser_points();
        self.games_played += 1;
        self.refresh_point_pct();
    }

    /// Whether the points and games-played identities hold.
    pub fn is_consistent(&self) -> bool {
        self.points == 2 * self.wins + self.ot_losses
            && self.games_played == self.wins + self.losses + self.ot_losses
    }

    /// "W-L-OTL" display string.
    pub fn record_line(&self) -> String {
        format!("{}-{}-{}", self.wins, self.losses, self.ot_losses)
    }
}
