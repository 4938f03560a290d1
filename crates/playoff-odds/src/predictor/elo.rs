// Elo ratings with home-ice, rest, and division adjustments.

use std::collections::HashMap;
use std::sync::RwLock;

use super::{clamp_probability, GamePredictor, PredictionContext, PredictionError};
use crate::standings::TeamRecord;

const BASE_RATING: f64 = 1500.0;
/// Rating spread per unit of point percentage away from .500.
const PCT_RATING_SCALE: f64 = 400.0;
const HOME_ADVANTAGE: f64 = 35.0;
const REST_ADJUSTMENT: f64 = 0.03;
/// Division games regress toward a coin flip by this factor.
const DIVISION_SHRINK: f64 = 0.9;
pub const DEFAULT_K_FACTOR: f64 = 32.0;

/// Elo predictor. Teams without a seeded rating are rated from their point
/// percentage.
#[derive(Debug)]
pub struct EloPredictor {
    ratings: RwLock<HashMap<String, f64>>,
    min: f64,
    max: f64,
}

impl EloPredictor {
    pub fn new(min: f64, max: f64) -> Self {
        Self::with_ratings(HashMap::new(), min, max)
    }

    pub fn with_ratings(ratings: HashMap<String, f64>, min: f64, max: f64) -> Self {
        Self {
            ratings: RwLock::new(ratings),
            min,
            max,
        }
    }

    /// Stored rating, or one derived from the record's point percentage.
    pub fn rating_for(&self, team: &TeamRecord) -> f64 {
        self.stored_rating(&team.team_code)
            .unwrap_or_else(|| BASE_RATING + (team.point_pct - 0.5) * PCT_RATING_SCALE)
    }

    pub fn stored_rating(&self, team_code: &str) -> Option<f64> {
        match self.ratings.read() {
            Ok(ratings) => ratings.get(team_code).copied(),
            Err(poisoned) => poisoned.into_inner().get(team_code).copied(),
        }
    }

    /// Apply a completed result. Teams without a stored rating start at the
    /// base rating.
    pub fn update_elo(&self, winner: &str, loser: &str, k_factor: f64) {
        let mut ratings = match self.ratings.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let winner_rating = ratings.get(winner).copied().unwrap_or(BASE_RATING);
        let loser_rating = ratings.get(loser).copied().unwrap_or(BASE_RATING);
        let expected = expected_score(winner_rating - loser_rating);
        let delta = k_factor * (1.0 - expected);
        ratings.insert(winner.to_string(), winner_rating + delta);
        ratings.insert(loser.to_string(), loser_rating - delta);
    }
}

/// Logistic expectation for a rating difference.
fn expected_score(rating_diff: f64) -> f64 {
    1.0 / (1.0 + 10f64.powf(-rating_diff / 400.0))
}

impl GamePredictor for EloPredictor {
    fn predict_win_probability(
        &self,
        _home: &str,
        _away: &str,
        ctx: &PredictionContext<'_>,
    ) -> Result<f64, PredictionError> {
        let diff = self.rating_for(ctx.home) + HOME_ADVANTAGE - self.rating_for(ctx.away);
        let mut p = expected_score(diff);

        let rest_edge = ctx.home_rest_days - ctx.away_rest_days;
        if rest_edge > 1 {
            p += REST_ADJUSTMENT;
        } else if rest_edge < -1 {
            p -= REST_ADJUSTMENT;
        }

        if ctx.is_division_game {
            p = 0.5 + (p - 0.5) * DIVISION_SHRINK;
        }

        Ok(clamp_probability(p, self.min, self.max))
    }

    fn name(&self) -> &'static str {
        "elo"
    }
}
