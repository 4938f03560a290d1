// Logistic game model over record features.

use super::{clamp_probability, GamePredictor, PredictionContext, PredictionError};
use crate::config::ModelWeights;
use crate::standings::TeamRecord;

/// Rest differences beyond this many days add nothing.
const MAX_REST_EDGE: i64 = 3;

/// Log-odds model: intercept (home ice) plus weighted differences in point
/// percentage, goal differential per game, and rest.
#[derive(Debug, Clone)]
pub struct LogisticPredictor {
    weights: ModelWeights,
    min: f64,
    max: f64,
}

impl LogisticPredictor {
    pub fn new(weights: ModelWeights, min: f64, max: f64) -> Self {
        Self { weights, min, max }
    }

    fn goal_diff_per_game(team: &TeamRecord) -> Result<f64, PredictionError> {
        if team.games_played == 0 {
            return Err(PredictionError::InsufficientData {
                team: team.team_code.clone(),
                reason: "no games played".to_string(),
            });
        }
        Ok(team.goal_differential() as f64 / f64::from(team.games_played))
    }

    fn log_odds(&self, ctx: &PredictionContext<'_>) -> Result<f64, PredictionError> {
        let home_gd = Self::goal_diff_per_game(ctx.home)?;
        let away_gd = Self::goal_diff_per_game(ctx.away)?;
        let rest_edge = (ctx.home_rest_days - ctx.away_rest_days).clamp(-MAX_REST_EDGE, MAX_REST_EDGE);

        let w = &self.weights;
        Ok(w.intercept
            + w.point_pct * (ctx.home.point_pct - ctx.away.point_pct)
            + w.goal_diff_per_game * (home_gd - away_gd)
            + w.rest_days * rest_edge as f64)
    }
}

impl GamePredictor for LogisticPredictor {
    fn predict_win_probability(
        &self,
        home: &str,
        away: &str,
        ctx: &PredictionContext<'_>,
    ) -> Result<f64, PredictionError> {
        let z = self.log_odds(ctx)?;
        let p = 1.0 / (1.0 + (-z).exp());
        if !p.is_finite() {
            return Err(PredictionError::InvalidOutput {
                home: home.to_string(),
                away: away.to_string(),
                value: p,
            });
        }
        Ok(clamp_probability(p, self.min, self.max))
    }

    fn name(&self) -> &'static str {
        "logistic"
    }
}
