// Fixed win rate for one team, delegating every other game.

use std::sync::Arc;

use super::{GamePredictor, PredictionContext, PredictionError};

/// Forces `team_code` to win each of its games with probability `win_rate`,
/// home or away. Games not involving the team go to `inner`.
#[derive(Debug, Clone)]
pub struct FixedRatePredictor {
    team_code: String,
    win_rate: f64,
    inner: Arc<dyn GamePredictor>,
}

impl FixedRatePredictor {
    pub fn new(team_code: impl Into<String>, win_rate: f64, inner: Arc<dyn GamePredictor>) -> Self {
        Self {
            team_code: team_code.into(),
            win_rate: win_rate.clamp(0.0, 1.0),
            inner,
        }
    }
}

impl GamePredictor for FixedRatePredictor {
    fn predict_win_probability(
        &self,
        home: &str,
        away: &str,
        ctx: &PredictionContext<'_>,
    ) -> Result<f64, PredictionError> {
        if home == self.team_code {
            Ok(self.win_rate)
        } else if away == self.team_code {
            Ok(1.0 - self.win_rate)
        } else {
            self.inner.predict_win_probability(home, away, ctx)
        }
    }

    fn name(&self) -> &'static str {
        "fixed-rate"
    }
}
