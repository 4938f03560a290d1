// Point-percentage share with home ice.

use super::{heuristic_probability, GamePredictor, PredictionContext, PredictionError};

#[derive(Debug, Clone)]
pub struct SimplePredictor {
    home_ice_bonus: f64,
    min: f64,
    max: f64,
}

impl SimplePredictor {
    pub fn new(home_ice_bonus: f64, min: f64, max: f64) -> Self {
        Self {
            home_ice_bonus,
            min,
            max,
        }
    }
}

impl GamePredictor for SimplePredictor {
    fn predict_win_probability(
        &self,
        _home: &str,
        _away: &str,
        ctx: &PredictionContext<'_>,
    ) -> Result<f64, PredictionError> {
        Ok(heuristic_probability(
            ctx.home,
            ctx.away,
            self.home_ice_bonus,
            self.min,
            self.max,
        ))
    }

    fn name(&self) -> &'static str {
        "simple"
    }
}
