// Win-probability strategies consumed by the season simulator.

pub mod elo;
pub mod fixed_rate;
pub mod hybrid;
pub mod logistic;
pub mod simple;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::config::{PredictionConfig, PredictorStrategy};
use crate::standings::TeamRecord;

pub use elo::EloPredictor;
pub use fixed_rate::FixedRatePredictor;
pub use hybrid::HybridPredictor;
pub use logistic::LogisticPredictor;
pub use simple::SimplePredictor;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum PredictionError {
    #[error("not enough data to rate {team}: {reason}")]
    InsufficientData { team: String, reason: String },

    #[error("model produced an invalid probability for {home} vs {away}: {value}")]
    InvalidOutput {
        home: String,
        away: String,
        value: f64,
    },
}

// ---------------------------------------------------------------------------
// Context and trait
// ---------------------------------------------------------------------------

/// Everything a predictor may look at for one game. Records are the trial's
/// working copies, so they reflect results simulated earlier in the trial.
#[derive(Debug, Clone, Copy)]
pub struct PredictionContext<'a> {
    pub date: DateTime<Utc>,
    pub home: &'a TeamRecord,
    pub away: &'a TeamRecord,
    pub is_division_game: bool,
    /// Division game between teams within 10 points.
    pub is_rivalry_game: bool,
    /// Late-season game for the home side.
    pub is_playoff_stakes: bool,
    pub home_rest_days: i64,
    pub away_rest_days: i64,
}

impl PredictionContext<'_> {
    pub fn points_difference(&self) -> u32 {
        self.home.points.abs_diff(self.away.points)
    }
}

/// Supplies the probability that the home team wins a single game.
///
/// Implementations are shared by every worker of a parallel batch and must
/// not hold per-trial state.
pub trait GamePredictor: Send + Sync + fmt::Debug {
    fn predict_win_probability(
        &self,
        home: &str,
        away: &str,
        ctx: &PredictionContext<'_>,
    ) -> Result<f64, PredictionError>;

    /// Short identifier used in logs and metrics.
    fn name(&self) -> &'static str;
}

// ---------------------------------------------------------------------------
// Shared helpers
// ---------------------------------------------------------------------------

/// Home win probability when neither team has a point percentage yet.
const NO_DATA_PROBABILITY: f64 = 0.55;

/// Clamp `p` into `[min, max]`, mapping NaN to the band midpoint.
pub fn clamp_probability(p: f64, min: f64, max: f64) -> f64 {
    if p.is_nan() {
        return (min + max) / 2.0;
    }
    p.clamp(min, max)
}

/// Point-percentage share plus a home-ice bonus. Used by the simple
/// predictor and as the per-game fallback when a predictor fails.
pub fn heuristic_probability(
    home: &TeamRecord,
    away: &TeamRecord,
    home_ice_bonus: f64,
    min: f64,
    max: f64,
) -> f64 {
    let total = home.point_pct + away.point_pct;
    if total <= 0.0 {
        return clamp_probability(NO_DATA_PROBABILITY, min, max);
    }
    clamp_probability(home.point_pct / total + home_ice_bonus, min, max)
}

/// Build the predictor named by `config.strategy`.
pub fn build_predictor(
    config: &PredictionConfig,
    ratings: &HashMap<String, f64>,
) -> Arc<dyn GamePredictor> {
    match config.strategy {
        PredictorStrategy::Simple => Arc::new(SimplePredictor::new(
            config.home_ice_bonus,
            config.fallback_min,
            config.fallback_max,
        )),
        PredictorStrategy::Elo => Arc::new(EloPredictor::with_ratings(
            ratings.clone(),
            config.clamp_min,
            config.clamp_max,
        )),
        PredictorStrategy::Model => Arc::new(LogisticPredictor::new(
            config.model,
            config.clamp_min,
            config.clamp_max,
        )),
        PredictorStrategy::Hybrid => Arc::new(HybridPredictor::new(
            LogisticPredictor::new(config.model, config.clamp_min, config.clamp_max),
            EloPredictor::with_ratings(ratings.clone(), config.clamp_min, config.clamp_max),
            config.hybrid_threshold,
        )),
    }
}
