// Model for high-importance games, Elo for the rest.

use std::sync::atomic::{AtomicU64, Ordering};

use tracing::debug;

use super::{EloPredictor, GamePredictor, LogisticPredictor, PredictionContext, PredictionError};

/// Routes each game by its importance score. Usage counters are shared by
/// every worker in a batch.
#[derive(Debug)]
pub struct HybridPredictor {
    model: LogisticPredictor,
    elo: EloPredictor,
    threshold: f64,
    model_usage: AtomicU64,
    elo_usage: AtomicU64,
}

/// How many games each side of the hybrid has handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HybridUsage {
    pub model: u64,
    pub elo: u64,
}

impl HybridPredictor {
    pub fn new(model: LogisticPredictor, elo: EloPredictor, threshold: f64) -> Self {
        Self {
            model,
            elo,
            threshold,
            model_usage: AtomicU64::new(0),
            elo_usage: AtomicU64::new(0),
        }
    }

    pub fn usage(&self) -> HybridUsage {
        HybridUsage {
            model: self.model_usage.load(Ordering::Relaxed),
            elo: self.elo_usage.load(Ordering::Relaxed),
        }
    }

    pub fn elo(&self) -> &EloPredictor {
        &self.elo
    }
}

/// Importance of a game in `[0, 1]`.
pub fn game_importance(ctx: &PredictionContext<'_>) -> f64 {
    let mut importance: f64 = 0.5;
    if ctx.is_division_game {
        importance += 0.15;
    }
    if ctx.is_rivalry_game {
        importance += 0.10;
    }
    if ctx.is_playoff_stakes {
        importance = 1.0;
    }

    let gap = ctx.points_difference();
    if gap <= 5 {
        importance += 0.15;
    } else if gap <= 10 {
        importance += 0.05;
    }

    let on_bubble = |points: u32| (80..=100).contains(&points);
    if on_bubble(ctx.home.points) || on_bubble(ctx.away.points) {
        importance += 0.10;
    }

    importance.min(1.0)
}

impl GamePredictor for HybridPredictor {
    fn predict_win_probability(
        &self,
        home: &str,
        away: &str,
        ctx: &PredictionContext<'_>,
    ) -> Result<f64, PredictionError> {
        if game_importance(ctx) >= self.threshold {
            match self.model.predict_win_probability(home, away, ctx) {
                Ok(p) => {
                    self.model_usage.fetch_add(1, Ordering::Relaxed);
                    return Ok(p);
                }
                Err(e) => debug!("model failed for {home} vs {away}, using elo: {e}"),
            }
        }
        self.elo_usage.fetch_add(1, Ordering::Relaxed);
        self.elo.predict_win_probability(home, away, ctx)
    }

    fn name(&self) -> &'static str {
        "hybrid"
    }
}
