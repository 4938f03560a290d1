// Trial execution and aggregation.

pub mod adaptive;
pub mod aggregate;
pub mod metrics;
pub mod parallel;
pub mod season;

pub use adaptive::{recommend_trial_count, PrecisionTier, TrialRecommendation};
pub use aggregate::{aggregate, PointPercentiles, SeasonSimulation, TrialBatch};
pub use metrics::{MetricsSnapshot, SimulationMetrics};
pub use parallel::{run_trials, ExecutionMode, ExecutionSettings};
pub use season::{PlayoffSpot, SeasonRules, SeasonSimulator, TrialResult};
