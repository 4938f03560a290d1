// Annotations attached to aggregated odds.

pub mod magic_numbers;
pub mod schedule_strength;

pub use magic_numbers::{calculate_magic_numbers, MagicNumbers, TiebreakerAdvantage};
pub use schedule_strength::{
    analyze_team_schedule, CrucialGame, DifficultySummary, DifficultyTier, ScheduleAnalyzer,
    TeamScheduleStrength,
};
