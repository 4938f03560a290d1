// Library root: Monte Carlo playoff odds for a points-based league.

pub mod analysis;
pub mod cache;
pub mod config;
pub mod predictor;
pub mod schedule;
pub mod service;
pub mod simulation;
pub mod standings;
pub mod telemetry;
pub mod whatif;

pub use service::{OddsError, PlayoffOddsService};
pub use simulation::SeasonSimulation;
pub use standings::TeamRecord;
pub use whatif::{WhatIfResult, WhatIfScenario};
