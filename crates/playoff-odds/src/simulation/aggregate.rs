// Reduce a batch of trial results into odds, a points histogram, and
// percentiles.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::season::{PlayoffSpot, TrialResult};
use crate::analysis::magic_numbers::MagicNumbers;
use crate::analysis::schedule_strength::TeamScheduleStrength;

/// Fractions reported in the percentile table.
pub const PERCENTILE_FRACTIONS: [f64; 5] = [0.10, 0.25, 0.50, 0.75, 0.90];

/// Raw results of a batch plus the histogram accumulated while collecting
/// them.
#[derive(Debug, Clone, Default)]
pub struct TrialBatch {
    results: Vec<TrialResult>,
    points_histogram: BTreeMap<u32, usize>,
}

impl TrialBatch {
    pub fn from_results(results: Vec<TrialResult>) -> Self {
        let mut points_histogram = BTreeMap::new();
        for r in &results {
            *points_histogram.entry(r.final_points).or_insert(0) += 1;
        }
        Self {
            results,
            points_histogram,
        }
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn results(&self) -> &[TrialResult] {
        &self.results
    }

    pub fn points_histogram(&self) -> &BTreeMap<u32, usize> {
        &self.points_histogram
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PointPercentiles {
    pub p10: u32,
    pub p25: u32,
    pub p50: u32,
    pub p75: u32,
    pub p90: u32,
}

impl PointPercentiles {
    pub fn as_array(&self) -> [u32; 5] {
        [self.p10, self.p25, self.p50, self.p75, self.p90]
    }
}

/// Aggregated playoff odds for one team.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeasonSimulation {
    pub team_code: String,
    pub total_simulations: usize,
    pub playoff_count: usize,
    pub division_count: usize,
    pub wildcard_count: usize,
    /// Percentages in `[0, 100]`.
    pub playoff_odds: f64,
    pub division_odds: f64,
    pub wildcard_odds: f64,
    pub average_points: f64,
    pub best_points: u32,
    pub worst_points: u32,
    pub average_rank: f64,
    pub points_distribution: BTreeMap<u32, usize>,
    pub percentiles: PointPercentiles,
    pub simulated_at: DateTime<Utc>,
    pub schedule_strength: Option<TeamScheduleStrength>,
    pub magic_numbers: Option<MagicNumbers>,
}

impl SeasonSimulation {
    /// The result of aggregating zero trials.
    pub fn empty(team_code: &str) -> Self {
        Self {
            team_code: team_code.to_string(),
            total_simulations: 0,
            playoff_count: 0,
            division_count: 0,
            wildcard_count: 0,
            playoff_odds: 0.0,
            division_odds: 0.0,
            wildcard_odds: 0.0,
            average_points: 0.0,
            best_points: 0,
            worst_points: 0,
            average_rank: 0.0,
            points_distribution: BTreeMap::new(),
            percentiles: PointPercentiles::default(),
            simulated_at: Utc::now(),
            schedule_strength: None,
            magic_numbers: None,
        }
    }
}

/// Nearest-rank percentile over sorted values: `sorted[floor(fraction * n)]`,
/// with the index capped at the last element. Zero for an empty slice.
pub fn percentile(sorted: &[u32], fraction: f64) -> u32 {
    if sorted.is_empty() {
        return 0;
    }
    let idx = (fraction * sorted.len() as f64).floor() as usize;
    sorted[idx.min(sorted.len() - 1)]
}

pub fn aggregate(team_code: &str, batch: &TrialBatch) -> SeasonSimulation {
    let n = batch.len();
    if n == 0 {
        return SeasonSimulation::empty(team_code);
    }

    let mut playoff_count = 0;
    let mut division_count = 0;
    let mut wildcard_count = 0;
    let mut total_points: u64 = 0;
    let mut total_rank: u64 = 0;
    let mut points: Vec<u32> = Vec::with_capacity(n);

    for r in batch.results() {
        if r.made_playoffs {
            playoff_count += 1;
        }
        match r.spot {
            PlayoffSpot::Division => division_count += 1,
            PlayoffSpot::Wildcard => wildcard_count += 1,
            PlayoffSpot::None => {}
        }
        total_points += u64::from(r.final_points);
        total_rank += r.conference_rank as u64;
        points.push(r.final_points);
    }
    points.sort_unstable();

    let pct = |count: usize| count as f64 / n as f64 * 100.0;
    let [p10, p25, p50, p75, p90] = PERCENTILE_FRACTIONS.map(|f| percentile(&points, f));

    SeasonSimulation {
        team_code: team_code.to_string(),
        total_simulations: n,
        playoff_count,
        division_count,
        wildcard_count,
        playoff_odds: pct(playoff_count),
        division_odds: pct(division_count),
        wildcard_odds: pct(wildcard_count),
        average_points: total_points as f64 / n as f64,
        best_points: points.last().copied().unwrap_or(0),
        worst_points: points.first().copied().unwrap_or(0),
        average_rank: total_rank as f64 / n as f64,
        points_distribution: batch.points_histogram().clone(),
        percentiles: PointPercentiles {
            p10,
            p25,
            p50,
            p75,
            p90,
        },
        simulated_at: Utc::now(),
        schedule_strength: None,
        magic_numbers: None,
    }
}
