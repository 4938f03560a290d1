// Playoff-odds service: cache lookups, snapshot assembly, blocking trial
// runs, annotations, and what-if scenarios.

use std::sync::{Arc, RwLock};
use std::time::Instant;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::analysis::{analyze_team_schedule, calculate_magic_numbers};
use crate::cache::TtlCache;
use crate::config::{Config, SimulationConfig};
use crate::predictor::{build_predictor, FixedRatePredictor, GamePredictor};
use crate::schedule::estimator::RoundRobinEstimator;
use crate::schedule::{RemainingGame, ScheduleSource};
use crate::simulation::adaptive::recommend;
use crate::simulation::parallel::execution_mode;
use crate::simulation::{
    aggregate, run_trials, ExecutionSettings, MetricsSnapshot, SeasonRules, SeasonSimulation,
    SeasonSimulator, SimulationMetrics, TrialBatch, TrialRecommendation,
};
use crate::standings::{StandingsError, StandingsSource, TeamRecord};
use crate::whatif::{
    apply_scenario, cache_key, common_scenarios, filter_scenario_games, likelihood,
    WhatIfResult, WhatIfScenario,
};

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum OddsError {
    #[error("team not found in standings: {0}")]
    TeamNotFound(String),

    #[error("standings unavailable: {0}")]
    StandingsUnavailable(#[from] StandingsError),

    #[error("trial execution failed: {0}")]
    TrialExecution(String),
}

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

/// Everything one request needs, fetched once.
#[derive(Debug, Clone)]
struct Snapshot {
    standings: Vec<TeamRecord>,
    team: TeamRecord,
    conference: Vec<TeamRecord>,
    games: Vec<RemainingGame>,
}

// ---------------------------------------------------------------------------
// Service
// ---------------------------------------------------------------------------

/// Computes and caches playoff odds for any team in the standings.
///
/// Cached odds are keyed by team code and live for `cache.ttl_secs`; what-if
/// results are keyed by scenario and team state and live for
/// `cache.what_if_ttl_secs`. Trial batches run on the blocking pool.
pub struct PlayoffOddsService {
    config: SimulationConfig,
    standings: Arc<dyn StandingsSource>,
    schedule: Arc<dyn ScheduleSource>,
    predictor: RwLock<Arc<dyn GamePredictor>>,
    odds_cache: TtlCache<SeasonSimulation>,
    what_if_cache: TtlCache<WhatIfResult>,
    metrics: SimulationMetrics,
    max_workers: Option<usize>,
}

impl PlayoffOddsService {
    pub fn new(
        config: SimulationConfig,
        standings: Arc<dyn StandingsSource>,
        schedule: Arc<dyn ScheduleSource>,
        predictor: Arc<dyn GamePredictor>,
    ) -> Self {
        let odds_cache = TtlCache::new(config.cache.ttl());
        let what_if_cache = TtlCache::new(config.cache.what_if_ttl());
        Self {
            config,
            standings,
            schedule,
            predictor: RwLock::new(predictor),
            odds_cache,
            what_if_cache,
            metrics: SimulationMetrics::new(),
            max_workers: None,
        }
    }

    /// Build the service with the predictor named in `config`.
    pub fn from_config(
        config: &Config,
        standings: Arc<dyn StandingsSource>,
        schedule: Arc<dyn ScheduleSource>,
    ) -> Self {
        let predictor = build_predictor(&config.simulation.prediction, &config.elo_ratings);
        info!("odds service using the {} predictor", predictor.name());
        Self::new(config.simulation.clone(), standings, schedule, predictor)
    }

    /// Cap the worker pool used for large batches.
    pub fn with_max_workers(mut self, workers: usize) -> Self {
        self.max_workers = Some(workers.max(1));
        self
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    // -- Playoff odds ------------------------------------------------------

    /// Playoff odds for `team_code`, from the cache when fresh. `trials`
    /// defaults to `trials.default`.
    pub async fn simulate_playoff_odds(
        &self,
        team_code: &str,
        trials: Option<usize>,
    ) -> Result<SeasonSimulation, OddsError> {
        if let Some(cached) = self.cached_odds(team_code) {
            return Ok(cached);
        }
        let snapshot = self.snapshot(team_code).await?;
        let n = trials.unwrap_or(self.config.trials.default);
        self.compute_and_cache(&snapshot, n).await
    }

    /// Like `simulate_playoff_odds`, with the trial count chosen by how
    /// contested the team's position is.
    pub async fn simulate_playoff_odds_adaptive(
        &self,
        team_code: &str,
    ) -> Result<SeasonSimulation, OddsError> {
        if let Some(cached) = self.cached_odds(team_code) {
            return Ok(cached);
        }
        let snapshot = self.snapshot(team_code).await?;
        let recommendation = self.recommend_for(&snapshot);
        info!(
            "adaptive run for {}: {} trials ({}; {})",
            team_code,
            recommendation.trial_count,
            recommendation.tier,
            recommendation.reasons.join(", ")
        );
        self.compute_and_cache(&snapshot, recommendation.trial_count)
            .await
    }

    /// The trial count the adaptive path would use right now.
    pub async fn trial_recommendation(
        &self,
        team_code: &str,
    ) -> Result<TrialRecommendation, OddsError> {
        let snapshot = self.snapshot(team_code).await?;
        Ok(self.recommend_for(&snapshot))
    }

    /// Drop the cached odds for one team and recompute them with
    /// `trials.recalculate` trials.
    pub async fn recalculate_playoff_odds(
        &self,
        team_code: &str,
    ) -> Result<SeasonSimulation, OddsError> {
        self.invalidate_cache(team_code);
        let snapshot = self.snapshot(team_code).await?;
        self.compute_and_cache(&snapshot, self.config.trials.recalculate)
            .await
    }

    // -- What-if ------------------------------------------------------------

    /// Odds under `scenario`, compared against the unmodified baseline.
    pub async fn simulate_what_if(
        &self,
        team_code: &str,
        scenario: &WhatIfScenario,
        trials: Option<usize>,
    ) -> Result<WhatIfResult, OddsError> {
        let snapshot = self.snapshot(team_code).await?;
        let key = cache_key(
            team_code,
            scenario,
            snapshot.team.points,
            snapshot.team.games_played,
        );
        if let Some(cached) = self.what_if_cache.get(&key) {
            self.metrics.record_what_if_hit();
            return Ok(cached);
        }
        self.metrics.record_what_if_miss();

        let n = trials.unwrap_or(self.config.trials.default);
        let baseline = match self.cached_odds(team_code) {
            Some(cached) => cached,
            None => self.compute_and_cache(&snapshot, n).await?,
        };

        let season = &self.config.season;
        let applied = apply_scenario(&snapshot.team, scenario, season.games_per_season);
        let conference: Vec<TeamRecord> = snapshot
            .conference
            .iter()
            .map(|t| {
                if t.team_code == team_code {
                    applied.record.clone()
                } else {
                    t.clone()
                }
            })
            .collect();
        let games = filter_scenario_games(&snapshot.games, team_code, applied.forced_games);

        let mut predictor = self.predictor();
        if scenario.win_rate > 0.0 {
            predictor = Arc::new(FixedRatePredictor::new(
                team_code,
                scenario.win_rate,
                predictor,
            ));
        }

        let outcome = self
            .run_batch(team_code, &conference, &games, predictor, n)
            .await?;

        let baseline_magic = calculate_magic_numbers(&snapshot.team, &snapshot.conference, season);
        let scenario_magic = calculate_magic_numbers(&applied.record, &conference, season);

        let result = WhatIfResult {
            scenario: scenario.clone(),
            trials: outcome.total_simulations,
            projected_points: applied.record.points,
            projected_record: applied.record.record_line(),
            playoff_odds: outcome.playoff_odds,
            playoff_odds_change: outcome.playoff_odds - baseline.playoff_odds,
            avg_final_points: outcome.average_points,
            median_final_points: outcome.percentiles.p50,
            rank_improvement: baseline.average_rank - outcome.average_rank,
            magic_number_change: i64::from(baseline_magic.magic_number)
                - i64::from(scenario_magic.magic_number),
            likelihood: likelihood(scenario, snapshot.team.point_pct),
        };

        info!(
            "what-if '{}' for {}: {:.1}% ({:+.1})",
            scenario.name, team_code, result.playoff_odds, result.playoff_odds_change
        );
        self.what_if_cache.insert(key, result.clone());
        Ok(result)
    }

    /// Stock scenarios that still fit in the team's remaining games.
    pub async fn common_scenarios(&self, team_code: &str) -> Result<Vec<WhatIfScenario>, OddsError> {
        let standings = self.standings.standings().await?;
        let team = standings
            .iter()
            .find(|t| t.team_code == team_code)
            .ok_or_else(|| OddsError::TeamNotFound(team_code.to_string()))?;
        Ok(common_scenarios(team, self.config.season.games_per_season))
    }

    // -- Cache and predictor management --------------------------------------

    /// Returns whether an entry was removed.
    pub fn invalidate_cache(&self, team_code: &str) -> bool {
        let removed = self.odds_cache.invalidate(team_code);
        if removed {
            info!("invalidated cached odds for {team_code}");
        }
        removed
    }

    pub fn invalidate_all_cache(&self) {
        self.odds_cache.invalidate_all();
        self.what_if_cache.invalidate_all();
        info!("invalidated all cached odds");
    }

    /// Drop expired entries from both caches; returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        self.odds_cache.purge_expired() + self.what_if_cache.purge_expired()
    }

    /// Swap the win-probability strategy. Cached results were produced by
    /// the old one, so both caches are cleared.
    pub fn set_predictor(&self, predictor: Arc<dyn GamePredictor>) {
        let name = predictor.name();
        {
            let mut current = self.predictor.write().unwrap_or_else(|e| e.into_inner());
            *current = predictor;
        }
        self.invalidate_all_cache();
        info!("predictor switched to {name}");
    }

    pub fn predictor_name(&self) -> &'static str {
        self.predictor().name()
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    pub fn log_metrics(&self) {
        self.metrics.log_summary();
    }

    // -- Internals -----------------------------------------------------------

    fn predictor(&self) -> Arc<dyn GamePredictor> {
        self.predictor
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn cached_odds(&self, team_code: &str) -> Option<SeasonSimulation> {
        match self.odds_cache.get(team_code) {
            Some(hit) => {
                self.metrics.record_cache_hit();
                Some(hit)
            }
            None => {
                self.metrics.record_cache_miss();
                None
            }
        }
    }

    fn recommend_for(&self, snapshot: &Snapshot) -> TrialRecommendation {
        recommend(
            &snapshot.team,
            &snapshot.conference,
            &self.config.adaptive,
            &self.config.season,
        )
    }

    async fn snapshot(&self, team_code: &str) -> Result<Snapshot, OddsError> {
        let standings = self.standings.standings().await?;
        let team = standings
            .iter()
            .find(|t| t.team_code == team_code)
            .cloned()
            .ok_or_else(|| OddsError::TeamNotFound(team_code.to_string()))?;
        let conference: Vec<TeamRecord> = standings
            .iter()
            .filter(|t| t.conference == team.conference)
            .cloned()
            .collect();

        let games = match self.schedule.remaining_games(&conference).await {
            Ok(games) => games,
            Err(e) => {
                warn!("schedule unavailable for the {} conference, estimating: {e}", team.conference);
                RoundRobinEstimator::new(self.config.season.games_per_season)
                    .estimate(&conference, Utc::now())
            }
        };
        debug!(
            "snapshot for {}: {} conference teams, {} remaining games",
            team_code,
            conference.len(),
            games.len()
        );

        Ok(Snapshot {
            standings,
            team,
            conference,
            games,
        })
    }

    /// Run `n` trials on the baseline snapshot, annotate, and cache.
    async fn compute_and_cache(
        &self,
        snapshot: &Snapshot,
        n: usize,
    ) -> Result<SeasonSimulation, OddsError> {
        let team_code = snapshot.team.team_code.as_str();
        let mut result = self
            .run_batch(
                team_code,
                &snapshot.conference,
                &snapshot.games,
                self.predictor(),
                n,
            )
            .await?;

        result.schedule_strength = Some(analyze_team_schedule(
            team_code,
            &snapshot.standings,
            &snapshot.games,
            &self.config.season,
        ));
        result.magic_numbers = Some(calculate_magic_numbers(
            &snapshot.team,
            &snapshot.conference,
            &self.config.season,
        ));

        info!(
            "{}: {:.1}% playoff odds over {} trials (avg {:.1} pts)",
            team_code, result.playoff_odds, result.total_simulations, result.average_points
        );
        self.odds_cache.insert(team_code, result.clone());
        Ok(result)
    }

    async fn run_batch(
        &self,
        team_code: &str,
        conference: &[TeamRecord],
        games: &[RemainingGame],
        predictor: Arc<dyn GamePredictor>,
        n: usize,
    ) -> Result<SeasonSimulation, OddsError> {
        let rules = SeasonRules::from_config(&self.config);
        let simulator = SeasonSimulator::new(team_code, conference, games, predictor, rules)
            .ok_or_else(|| OddsError::TeamNotFound(team_code.to_string()))?;

        let mut settings = ExecutionSettings::from_config(&self.config.trials);
        if let Some(workers) = self.max_workers {
            settings = settings.with_max_workers(workers);
        }
        let mode = execution_mode(n, &settings);
        info!(
            "simulating {} trials for {} ({} games, {:?})",
            n,
            team_code,
            simulator.games_to_replay(),
            mode
        );

        let started = Instant::now();
        let results = tokio::task::spawn_blocking(move || {
            run_trials(n, &settings, |rng| simulator.simulate_season(rng))
        })
        .await
        .map_err(|e| OddsError::TrialExecution(e.to_string()))?;
        self.metrics.record_run(n, mode, started.elapsed());

        let batch = TrialBatch::from_results(results);
        Ok(aggregate(team_code, &batch))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::predictor::{PredictionContext, PredictionError, SimplePredictor};
    use crate::schedule::{ScheduleError, StaticSchedule};
    use crate::standings::record::test_support::record;
    use crate::standings::StaticStandings;
    use async_trait::async_trait;
    use chrono::{Duration, TimeZone};

    /// 16 teams, 60 games played, strongest first.
    fn conference() -> Vec<TeamRecord> {
        (0..16)
            .map(|i| {
                let division = if i % 2 == 0 { "Atlantic" } else { "Metro" };
                record(&format!("T{i:02}"), division, 40 - i, 15 + i, 5)
            })
            .collect()
    }

    fn schedule() -> Vec<RemainingGame> {
        let start = Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap();
        RoundRobinEstimator::new(82).estimate(&conference(), start)
    }

    fn test_config() -> SimulationConfig {
        let mut config = SimulationConfig::default();
        config.trials.default = 200;
        config.trials.recalculate = 300;
        config.trials.seed = Some(17);
        config.adaptive.min = 100;
        config.adaptive.default = 200;
        config.adaptive.max = 400;
        config
    }

    fn service_with(schedule: Arc<dyn ScheduleSource>) -> PlayoffOddsService {
        let config = test_config();
        let predictor = Arc::new(SimplePredictor::new(0.06, 0.30, 0.80));
        PlayoffOddsService::new(
            config,
            Arc::new(StaticStandings::new(conference())),
            schedule,
            predictor,
        )
    }

    fn service() -> PlayoffOddsService {
        service_with(Arc::new(StaticSchedule::new(schedule())))
    }

    struct FailingSchedule;

    #[async_trait]
    impl ScheduleSource for FailingSchedule {
        async fn remaining_games(
            &self,
            _conference: &[TeamRecord],
        ) -> Result<Vec<RemainingGame>, ScheduleError> {
            Err(ScheduleError::AllFetchesFailed { failed: 16 })
        }
    }

    struct BrokenStandings;

    #[async_trait]
    impl StandingsSource for BrokenStandings {
        async fn standings(&self) -> Result<Vec<TeamRecord>, StandingsError> {
            Err(StandingsError::Unavailable("feed down".into()))
        }
    }

    #[derive(Debug)]
    struct Panics;

    impl GamePredictor for Panics {
        fn predict_win_probability(
            &self,
            _home: &str,
            _away: &str,
            _ctx: &PredictionContext<'_>,
        ) -> Result<f64, PredictionError> {
            panic!("predictor blew up")
        }

        fn name(&self) -> &'static str {
            "panics"
        }
    }

    #[tokio::test]
    async fn unknown_team_is_reported() {
        let svc = service();
        match svc.simulate_playoff_odds("XXX", None).await {
            Err(OddsError::TeamNotFound(code)) => assert_eq!(code, "XXX"),
            other => panic!("expected TeamNotFound, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn standings_failure_is_surfaced() {
        let svc = PlayoffOddsService::new(
            test_config(),
            Arc::new(BrokenStandings),
            Arc::new(StaticSchedule::default()),
            Arc::new(SimplePredictor::new(0.06, 0.30, 0.80)),
        );
        let err = svc.simulate_playoff_odds("T00", None).await.unwrap_err();
        assert!(matches!(err, OddsError::StandingsUnavailable(_)));
    }

    #[tokio::test]
    async fn odds_are_annotated_and_cached() {
        let svc = service();
        let first = svc.simulate_playoff_odds("T07", None).await.unwrap();
        assert_eq!(first.total_simulations, 200);
        assert!(first.schedule_strength.is_some());
        assert!(first.magic_numbers.is_some());

        let second = svc.simulate_playoff_odds("T07", Some(1000)).await.unwrap();
        assert_eq!(first, second);

        let m = svc.metrics();
        assert_eq!(m.total_runs, 1);
        assert_eq!(m.cache_hits, 1);
        assert_eq!(m.cache_misses, 1);
    }

    #[tokio::test]
    async fn invalidation_forces_a_fresh_run() {
        let svc = service();
        svc.simulate_playoff_odds("T03", None).await.unwrap();
        assert!(svc.invalidate_cache("T03"));
        assert!(!svc.invalidate_cache("T03"));
        svc.simulate_playoff_odds("T03", None).await.unwrap();
        assert_eq!(svc.metrics().total_runs, 2);

        svc.invalidate_all_cache();
        svc.simulate_playoff_odds("T03", None).await.unwrap();
        assert_eq!(svc.metrics().total_runs, 3);
    }

    #[tokio::test]
    async fn recalculate_uses_recalculate_trial_count() {
        let svc = service();
        svc.simulate_playoff_odds("T05", None).await.unwrap();
        let fresh = svc.recalculate_playoff_odds("T05").await.unwrap();
        assert_eq!(fresh.total_simulations, 300);
        let cached = svc.simulate_playoff_odds("T05", None).await.unwrap();
        assert_eq!(cached.total_simulations, 300);
    }

    #[tokio::test]
    async fn fixed_seed_gives_identical_runs() {
        let a = service().simulate_playoff_odds("T08", None).await.unwrap();
        let b = service().simulate_playoff_odds("T08", None).await.unwrap();
        assert_eq!(a.playoff_count, b.playoff_count);
        assert_eq!(a.points_distribution, b.points_distribution);
    }

    #[tokio::test]
    async fn schedule_failure_falls_back_to_estimate() {
        let svc = service_with(Arc::new(FailingSchedule));
        let odds = svc.simulate_playoff_odds("T07", None).await.unwrap();
        assert_eq!(odds.total_simulations, 200);
        let strength = odds.schedule_strength.unwrap();
        // Every team is at 60 games, so the estimate fills out all 22.
        assert_eq!(strength.remaining_games, 22);
        // T07 starts at 71 points.
        assert!(odds.best_points > 71);
        assert!(odds.best_points <= 71 + 2 * 22);
    }

    #[tokio::test]
    async fn adaptive_count_matches_recommendation() {
        let svc = service();
        let rec = svc.trial_recommendation("T07").await.unwrap();
        assert!((100..=400).contains(&rec.trial_count));
        assert_eq!(rec.trial_count % 100, 0);
        let odds = svc.simulate_playoff_odds_adaptive("T07").await.unwrap();
        assert_eq!(odds.total_simulations, rec.trial_count);
    }

    #[tokio::test]
    async fn set_predictor_clears_cache() {
        let svc = service();
        svc.simulate_playoff_odds("T02", None).await.unwrap();
        assert_eq!(svc.predictor_name(), "simple");

        svc.set_predictor(Arc::new(crate::predictor::EloPredictor::new(0.25, 0.85)));
        assert_eq!(svc.predictor_name(), "elo");
        svc.simulate_playoff_odds("T02", None).await.unwrap();
        assert_eq!(svc.metrics().total_runs, 2);
    }

    #[tokio::test]
    async fn panicking_trial_becomes_trial_execution_error() {
        let svc = PlayoffOddsService::new(
            test_config(),
            Arc::new(StaticStandings::new(conference())),
            Arc::new(StaticSchedule::new(schedule())),
            Arc::new(Panics),
        );
        let err = svc.simulate_playoff_odds("T00", Some(10)).await.unwrap_err();
        assert!(matches!(err, OddsError::TrialExecution(_)));
    }

    #[tokio::test]
    async fn what_if_applies_forced_wins_and_caches() {
        let svc = service();
        let scenario = WhatIfScenario::win_next(5);
        let result = svc.simulate_what_if("T07", &scenario, None).await.unwrap();
        // T07: 33-22-5, 71 points.
        assert_eq!(result.projected_points, 81);
        assert_eq!(result.projected_record, "38-22-5");
        assert_eq!(result.trials, 200);
        assert!(result.median_final_points >= 81);

        let again = svc.simulate_what_if("T07", &scenario, None).await.unwrap();
        assert_eq!(result, again);
        let m = svc.metrics();
        assert_eq!(m.what_if_hits, 1);
        assert_eq!(m.what_if_misses, 1);
    }

    #[tokio::test]
    async fn winning_out_beats_losing_out() {
        let svc = service();
        let hot = WhatIfScenario::with_win_rate("Hot", "", 0.85);
        let cold = WhatIfScenario::with_win_rate("Cold", "", 0.25);
        let up = svc.simulate_what_if("T08", &hot, None).await.unwrap();
        let down = svc.simulate_what_if("T08", &cold, None).await.unwrap();
        assert!(up.avg_final_points > down.avg_final_points);
        assert!(up.playoff_odds >= down.playoff_odds);
    }

    #[tokio::test]
    async fn common_scenarios_for_known_team() {
        let svc = service();
        let scenarios = svc.common_scenarios("T00").await.unwrap();
        assert_eq!(scenarios.len(), 8);
        assert!(matches!(
            svc.common_scenarios("XXX").await,
            Err(OddsError::TeamNotFound(_))
        ));
    }

    #[test]
    fn schedule_fixture_is_chronological() {
        let games = schedule();
        assert!(!games.is_empty());
        assert!(games.windows(2).all(|w| w[0].date <= w[1].date));
        let last = games[games.len() - 1].date;
        assert!(last > Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap() + Duration::days(1));
    }
}
