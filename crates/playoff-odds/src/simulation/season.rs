// One complete trial: replay the remaining games on private copies of the
// conference records, then rank the target team.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::SimulationConfig;
use crate::predictor::{
    clamp_probability, heuristic_probability, GamePredictor, PredictionContext,
};
use crate::schedule::RemainingGame;
use crate::standings::tiebreak::compare_standings;
use crate::standings::{GameDecision, TeamRecord};

/// Rest assumed before a team's first replayed game, or when dates run
/// backwards.
const DEFAULT_REST_DAYS: i64 = 3;
/// Division opponents within this many points play a rivalry game.
const RIVALRY_POINTS_WINDOW: u32 = 10;
/// Home team games left at which every game carries playoff stakes.
const PLAYOFF_STAKES_GAMES_LEFT: u32 = 10;

// ---------------------------------------------------------------------------
// Rules
// ---------------------------------------------------------------------------

/// League rules and probability bands a trial runs under.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SeasonRules {
    pub season_length: u32,
    pub playoff_spots: usize,
    pub division_spots: usize,
    pub clamp_min: f64,
    pub clamp_max: f64,
    pub fallback_min: f64,
    pub fallback_max: f64,
    pub home_ice_bonus: f64,
    pub regulation_share: f64,
    pub overtime_share: f64,
}

impl SeasonRules {
    pub fn from_config(config: &SimulationConfig) -> Self {
        Self {
            season_length: config.season.games_per_season,
            playoff_spots: config.season.playoff_spots,
            division_spots: config.season.division_spots,
            clamp_min: config.prediction.clamp_min,
            clamp_max: config.prediction.clamp_max,
            fallback_min: config.prediction.fallback_min,
            fallback_max: config.prediction.fallback_max,
            home_ice_bonus: config.prediction.home_ice_bonus,
            regulation_share: config.outcomes.regulation,
            overtime_share: config.outcomes.overtime,
        }
    }

    /// Map a uniform draw in `[0, 1)` to how a game was decided.
    pub fn decision_for(&self, draw: f64) -> GameDecision {
        if draw < self.regulation_share {
            GameDecision::Regulation
        } else if draw < self.regulation_share + self.overtime_share {
            GameDecision::Overtime
        } else {
            GameDecision::Shootout
        }
    }
}

impl Default for SeasonRules {
    fn default() -> Self {
        Self::from_config(&SimulationConfig::default())
    }
}

// ---------------------------------------------------------------------------
// Trial result
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlayoffSpot {
    Division,
    Wildcard,
    None,
}

/// The target team's outcome in one trial.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrialResult {
    pub made_playoffs: bool,
    pub final_points: u32,
    pub final_wins: u32,
    pub final_losses: u32,
    pub final_ot_losses: u32,
    /// 1-based conference rank after the replay.
    pub conference_rank: usize,
    pub division_rank: usize,
    pub spot: PlayoffSpot,
}

// ---------------------------------------------------------------------------
// Simulator
// ---------------------------------------------------------------------------

/// A game with both teams resolved to arena indices.
#[derive(Debug, Clone, Copy)]
struct IndexedGame {
    home: usize,
    away: usize,
    date: DateTime<Utc>,
}

/// Immutable inputs of a batch. Each call to `simulate_season` works on its
/// own copy of the records, so one simulator is shared by all workers.
#[derive(Debug, Clone)]
pub struct SeasonSimulator {
    target: usize,
    baseline: Arc<[TeamRecord]>,
    games: Arc<[IndexedGame]>,
    skipped_games: usize,
    predictor: Arc<dyn GamePredictor>,
    rules: SeasonRules,
}

impl SeasonSimulator {
    /// Returns `None` when `target_code` is not part of `conference`.
    ///
    /// Games must be in chronological order. Games whose teams are not both
    /// in `conference` are dropped.
    pub fn new(
        target_code: &str,
        conference: &[TeamRecord],
        games: &[RemainingGame],
        predictor: Arc<dyn GamePredictor>,
        rules: SeasonRules,
    ) -> Option<Self> {
        let index: HashMap<&str, usize> = conference
            .iter()
            .enumerate()
            .map(|(i, t)| (t.team_code.as_str(), i))
            .collect();
        let target = *index.get(target_code)?;

        let indexed: Vec<IndexedGame> = games
            .iter()
            .filter_map(|g| {
                let home = *index.get(g.home.as_str())?;
                let away = *index.get(g.away.as_str())?;
                (home != away).then_some(IndexedGame {
                    home,
                    away,
                    date: g.date,
                })
            })
            .collect();
        let skipped_games = games.len() - indexed.len();
        if skipped_games > 0 {
            debug!("{skipped_games} games skipped: teams outside the conference");
        }

        Some(Self {
            target,
            baseline: conference.into(),
            games: indexed.into(),
            skipped_games,
            predictor,
            rules,
        })
    }

    pub fn games_to_replay(&self) -> usize {
        self.games.len()
    }

    pub fn skipped_games(&self) -> usize {
        self.skipped_games
    }

    pub fn rules(&self) -> &SeasonRules {
        &self.rules
    }

    /// Run one trial.
    pub fn simulate_season<R: Rng>(&self, rng: &mut R) -> TrialResult {
        let arena = self.replay(rng);
        self.rank_target(&arena)
    }

    /// Replay every game on a fresh copy of the conference and return the
    /// final records.
    pub fn replay<R: Rng>(&self, rng: &mut R) -> Vec<TeamRecord> {
        let mut arena = self.baseline.to_vec();
        let mut last_played: Vec<Option<DateTime<Utc>>> = vec![None; arena.len()];
        for game in self.games.iter() {
            self.simulate_game(&mut arena, &mut last_played, game, rng);
        }
        arena
    }

    fn simulate_game<R: Rng>(
        &self,
        arena: &mut [TeamRecord],
        last_played: &mut [Option<DateTime<Utc>>],
        game: &IndexedGame,
        rng: &mut R,
    ) {
        let p = {
            let ctx = build_context(
                &arena[game.home],
                &arena[game.away],
                game.date,
                last_played[game.home],
                last_played[game.away],
                &self.rules,
            );
            self.home_win_probability(&ctx)
        };

        let home_wins = rng.gen::<f64>() < p;
        let decision = self.rules.decision_for(rng.gen::<f64>());

        let (winner, loser) = if home_wins {
            (game.home, game.away)
        } else {
            (game.away, game.home)
        };
        arena[winner].record_win(decision);
        arena[loser].record_loss(decision);

        last_played[game.home] = Some(game.date);
        last_played[game.away] = Some(game.date);
    }

    /// Predictor output, or the heuristic when it fails, always clamped into
    /// the safety band.
    fn home_win_probability(&self, ctx: &PredictionContext<'_>) -> f64 {
        let raw = self
            .predictor
            .predict_win_probability(&ctx.home.team_code, &ctx.away.team_code, ctx)
            .unwrap_or_else(|e| {
                debug!("{} failed, using heuristic: {e}", self.predictor.name());
                quick_predict(ctx.home, ctx.away, &self.rules)
            });
        clamp_probability(raw, self.rules.clamp_min, self.rules.clamp_max)
    }

    fn rank_target(&self, arena: &[TeamRecord]) -> TrialResult {
        let mut order: Vec<usize> = (0..arena.len()).collect();
        order.sort_by(|&a, &b| compare_standings(&arena[a], &arena[b]));

        let target = &arena[self.target];
        let conference_rank = order
            .iter()
            .position(|&i| i == self.target)
            .map_or(arena.len(), |p| p + 1);
        let division_rank = order
            .iter()
            .filter(|&&i| arena[i].division == target.division)
            .position(|&i| i == self.target)
            .map_or(arena.len(), |p| p + 1);

        let made_playoffs = conference_rank <= self.rules.playoff_spots;
        let spot = match (made_playoffs, division_rank <= self.rules.division_spots) {
            (false, _) => PlayoffSpot::None,
            (true, true) => PlayoffSpot::Division,
            (true, false) => PlayoffSpot::Wildcard,
        };

        TrialResult {
            made_playoffs,
            final_points: target.points,
            final_wins: target.wins,
            final_losses: target.losses,
            final_ot_losses: target.ot_losses,
            conference_rank,
            division_rank,
            spot,
        }
    }
}

/// Build the predictor context for a game from the trial's working records.
pub fn build_context<'a>(
    home: &'a TeamRecord,
    away: &'a TeamRecord,
    date: DateTime<Utc>,
    home_last_played: Option<DateTime<Utc>>,
    away_last_played: Option<DateTime<Utc>>,
    rules: &SeasonRules,
) -> PredictionContext<'a> {
    let is_division_game = home.division == away.division;
    PredictionContext {
        date,
        home,
        away,
        is_division_game,
        is_rivalry_game: is_division_game
            && home.points.abs_diff(away.points) <= RIVALRY_POINTS_WINDOW,
        is_playoff_stakes: home.games_remaining(rules.season_length) <= PLAYOFF_STAKES_GAMES_LEFT,
        home_rest_days: rest_days(home_last_played, date),
        away_rest_days: rest_days(away_last_played, date),
    }
}

fn rest_days(last_played: Option<DateTime<Utc>>, date: DateTime<Utc>) -> i64 {
    match last_played {
        Some(last) => {
            let days = (date - last).num_days();
            if days < 0 {
                DEFAULT_REST_DAYS
            } else {
                days
            }
        }
        None => DEFAULT_REST_DAYS,
    }
}

/// Heuristic used when the predictor cannot rate a game.
pub fn quick_predict(home: &TeamRecord, away: &TeamRecord, rules: &SeasonRules) -> f64 {
    heuristic_probability(
        home,
        away,
        rules.home_ice_bonus,
        rules.fallback_min,
        rules.fallback_max,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::predictor::{PredictionError, SimplePredictor};
    use crate::standings::record::test_support::record;
    use chrono::{Duration, TimeZone};
    use rand::rngs::SmallRng;
    use rand::SeedableRng;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn day(n: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 19, 0, 0).unwrap() + Duration::days(n)
    }

    fn predictor() -> Arc<dyn GamePredictor> {
        Arc::new(SimplePredictor::new(0.06, 0.30, 0.80))
    }

    fn conference() -> Vec<TeamRecord> {
        vec![
            record("AAA", "Atlantic", 40, 15, 5),
            record("BBB", "Atlantic", 35, 20, 5),
            record("CCC", "Atlantic", 30, 25, 5),
            record("DDD", "Atlantic", 25, 30, 5),
            record("EEE", "Metro", 38, 17, 5),
            record("FFF", "Metro", 33, 22, 5),
            record("GGG", "Metro", 28, 27, 5),
            record("HHH", "Metro", 26, 29, 5),
            record("III", "Metro", 22, 33, 5),
        ]
    }

    fn round_robin(teams: &[TeamRecord], rounds: i64) -> Vec<RemainingGame> {
        let mut games = Vec::new();
        let mut d = 0;
        for _ in 0..rounds {
            for (i, home) in teams.iter().enumerate() {
                for away in teams.iter().skip(i + 1) {
                    games.push(RemainingGame::new(&home.team_code, &away.team_code, day(d)));
                    d += 1;
                }
            }
        }
        games
    }

    /// Always returns a fixed value, counting calls.
    #[derive(Debug)]
    struct Constant {
        value: f64,
        calls: AtomicUsize,
    }

    impl GamePredictor for Constant {
        fn predict_win_probability(
            &self,
            _home: &str,
            _away: &str,
            _ctx: &PredictionContext<'_>,
        ) -> Result<f64, PredictionError> {
            self.calls.fetch_add(1, Ordering::Relaxed);
            Ok(self.value)
        }

        fn name(&self) -> &'static str {
            "constant"
        }
    }

    #[derive(Debug)]
    struct AlwaysFails;

    impl GamePredictor for AlwaysFails {
        fn predict_win_probability(
            &self,
            home: &str,
            _away: &str,
            _ctx: &PredictionContext<'_>,
        ) -> Result<f64, PredictionError> {
            Err(PredictionError::InsufficientData {
                team: home.to_string(),
                reason: "test".into(),
            })
        }

        fn name(&self) -> &'static str {
            "fails"
        }
    }

    #[test]
    fn unknown_target_is_rejected() {
        let sim = SeasonSimulator::new("XXX", &conference(), &[], predictor(), SeasonRules::default());
        assert!(sim.is_none());
    }

    #[test]
    fn games_are_conserved_and_points_per_game_are_two_or_three() {
        let teams = conference();
        let games = round_robin(&teams, 2);
        let sim = SeasonSimulator::new("AAA", &teams, &games, predictor(), SeasonRules::default())
            .unwrap();
        let mut rng = SmallRng::seed_from_u64(7);

        for _ in 0..20 {
            let arena = sim.replay(&mut rng);
            let gp_before: u32 = teams.iter().map(|t| t.games_played).sum();
            let gp_after: u32 = arena.iter().map(|t| t.games_played).sum();
            assert_eq!(gp_after - gp_before, 2 * games.len() as u32);

            let pts_before: u32 = teams.iter().map(|t| t.points).sum();
            let pts_after: u32 = arena.iter().map(|t| t.points).sum();
            let added = pts_after - pts_before;
            let g = games.len() as u32;
            assert!(added >= 2 * g && added <= 3 * g);

            assert!(arena.iter().all(TeamRecord::is_consistent));
        }
    }

    #[test]
    fn baseline_records_are_untouched() {
        let teams = conference();
        let games = round_robin(&teams, 1);
        let sim = SeasonSimulator::new("AAA", &teams, &games, predictor(), SeasonRules::default())
            .unwrap();
        let mut rng = SmallRng::seed_from_u64(1);
        sim.simulate_season(&mut rng);
        sim.simulate_season(&mut rng);
        assert_eq!(sim.baseline.as_ref(), teams.as_slice());
    }

    #[test]
    fn empty_schedule_ranks_current_standings() {
        let teams = conference();
        let sim = SeasonSimulator::new("CCC", &teams, &[], predictor(), SeasonRules::default())
            .unwrap();
        let result = sim.simulate_season(&mut SmallRng::seed_from_u64(3));
        // AAA 85, EEE 81, BBB 75, FFF 71, CCC 65
        assert_eq!(result.conference_rank, 5);
        assert_eq!(result.division_rank, 3);
        assert_eq!(result.final_points, 65);
        assert!(result.made_playoffs);
        assert_eq!(result.spot, PlayoffSpot::Division);
    }

    #[test]
    fn wildcard_and_missed_spots() {
        let teams = conference();
        let sim = SeasonSimulator::new("HHH", &teams, &[], predictor(), SeasonRules::default())
            .unwrap();
        // HHH 57 is 4th in Metro but 7th overall.
        let result = sim.simulate_season(&mut SmallRng::seed_from_u64(3));
        assert_eq!(result.conference_rank, 7);
        assert_eq!(result.division_rank, 4);
        assert_eq!(result.spot, PlayoffSpot::Wildcard);

        let sim = SeasonSimulator::new("III", &teams, &[], predictor(), SeasonRules::default())
            .unwrap();
        let result = sim.simulate_season(&mut SmallRng::seed_from_u64(3));
        assert_eq!(result.conference_rank, 9);
        assert!(!result.made_playoffs);
        assert_eq!(result.spot, PlayoffSpot::None);
    }

    #[test]
    fn out_of_conference_games_are_skipped() {
        let teams = conference();
        let games = vec![
            RemainingGame::new("AAA", "ZZZ", day(0)),
            RemainingGame::new("AAA", "BBB", day(1)),
        ];
        let sim = SeasonSimulator::new("AAA", &teams, &games, predictor(), SeasonRules::default())
            .unwrap();
        assert_eq!(sim.games_to_replay(), 1);
        assert_eq!(sim.skipped_games(), 1);
    }

    #[test]
    fn raw_probabilities_are_clamped() {
        let teams = conference();
        let games: Vec<RemainingGame> = (0..400)
            .map(|d| RemainingGame::new("III", "AAA", day(d)))
            .collect();
        let constant = Arc::new(Constant {
            value: 0.0,
            calls: AtomicUsize::new(0),
        });
        let sim = SeasonSimulator::new("III", &teams, &games, constant.clone(), SeasonRules::default())
            .unwrap();
        let arena = sim.replay(&mut SmallRng::seed_from_u64(11));
        assert_eq!(constant.calls.load(Ordering::Relaxed), 400);

        // With p clamped to 0.25 the home side still wins about a quarter.
        let iii = arena.iter().find(|t| t.team_code == "III").unwrap();
        let home_wins = iii.wins - 22;
        assert!(home_wins > 60 && home_wins < 140, "home wins {home_wins}");
    }

    #[test]
    fn predictor_failure_uses_heuristic() {
        let teams = conference();
        let games = round_robin(&teams, 1);
        let sim = SeasonSimulator::new("AAA", &teams, &games, Arc::new(AlwaysFails), SeasonRules::default())
            .unwrap();
        let arena = sim.replay(&mut SmallRng::seed_from_u64(5));
        let gp: u32 = arena.iter().map(|t| t.games_played).sum();
        assert_eq!(gp, teams.iter().map(|t| t.games_played).sum::<u32>() + 2 * games.len() as u32);
    }

    #[test]
    fn same_seed_same_trial() {
        let teams = conference();
        let games = round_robin(&teams, 2);
        let sim = SeasonSimulator::new("DDD", &teams, &games, predictor(), SeasonRules::default())
            .unwrap();
        let a = sim.simulate_season(&mut SmallRng::seed_from_u64(99));
        let b = sim.simulate_season(&mut SmallRng::seed_from_u64(99));
        assert_eq!(a, b);
    }

    #[test]
    fn context_flags_and_rest_days() {
        let rules = SeasonRules::default();
        let home = record("AAA", "Atlantic", 40, 30, 5);
        let away = record("BBB", "Atlantic", 38, 30, 5);
        let ctx = build_context(&home, &away, day(5), Some(day(1)), None, &rules);
        assert!(ctx.is_division_game);
        assert!(ctx.is_rivalry_game);
        // 75 games played, 7 left.
        assert!(ctx.is_playoff_stakes);
        assert_eq!(ctx.home_rest_days, 4);
        assert_eq!(ctx.away_rest_days, 3);

        let other = record("CCC", "Metro", 20, 30, 5);
        let ctx = build_context(&other, &home, day(1), Some(day(3)), Some(day(0)), &rules);
        assert!(!ctx.is_division_game);
        assert!(!ctx.is_rivalry_game);
        assert!(!ctx.is_playoff_stakes);
        assert_eq!(ctx.home_rest_days, 3);
        assert_eq!(ctx.away_rest_days, 1);
    }

    #[test]
    fn decision_thresholds() {
        let rules = SeasonRules::default();
        assert_eq!(rules.decision_for(0.0), GameDecision::Regulation);
        assert_eq!(rules.decision_for(0.849), GameDecision::Regulation);
        assert_eq!(rules.decision_for(0.85), GameDecision::Overtime);
        assert_eq!(rules.decision_for(0.949), GameDecision::Overtime);
        assert_eq!(rules.decision_for(0.951), GameDecision::Shootout);
    }
}
