// Configuration loading and parsing (simulation.toml, elo_ratings.toml).

use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::info;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("validation error for field `{field}`: {message}")]
    ValidationError { field: String, message: String },

    #[error("no simulation.toml in {config_dir} and no defaults/ to install it from")]
    MissingDefaults { config_dir: PathBuf },

    #[error("failed to install default config {path}: {source}")]
    InstallDefault {
        path: PathBuf,
        source: std::io::Error,
    },
}

// ---------------------------------------------------------------------------
// Top-level assembled Config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct Config {
    pub simulation: SimulationConfig,
    /// Seed ratings for the Elo predictor, keyed by team code.
    pub elo_ratings: HashMap<String, f64>,
}

// ---------------------------------------------------------------------------
// simulation.toml structs
// ---------------------------------------------------------------------------

/// Everything the engine needs, as laid out in simulation.toml.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SimulationConfig {
    #[serde(default)]
    pub season: SeasonConfig,
    #[serde(default)]
    pub trials: TrialConfig,
    #[serde(default)]
    pub adaptive: AdaptiveConfig,
    #[serde(default)]
    pub prediction: PredictionConfig,
    #[serde(default)]
    pub outcomes: OutcomeConfig,
    #[serde(default)]
    pub cache: CacheConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SeasonConfig {
    pub games_per_season: u32,
    /// Conference teams that qualify (top N).
    pub playoff_spots: usize,
    /// Guaranteed berths per division.
    pub division_spots: usize,
}

impl Default for SeasonConfig {
    fn default() -> Self {
        Self {
            games_per_season: 82,
            playoff_spots: 8,
            division_spots: 3,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TrialConfig {
    /// Trial count when the caller does not ask for one.
    pub default: usize,
    /// Trial count used by `recalculate_playoff_odds`.
    pub recalculate: usize,
    /// Batches at or above this size run on the worker pool.
    pub parallel_threshold: usize,
    pub progress_interval_ms: u64,
    /// Fixed base seed for reproducible batches. Random when absent.
    #[serde(default)]
    pub seed: Option<u64>,
}

impl Default for TrialConfig {
    fn default() -> Self {
        Self {
            default: 5000,
            recalculate: 5000,
            parallel_threshold: 1000,
            progress_interval_ms: 1000,
            seed: None,
        }
    }
}

impl TrialConfig {
    pub fn progress_interval(&self) -> Duration {
        Duration::from_millis(self.progress_interval_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AdaptiveConfig {
    pub min: usize,
    pub max: usize,
    pub default: usize,
}

impl Default for AdaptiveConfig {
    fn default() -> Self {
        Self {
            min: 500,
            max: 10000,
            default: 5000,
        }
    }
}

/// Which win-probability strategy the service is built with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PredictorStrategy {
    Simple,
    #[default]
    Elo,
    Model,
    Hybrid,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PredictionConfig {
    pub strategy: PredictorStrategy,
    /// Safety band applied to every predictor output before drawing.
    pub clamp_min: f64,
    pub clamp_max: f64,
    /// Band for the per-game fallback heuristic.
    pub fallback_min: f64,
    pub fallback_max: f64,
    pub home_ice_bonus: f64,
    /// Minimum game importance for the hybrid predictor to use the model.
    pub hybrid_threshold: f64,
    #[serde(default)]
    pub model: ModelWeights,
}

impl Default for PredictionConfig {
    fn default() -> Self {
        Self {
            strategy: PredictorStrategy::Elo,
            clamp_min: 0.25,
            clamp_max: 0.85,
            fallback_min: 0.30,
            fallback_max: 0.80,
            home_ice_bonus: 0.06,
            hybrid_threshold: 0.65,
            model: ModelWeights::default(),
        }
    }
}

/// Coefficients of the logistic game model (log-odds of a home win).
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct ModelWeights {
    pub intercept: f64,
    pub point_pct: f64,
    pub goal_diff_per_game: f64,
    pub rest_days: f64,
}

impl Default for ModelWeights {
    fn default() -> Self {
        Self {
            intercept: 0.16,
            point_pct: 4.0,
            goal_diff_per_game: 0.6,
            rest_days: 0.05,
        }
    }
}

/// How won games are decided. Shootouts take the remainder.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct OutcomeConfig {
    pub regulation: f64,
    pub overtime: f64,
}

impl Default for OutcomeConfig {
    fn default() -> Self {
        Self {
            regulation: 0.85,
            overtime: 0.10,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    pub ttl_secs: u64,
    pub what_if_ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 3600,
            what_if_ttl_secs: 300,
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn what_if_ttl(&self) -> Duration {
        Duration::from_secs(self.what_if_ttl_secs)
    }
}

// ---------------------------------------------------------------------------
// elo_ratings.toml structs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize)]
struct RatingsFile {
    #[serde(default)]
    ratings: HashMap<String, f64>,
}

// ---------------------------------------------------------------------------
// Loading logic
// ---------------------------------------------------------------------------

/// Load and validate configuration from `config/simulation.toml` and
/// (optionally) `config/elo_ratings.toml`, relative to `base_dir`.
///
/// Does not copy defaults; prefer `load_config()`.
pub(crate) fn load_config_from(base_dir: &Path) -> Result<Config, ConfigError> {
    let config_dir = base_dir.join("config");

    // --- simulation.toml (required) ---
    let simulation_path = config_dir.join("simulation.toml");
    let simulation_text = read_file(&simulation_path)?;
    let simulation: SimulationConfig =
        toml::from_str(&simulation_text).map_err(|e| ConfigError::ParseError {
            path: simulation_path.clone(),
            source: e,
        })?;

    // --- elo_ratings.toml (optional) ---
    let ratings_path = config_dir.join("elo_ratings.toml");
    let ratings = if ratings_path.exists() {
        let text = read_file(&ratings_path)?;
        let file: RatingsFile = toml::from_str(&text).map_err(|e| ConfigError::ParseError {
            path: ratings_path.clone(),
            source: e,
        })?;
        file.ratings
    } else {
        HashMap::new()
    };

    let config = Config {
        simulation,
        elo_ratings: ratings,
    };

    validate(&config)?;

    Ok(config)
}

/// Files `defaults/` may provide. `simulation.toml` is required; the Elo
/// seed ratings are optional and ship only as an `.example`.
const DEFAULT_CONFIG_FILES: [&str; 2] = ["simulation.toml", "elo_ratings.toml"];

/// Install any of the known config files missing from `config/` using the
/// copies in `defaults/`. Existing files are never overwritten. Returns the
/// paths written.
pub fn install_default_configs(base_dir: &Path) -> Result<Vec<PathBuf>, ConfigError> {
    let defaults_dir = base_dir.join("defaults");
    let config_dir = base_dir.join("config");

    if !defaults_dir.is_dir() {
        if config_dir.join("simulation.toml").is_file() {
            return Ok(Vec::new());
        }
        return Err(ConfigError::MissingDefaults { config_dir });
    }

    std::fs::create_dir_all(&config_dir).map_err(|e| ConfigError::InstallDefault {
        path: config_dir.clone(),
        source: e,
    })?;

    let mut installed = Vec::new();
    for name in DEFAULT_CONFIG_FILES {
        let default = defaults_dir.join(name);
        if !default.is_file() {
            continue;
        }
        let target = config_dir.join(name);
        if install_one(&default, &target)? {
            info!("installed default {}", target.display());
            installed.push(target);
        }
    }
    Ok(installed)
}

/// Copy `from` to `to` unless `to` already exists. `create_new` keeps two
/// processes from clobbering each other's copy.
fn install_one(from: &Path, to: &Path) -> Result<bool, ConfigError> {
    let install_err = |source: std::io::Error| ConfigError::InstallDefault {
        path: to.to_path_buf(),
        source,
    };
    let mut dest = match std::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(to)
    {
        Ok(dest) => dest,
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => return Ok(false),
        Err(e) => return Err(install_err(e)),
    };
    let mut src = std::fs::File::open(from).map_err(install_err)?;
    std::io::copy(&mut src, &mut dest).map_err(install_err)?;
    Ok(true)
}

/// Load config relative to the current working directory, copying defaults
/// first.
pub fn load_config() -> Result<Config, ConfigError> {
    let cwd = std::env::current_dir().map_err(|_| ConfigError::FileNotFound {
        path: PathBuf::from("."),
    })?;
    install_default_configs(&cwd)?;
    load_config_from(&cwd)
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn read_file(path: &Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|_| ConfigError::FileNotFound {
        path: path.to_path_buf(),
    })
}

fn invalid(field: &str, message: impl Into<String>) -> ConfigError {
    ConfigError::ValidationError {
        field: field.to_string(),
        message: message.into(),
    }
}

fn check_band(field: &str, min: f64, max: f64) -> Result<(), ConfigError> {
    if !(min > 0.0 && min < max && max < 1.0) {
        return Err(invalid(
            field,
            format!("must satisfy 0 < min < max < 1, got [{min}, {max}]"),
        ));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

pub(crate) fn validate(config: &Config) -> Result<(), ConfigError> {
    let sim = &config.simulation;

    if sim.season.games_per_season == 0 {
        return Err(invalid("season.games_per_season", "must be greater than 0"));
    }
    if sim.season.playoff_spots == 0 {
        return Err(invalid("season.playoff_spots", "must be greater than 0"));
    }
    if sim.season.division_spots == 0 {
        return Err(invalid("season.division_spots", "must be greater than 0"));
    }

    let count_fields: &[(&str, usize)] = &[
        ("trials.default", sim.trials.default),
        ("trials.recalculate", sim.trials.recalculate),
        ("trials.parallel_threshold", sim.trials.parallel_threshold),
        ("adaptive.min", sim.adaptive.min),
    ];
    for (name, val) in count_fields {
        if *val == 0 {
            return Err(invalid(name, "must be > 0"));
        }
    }
    if sim.trials.progress_interval_ms == 0 {
        return Err(invalid("trials.progress_interval_ms", "must be > 0"));
    }

    let a = &sim.adaptive;
    if !(a.min <= a.default && a.default <= a.max) {
        return Err(invalid(
            "adaptive.default",
            format!("must lie within [min, max] = [{}, {}], got {}", a.min, a.max, a.default),
        ));
    }

    let p = &sim.prediction;
    check_band("prediction.clamp", p.clamp_min, p.clamp_max)?;
    check_band("prediction.fallback", p.fallback_min, p.fallback_max)?;
    if !(0.0..0.5).contains(&p.home_ice_bonus) {
        return Err(invalid(
            "prediction.home_ice_bonus",
            format!("must be in [0.0, 0.5), got {}", p.home_ice_bonus),
        ));
    }
    if !(0.0..=1.0).contains(&p.hybrid_threshold) {
        return Err(invalid(
            "prediction.hybrid_threshold",
            format!("must be between 0.0 and 1.0 inclusive, got {}", p.hybrid_threshold),
        ));
    }

    let o = &sim.outcomes;
    if o.regulation < 0.0 || o.overtime < 0.0 || o.regulation + o.overtime > 1.0 {
        return Err(invalid(
            "outcomes",
            format!(
                "regulation and overtime must be >= 0 and sum to at most 1.0, got {} + {}",
                o.regulation, o.overtime
            ),
        ));
    }

    if sim.cache.ttl_secs == 0 {
        return Err(invalid("cache.ttl_secs", "must be > 0"));
    }
    if sim.cache.what_if_ttl_secs == 0 {
        return Err(invalid("cache.what_if_ttl_secs", "must be > 0"));
    }

    for (team, rating) in &config.elo_ratings {
        if !rating.is_finite() || *rating <= 0.0 {
            return Err(invalid(
                &format!("ratings.{team}"),
                format!("must be a positive finite rating, got {rating}"),
            ));
        }
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
