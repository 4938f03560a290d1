// Standings: team records, the tiebreaker chain, and snapshot sources.

pub mod record;
pub mod tiebreak;

use std::io::Read;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Deserialize;
use tracing::warn;

pub use record::{GameDecision, TeamRecord};

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum StandingsError {
    #[error("failed to read standings file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("CSV error in {path}: {source}")]
    Csv { path: PathBuf, source: csv::Error },

    #[error("standings source unavailable: {0}")]
    Unavailable(String),
}

// ---------------------------------------------------------------------------
// Source trait
// ---------------------------------------------------------------------------

/// Supplies a point-in-time snapshot of every team's record.
#[async_trait]
pub trait StandingsSource: Send + Sync {
    async fn standings(&self) -> Result<Vec<TeamRecord>, StandingsError>;
}

/// A fixed in-memory snapshot.
#[derive(Debug, Clone, Default)]
pub struct StaticStandings {
    teams: Vec<TeamRecord>,
}

impl StaticStandings {
    pub fn new(teams: Vec<TeamRecord>) -> Self {
        Self { teams }
    }
}

#[async_trait]
impl StandingsSource for StaticStandings {
    async fn standings(&self) -> Result<Vec<TeamRecord>, StandingsError> {
        Ok(self.teams.clone())
    }
}

// ---------------------------------------------------------------------------
// CSV snapshot source
// ---------------------------------------------------------------------------

/// Reads a standings snapshot from a CSV file on every request, so an
/// upstream ingester can rewrite the file between calls.
#[derive(Debug, Clone)]
pub struct CsvStandingsSource {
    path: PathBuf,
}

impl CsvStandingsSource {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

#[async_trait]
impl StandingsSource for CsvStandingsSource {
    async fn standings(&self) -> Result<Vec<TeamRecord>, StandingsError> {
        let bytes = tokio::fs::read(&self.path)
            .await
            .map_err(|source| StandingsError::Io {
                path: self.path.clone(),
                source,
            })?;
        load_standings_from_reader(bytes.as_slice()).map_err(|source| StandingsError::Csv {
            path: self.path.clone(),
            source,
        })
    }
}

/// Standings CSV row. ROW may be blank; the record then estimates it.
#[derive(Debug, Deserialize)]
struct RawStandingsRow {
    team_code: String,
    team_name: String,
    conference: String,
    division: String,
    games_played: u32,
    wins: u32,
    losses: u32,
    ot_losses: u32,
    #[serde(default)]
    regulation_wins: Option<u32>,
    #[serde(default)]
    row: Option<u32>,
    points: u32,
    goals_for: u32,
    goals_against: u32,
}

/// Parse standings rows from any reader. Malformed rows are skipped with a
/// warning; I/O and header errors are returned.
pub fn load_standings_from_reader<R: Read>(rdr: R) -> Result<Vec<TeamRecord>, csv::Error> {
    let mut reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(rdr);
    reader.headers()?;
    let mut teams = Vec::new();
    for result in reader.deserialize::<RawStandingsRow>() {
        match result {
            Ok(raw) => {
                let mut rec = TeamRecord {
                    team_code: raw.team_code,
                    team_name: raw.team_name,
                    conference: raw.conference,
                    division: raw.division,
                    games_played: raw.games_played,
                    wins: raw.wins,
                    losses: raw.losses,
                    ot_losses: raw.ot_losses,
                    regulation_wins: raw.regulation_wins.unwrap_or(0),
                    regulation_plus_ot_wins: raw.row.unwrap_or(0),
                    points: raw.points,
                    goals_for: raw.goals_for,
                    goals_against: raw.goals_against,
                    point_pct: 0.0,
                };
                rec.refresh_point_pct();
                if !rec.is_consistent() {
                    warn!(
                        "standings row for '{}' breaks the points/games identities ({} pts, {})",
                        rec.team_code,
                        rec.points,
                        rec.record_line()
                    );
                }
                teams.push(rec);
            }
            Err(e) => {
                warn!("skipping malformed standings row: {}", e);
            }
        }
    }
    Ok(teams)
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = "team_code,team_name,conference,division,games_played,wins,losses,ot_losses,regulation_wins,row,points,goals_for,goals_against\n";

    #[test]
    fn parses_rows_and_estimates_missing_row() {
        let csv = format!(
            "{}TOR,Toronto,Eastern,Atlantic,60,35,20,5,30,33,75,200,180\n\
             BOS,Boston,Eastern,Atlantic,60,36,19,5,,,77,190,170\n",
            HEADER
        );
        let teams = load_standings_from_reader(csv.as_bytes()).unwrap();
        assert_eq!(teams.len(), 2);
        assert_eq!(teams[0].row(), 33);
        assert_eq!(teams[1].regulation_plus_ot_wins, 0);
        assert_eq!(teams[1].row(), 30);
        assert!((teams[0].point_pct - 75.0 / 120.0).abs() < 1e-12);
    }

    #[test]
    fn malformed_rows_are_skipped() {
        let csv = format!(
            "{}TOR,Toronto,Eastern,Atlantic,sixty,35,20,5,30,33,75,200,180\n\
             BOS,Boston,Eastern,Atlantic,60,36,19,5,30,34,77,190,170\n",
            HEADER
        );
        let teams = load_standings_from_reader(csv.as_bytes()).unwrap();
        assert_eq!(teams.len(), 1);
        assert_eq!(teams[0].team_code, "BOS");
    }

    #[tokio::test]
    async fn static_source_returns_snapshot() {
        let source = StaticStandings::new(vec![record::test_support::record(
            "NYR", "Metro", 10, 5, 1,
        )]);
        let teams = source.standings().await.unwrap();
        assert_eq!(teams[0].team_code, "NYR");
    }

    #[tokio::test]
    async fn csv_source_reports_missing_file() {
        let source = CsvStandingsSource::new("/nonexistent/standings.csv");
        match source.standings().await {
            Err(StandingsError::Io { path, .. }) => {
                assert!(path.ends_with("standings.csv"));
            }
            other => panic!("expected Io error, got {other:?}"),
        }
    }
}
