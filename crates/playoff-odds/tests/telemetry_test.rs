// Tracing setup writes to the log directory. Lives in its own test binary
// because the subscriber is process-global.

use playoff_odds::telemetry::init_tracing;

#[test]
fn init_tracing_creates_log_file_and_rejects_second_install() {
    let dir = std::env::temp_dir().join("playoff_odds_telemetry_test");
    let _ = std::fs::remove_dir_all(&dir);

    init_tracing(&dir).expect("first install should succeed");
    tracing::info!("telemetry test line");
    assert!(dir.join("playoff-odds.log").exists());

    assert!(init_tracing(&dir).is_err());
}
