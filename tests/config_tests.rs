// Worker configuration tests

use grid_bot_worker::{ConfigError, WorkerConfig};
use tempfile::tempdir;

#[test]
fn default_config_is_valid() {
    let config = WorkerConfig::default();
    assert!(config.validate().is_ok());

    assert_eq!(config.defaults.grid_count, 10);
    assert_eq!(config.defaults.stop_loss_percent, 5.0);
    assert_eq!(config.defaults.interval_secs, 30);
    assert!((config.defaults.range_percent - 0.05).abs() < 1e-9);
    assert_eq!(config.worker.min_tick_secs, 5);
}

#[test]
fn load_or_create_round_trips_defaults() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("config.toml");

    let created = WorkerConfig::load_or_create(&path).unwrap();
    assert!(path.exists());

    let loaded = WorkerConfig::from_file(&path).unwrap();
    assert_eq!(loaded.worker.poll_interval_secs, created.worker.poll_interval_secs);
    assert_eq!(loaded.venue.spot_base_url, created.venue.spot_base_url);
    assert_eq!(loaded.defaults.grid_count, created.defaults.grid_count);
}

#[test]
fn missing_file_is_reported() {
    let result = WorkerConfig::from_file("/nonexistent/config.toml");
    assert!(matches!(result, Err(ConfigError::FileNotFound(_))));
}

#[test]
fn partial_file_fills_in_defaults() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "[worker]\npoll_interval_secs = 3\nmin_tick_secs = 2\ndatabase_path = \"x.db\"\n").unwrap();

    let config = WorkerConfig::from_file(&path).unwrap();
    assert_eq!(config.worker.poll_interval_secs, 3);
    // Venue and grid defaults come from Default
    assert_eq!(config.venue.spot_base_url, "https://api.binance.com");
    assert_eq!(config.defaults.grid_count, 10);
}

#[test]
fn invalid_values_are_rejected() {
    let dir = tempdir().unwrap();

    let cases = [
        ("[worker]\ndatabase_path = \"x.db\"\npoll_interval_secs = 0\nmin_tick_secs = 5\n"),
        ("[defaults]\ngrid_count = 1\ninterval_secs = 30\nstop_loss_percent = 5.0\ninvestment = 1000.0\nrange_percent = 0.05\n"),
        ("[defaults]\ngrid_count = 10\ninterval_secs = 30\nstop_loss_percent = -1.0\ninvestment = 1000.0\nrange_percent = 0.05\n"),
        ("[defaults]\ngrid_count = 10\ninterval_secs = 30\nstop_loss_percent = 5.0\ninvestment = 1000.0\nrange_percent = 1.5\n"),
    ];

    for (i, content) in cases.iter().enumerate() {
        let path = dir.path().join(format!("bad-{}.toml", i));
        std::fs::write(&path, content).unwrap();
        let result = WorkerConfig::from_file(&path);
        assert!(
            matches!(result, Err(ConfigError::Validation(_))),
            "case {} should fail validation",
            i
        );
    }
}

#[test]
fn garbage_toml_is_a_parse_error() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("garbage.toml");
    std::fs::write(&path, "not toml at all {{{").unwrap();

    let result = WorkerConfig::from_file(&path);
    assert!(matches!(result, Err(ConfigError::Parse(_))));
}
