// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

const FULL: &str = r#"
[daemon]
socket_path = "/tmp/rg-test.sock"
state_dir = "/var/lib/rungate"

[defaults]
capacity = 2
checkpoint_threshold = 50
follower_grant_timeout = "90s"

[[runner]]
id = "emulator-a"
capacity = 4

[[runner]]
id = "emulator-b"
checkpoint_threshold = 10
"#;

fn parse(content: &str) -> Result<DaemonConfig, ConfigError> {
    DaemonConfig::parse(Path::new("rungated.toml"), content)
}

#[test]
fn empty_file_uses_defaults() {
    let config = parse("").unwrap();
    assert_eq!(config, DaemonConfig::default());
    assert_eq!(config.defaults.capacity, 1);
    assert_eq!(
        config.defaults.follower_grant_timeout,
        Duration::from_secs(600)
    );
    assert_eq!(config.socket_path(), PathBuf::from(DEFAULT_SOCKET_PATH));
}

#[test]
fn full_file_builds_registry_config() {
    let config = parse(FULL).unwrap();
    let registry = config.registry_config().unwrap();

    assert_eq!(registry.state_dir, PathBuf::from("/var/lib/rungate"));
    assert_eq!(registry.follower_grant_timeout, Duration::from_secs(90));
    assert_eq!(registry.defaults.capacity, 2);

    let a = registry.config_for(&"emulator-a".into());
    assert_eq!(a.capacity, 4);
    assert_eq!(a.checkpoint_threshold, 50);

    let b = registry.config_for(&"emulator-b".into());
    assert_eq!(b.capacity, 2);
    assert_eq!(b.checkpoint_threshold, 10);
}

#[test]
fn log_path_defaults_into_state_dir() {
    let config = parse(FULL).unwrap();
    assert_eq!(
        config.log_path().unwrap(),
        PathBuf::from("/var/lib/rungate/rungated.log")
    );
}

#[test]
fn duplicate_runner_is_rejected() {
    let content = r#"
[[runner]]
id = "emulator-a"

[[runner]]
id = "emulator-a"
"#;
    let err = parse(content).unwrap_err();
    assert!(matches!(err, ConfigError::DuplicateRunner(id) if id.as_str() == "emulator-a"));
}

#[test]
fn unknown_keys_are_rejected() {
    let err = parse("[defaults]\ncapacityy = 3\n").unwrap_err();
    assert!(matches!(err, ConfigError::Parse(..)));
}

#[test]
fn load_reads_file_from_path() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("rungated.toml");
    std::fs::write(&path, "[defaults]\ncapacity = 3\n").unwrap();

    let config = DaemonConfig::load(Some(&path)).unwrap();
    assert_eq!(config.defaults.capacity, 3);
}

#[test]
fn load_reports_missing_file() {
    let err = DaemonConfig::load(Some(Path::new("/nonexistent/rungated.toml"))).unwrap_err();
    assert!(matches!(err, ConfigError::Read(..)));
}
