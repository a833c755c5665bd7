use assert_cmd::{cargo, prelude::*};
use chrono::NaiveDate;
use navrank::store::{NavPoint, NavStore};
use predicates::prelude::*;
use rust_decimal_macros::dec;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn setup_temp_home() -> TempDir {
    TempDir::new().expect("failed to create temp home")
}

fn data_dir(home: &TempDir) -> PathBuf {
    home.path().join("navdata")
}

/// Binary isolated from the user's config and data, offline
fn base_cmd(home: &TempDir) -> Command {
    let mut cmd = Command::new(cargo::cargo_bin!("navrank"));
    cmd.env("HOME", home.path())
        .env("XDG_CONFIG_HOME", home.path().join(".config"))
        .env("XDG_DATA_HOME", home.path().join(".local/share"))
        .env("NAVRANK_API_BASE_URL", "http://127.0.0.1:9")
        .env_remove("NAVRANK_CONFIG")
        .env_remove("NAVRANK_DATA_DIR")
        .env_remove("NAVRANK_SCHEME_LIMIT")
        .env_remove("NAVRANK_STALENESS_DAYS")
        .arg("--no-color")
        .arg("--data-dir")
        .arg(data_dir(home));
    cmd
}

fn write_config(home: &TempDir, body: &str) -> PathBuf {
    let path = home.path().join("navrank.toml");
    std::fs::write(&path, body).expect("failed to write config");
    path
}

fn seed_store(root: &Path) {
    let store = NavStore::open(root, 16).expect("failed to open store");
    let d = |y, m, day| NaiveDate::from_ymd_opt(y, m, day).unwrap();
    store
        .merge(
            &"120503".into(),
            &[
                NavPoint::new(d(2024, 1, 1), dec!(110)),
                NavPoint::new(d(2023, 1, 1), dec!(100)),
            ],
        )
        .expect("failed to seed store");
}

#[test]
fn help_lists_commands() {
    let mut cmd = Command::new(cargo::cargo_bin!("navrank"));
    cmd.arg("--help");
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("run"))
        .stdout(predicate::str::contains("xirr"))
        .stdout(predicate::str::contains("history"));
}

#[test]
fn history_on_empty_store_is_friendly_and_plain_when_piped() {
    let home = setup_temp_home();
    base_cmd(&home)
        .arg("history")
        .arg("120503")
        .assert()
        .success()
        .stdout(predicate::str::contains("No stored NAV history"))
        .stdout(predicate::str::contains("\u{001b}[").not());

    // Reads never create shard files
    let shards = data_dir(&home).join("shards");
    assert_eq!(std::fs::read_dir(shards).unwrap().count(), 0);
}

#[test]
fn history_json_reports_stored_points() {
    let home = setup_temp_home();
    seed_store(&data_dir(&home));

    let output = base_cmd(&home)
        .arg("--json")
        .arg("history")
        .arg("120503")
        .output()
        .unwrap();
    assert!(output.status.success());

    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(value["points"], 2);
    assert_eq!(value["first"]["date"], "2023-01-01");
    assert_eq!(value["latest"]["nav"], "110");
}

#[test]
fn xirr_uses_stored_history_only() {
    let home = setup_temp_home();
    seed_store(&data_dir(&home));

    base_cmd(&home)
        .arg("xirr")
        .arg("120503")
        .arg("--as-of")
        .arg("2024-01-01")
        .assert()
        .success()
        .stdout(predicate::str::contains("10.00%"))
        .stdout(predicate::str::contains("365 days"));
}

#[test]
fn xirr_without_history_fails_with_reason() {
    let home = setup_temp_home();
    base_cmd(&home)
        .arg("xirr")
        .arg("999")
        .assert()
        .failure()
        .stderr(predicate::str::contains("insufficient history"));
}

#[test]
fn run_without_provider_or_stored_schemes_fails() {
    let home = setup_temp_home();
    let config = write_config(&home, "[api]\ntimeout_secs = 2\nmax_retries = 0\n");

    base_cmd(&home)
        .arg("--config")
        .arg(config)
        .arg("run")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Scheme list unavailable"));
}

#[test]
fn invalid_config_is_rejected() {
    let home = setup_temp_home();
    let config = write_config(&home, "[persistence]\nshard_count = 0\n");

    base_cmd(&home)
        .arg("--config")
        .arg(config)
        .arg("history")
        .arg("1")
        .assert()
        .failure()
        .stderr(predicate::str::contains("shard_count"));
}

#[test]
fn bad_as_of_date_is_rejected() {
    let home = setup_temp_home();
    base_cmd(&home)
        .arg("xirr")
        .arg("1")
        .arg("--as-of")
        .arg("01/02/2024")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid date"));
}
