// CLASSIFICATION: COMMUNITY
// Filename: config_env.rs v0.1
// Author: Lukas Bower
// Date Modified: 2026-10-17

use std::env;
use std::path::PathBuf;

use clap::Parser;
use datapond::{Args, DatapondConfig, DatapondError};
use serial_test::serial;

const VARS: [&str; 3] = ["DATAPOND_FS_DIR", "DATAPOND_FAILURE_CHANCE", "DATAPOND_PORT"];

fn clear() {
    for var in VARS {
        env::remove_var(var);
    }
}

#[test]
#[serial]
fn environment_overrides_defaults() {
    clear();
    env::set_var("DATAPOND_FS_DIR", "/tmp/datapond-env");
    env::set_var("DATAPOND_FAILURE_CHANCE", "0.5");
    env::set_var("DATAPOND_PORT", "8123");
    let args = Args::try_parse_from(["datapond"]).expect("parse");
    let cfg = DatapondConfig::resolve(&args).expect("resolve");
    clear();
    assert_eq!(cfg.fs_dir, PathBuf::from("/tmp/datapond-env"));
    assert_eq!(cfg.failure_chance, 0.5);
    assert_eq!(cfg.port, 8123);
    assert_eq!(cfg.workers, 4);
}

#[test]
#[serial]
fn flags_beat_environment_and_environment_beats_file() {
    clear();
    let dir = tempfile::tempdir().expect("tempdir");
    let file = dir.path().join("datapond.toml");
    std::fs::write(&file, "port = 7000\nbind = \"127.0.0.1\"\n").expect("write");
    env::set_var("DATAPOND_PORT", "7100");
    let file_arg = file.to_string_lossy().into_owned();

    let args = Args::try_parse_from(["datapond", "--config", &file_arg]).expect("parse");
    let cfg = DatapondConfig::resolve(&args).expect("resolve");
    assert_eq!((cfg.bind.as_str(), cfg.port), ("127.0.0.1", 7100));

    let args = Args::try_parse_from(["datapond", "--config", &file_arg, "--port", "7200"])
        .expect("parse");
    let cfg = DatapondConfig::resolve(&args).expect("resolve");
    clear();
    assert_eq!(cfg.port, 7200);
}

#[test]
#[serial]
fn malformed_environment_is_rejected() {
    clear();
    env::set_var("DATAPOND_FAILURE_CHANCE", "often");
    let parsed = Args::try_parse_from(["datapond"]);
    env::set_var("DATAPOND_FAILURE_CHANCE", "2");
    let out_of_range = Args::try_parse_from(["datapond"])
        .map_err(DatapondError::from)
        .and_then(|args| DatapondConfig::resolve(&args));
    clear();
    assert!(parsed.is_err());
    assert!(matches!(out_of_range, Err(DatapondError::Config(_))));
}

#[test]
#[serial]
fn logger_init_is_idempotent() {
    datapond::logging::init();
    datapond::logging::init();
    log::info!("logger installed");
}
