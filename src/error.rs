// CLASSIFICATION: COMMUNITY
// Filename: error.rs v0.1
// Author: Lukas Bower
// Date Modified: 2026-10-17

//! Process-level errors: configuration, bootstrap and the engine.

use std::path::PathBuf;

use datapond_lake::LakeError;
use thiserror::Error;

/// Errors raised while configuring or starting the emulator.
#[derive(Debug, Error)]
pub enum DatapondError {
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("cannot read config file {path}: {source}")]
    ConfigFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed config file {path}: {source}")]
    ConfigSyntax {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("cannot bind {addr}: {reason}")]
    Bind { addr: String, reason: String },
    #[error("worker thread: {0}")]
    Io(#[from] std::io::Error),
    #[error("command line: {0}")]
    Cli(#[from] clap::Error),
    #[error(transparent)]
    Lake(#[from] LakeError),
}

pub type DatapondResult<T> = Result<T, DatapondError>;
