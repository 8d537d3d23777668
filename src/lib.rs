// CLASSIFICATION: COMMUNITY
// Filename: lib.rs v0.1
// Author: Lukas Bower
// Date Modified: 2026-10-17

//! datapond: a local emulator of the Data Lake Gen2 filesystem API.
//
// ─────────────────────────────────────────────────────────────────────────────
// The engine (namespaces, append/flush, failure injection, disk layout)
// lives in `datapond-lake`. This crate adds what turns it into a process:
// layered configuration, the log format, and the HTTP front end.
// ─────────────────────────────────────────────────────────────────────────────

#![forbid(unsafe_code)]

pub mod config;
pub mod error;
pub mod http;
pub mod logging;

pub use config::{Args, DatapondConfig};
pub use datapond_lake as lake;
pub use error::{DatapondError, DatapondResult};
pub use http::{DatapondServer, ServerHandle};

use std::sync::Arc;

use datapond_lake::Lake;
use log::info;

/// Open the lake described by `config` and start serving it.
pub fn run(config: &DatapondConfig) -> DatapondResult<ServerHandle> {
    info!(
        "datapond {} starting: fs dir {}, failure chance {}%",
        env!("CARGO_PKG_VERSION"),
        config.fs_dir.display(),
        (config.failure_chance * 10_000.0).round() / 100.0
    );
    let lake = Arc::new(Lake::open(&config.lake_config())?);
    DatapondServer::start(config, lake)
}
