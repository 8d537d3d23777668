// CLASSIFICATION: COMMUNITY
// Filename: logging.rs v0.1
// Author: Lukas Bower
// Date Modified: 2026-10-17

//! Process logger: `[<timestamp>] [<pid>] [<LEVEL>] <message>`.

use std::io::Write;

use chrono::Local;
use env_logger::{Builder, Env};

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S %z";

/// Install the global logger. Level defaults to `info`; `RUST_LOG`
/// overrides it. A second call is a no-op.
pub fn init() {
    let pid = std::process::id();
    let _ = Builder::from_env(Env::default().default_filter_or("info"))
        .format(move |buf, record| {
            writeln!(
                buf,
                "[{}] [{}] [{}] {}",
                Local::now().format(TIMESTAMP_FORMAT),
                pid,
                record.level(),
                record.args()
            )
        })
        .try_init();
}
