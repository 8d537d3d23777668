// CLASSIFICATION: COMMUNITY
// Filename: main.rs v0.1
// Author: Lukas Bower
// Date Modified: 2026-10-17

//! Entry point for the `datapond` emulator binary.

use datapond::{logging, DatapondConfig, DatapondError};

fn main() {
    logging::init();
    let config = match DatapondConfig::from_cli() {
        Ok(config) => config,
        Err(DatapondError::Cli(err)) => err.exit(),
        Err(err) => {
            eprintln!("Error: {}", err);
            std::process::exit(2);
        }
    };
    match datapond::run(&config) {
        Ok(server) => server.join(),
        Err(err) => {
            log::error!("{}", err);
            std::process::exit(1);
        }
    }
}
