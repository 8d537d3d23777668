// CLASSIFICATION: COMMUNITY
// Filename: config.rs v0.1
// Author: Lukas Bower
// Date Modified: 2026-10-17

//! Emulator configuration.
//!
//! Values are layered, lowest precedence first: built-in defaults, an
//! optional TOML file, `DATAPOND_*` environment variables, command line
//! flags. Clap reads the environment for each flag, so the last two layers
//! arrive together in [`Args`].

use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use clap::Parser;
use datapond_lake::LakeConfig;
use serde::Deserialize;

use crate::error::{DatapondError, DatapondResult};

/// Command line of the `datapond` binary.
#[derive(Debug, Parser, Clone, Default)]
#[command(name = "datapond", about = "Local Data Lake Gen2 emulator", version)]
pub struct Args {
    /// TOML file with default settings
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Directory holding one subdirectory per filesystem
    #[arg(long, env = "DATAPOND_FS_DIR")]
    pub fs_dir: Option<PathBuf>,

    /// Probability in [0, 1] that a mutating request fails with 503
    #[arg(long, env = "DATAPOND_FAILURE_CHANCE")]
    pub failure_chance: Option<f64>,

    /// Listen address
    #[arg(long)]
    pub bind: Option<String>,

    #[arg(long, env = "DATAPOND_PORT")]
    pub port: Option<u16>,

    /// Request worker threads
    #[arg(long)]
    pub workers: Option<usize>,
}

/// Settings read from `--config`; every key is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct FileConfig {
    fs_dir: Option<PathBuf>,
    failure_chance: Option<f64>,
    bind: Option<String>,
    port: Option<u16>,
    workers: Option<usize>,
}

/// Resolved runtime configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct DatapondConfig {
    pub fs_dir: PathBuf,
    pub failure_chance: f64,
    pub bind: String,
    pub port: u16,
    pub workers: usize,
}

impl Default for DatapondConfig {
    fn default() -> Self {
        Self {
            fs_dir: PathBuf::from("./filesystems"),
            failure_chance: 0.0,
            bind: "0.0.0.0".into(),
            port: 8000,
            workers: 4,
        }
    }
}

impl DatapondConfig {
    /// Parse the process command line and environment.
    pub fn from_cli() -> DatapondResult<Self> {
        Self::resolve(&Args::try_parse()?)
    }

    /// Apply the config file named in `args`, then `args` itself.
    pub fn resolve(args: &Args) -> DatapondResult<Self> {
        let mut cfg = Self::default();
        if let Some(path) = &args.config {
            cfg.apply(load_file(path)?);
        }
        cfg.apply(FileConfig {
            fs_dir: args.fs_dir.clone(),
            failure_chance: args.failure_chance,
            bind: args.bind.clone(),
            port: args.port,
            workers: args.workers,
        });
        cfg.validate()?;
        Ok(cfg)
    }

    fn apply(&mut self, layer: FileConfig) {
        if let Some(v) = layer.fs_dir {
            self.fs_dir = v;
        }
        if let Some(v) = layer.failure_chance {
            self.failure_chance = v;
        }
        if let Some(v) = layer.bind {
            self.bind = v;
        }
        if let Some(v) = layer.port {
            self.port = v;
        }
        if let Some(v) = layer.workers {
            self.workers = v;
        }
    }

    pub fn validate(&self) -> DatapondResult<()> {
        if !(0.0..=1.0).contains(&self.failure_chance) {
            return Err(DatapondError::Config(format!(
                "failure chance {} is outside [0, 1]",
                self.failure_chance
            )));
        }
        if self.workers == 0 {
            return Err(DatapondError::Config("workers must be at least 1".into()));
        }
        self.socket_addr()?;
        Ok(())
    }

    /// Address the HTTP server listens on.
    pub fn socket_addr(&self) -> DatapondResult<SocketAddr> {
        let raw = format!("{}:{}", self.bind, self.port);
        raw.parse()
            .map_err(|_| DatapondError::Config(format!("invalid listen address {}", raw)))
    }

    /// Engine settings derived from this configuration.
    pub fn lake_config(&self) -> LakeConfig {
        LakeConfig {
            root: self.fs_dir.clone(),
            failure_chance: self.failure_chance,
            seed: None,
        }
    }
}

fn load_file(path: &Path) -> DatapondResult<FileConfig> {
    let text = fs::read_to_string(path).map_err(|source| DatapondError::ConfigFile {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&text).map_err(|source| DatapondError::ConfigSyntax {
        path: path.to_path_buf(),
        source,
    })
}
