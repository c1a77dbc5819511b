use crate::error::CliError;
use clap::{Parser, Subcommand};
use libnetting::config::NettingConfig;
use std::path::{Path, PathBuf};

/// Netting payment channels.
///
/// Simulates bilateral netting channels with hash-locked transfers and on-chain settlement.
#[derive(Parser, Debug)]
#[command(version, about)]
pub struct Config {
    /// Path to the configuration file. If omitted, the default configuration is used.
    #[arg(long = "config-file", short = 'c', env = "NETTING_CONFIG")]
    pub config_file: Option<PathBuf>,
    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Play a two-party scenario on an in-memory ledger.
    #[command(name = "simulate", alias = "sim")]
    Simulate {
        /// The scenario file (YAML).
        scenario: PathBuf,
    },
    /// Print the default configuration.
    #[command(name = "default-config")]
    DefaultConfig,
}

pub struct GlobalOptions {
    pub config_file: Option<PathBuf>,
}

impl Config {
    pub fn to_parts(self) -> (GlobalOptions, CliCommand) {
        let global = GlobalOptions { config_file: self.config_file };
        (global, self.command)
    }
}

impl GlobalOptions {
    /// The node configuration from `--config-file`, or the default one. Either way it is validated.
    pub fn netting_config(&self) -> Result<NettingConfig, CliError> {
        let config = match &self.config_file {
            Some(path) => load_config_file(path)?,
            None => NettingConfig::default(),
        };
        config.validate()?;
        Ok(config)
    }
}

pub fn load_config_file<P: AsRef<Path>>(path: P) -> Result<NettingConfig, CliError> {
    let file = std::fs::File::open(path)?;
    let reader = std::io::BufReader::new(file);
    let config = serde_yml::from_reader(reader)?;
    Ok(config)
}

pub fn save_config_file<P: AsRef<Path>>(path: P, config: &NettingConfig) -> Result<(), CliError> {
    // Create directory path if required
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let file = std::fs::File::create(path)?;
    let writer = std::io::BufWriter::new(file);
    serde_yml::to_writer(writer, config)?;
    Ok(())
}
