use clap::Parser;
use libnetting::config::NettingConfig;
use log::*;
use netting_cli::config::{CliCommand, Config, GlobalOptions};
use netting_cli::scenario::{self, Party, Scenario};
use std::path::PathBuf;

#[tokio::main]
async fn main() {
    env_logger::init();
    let config: Config = Config::parse();
    let (global_options, command) = config.to_parts();

    let result = match command {
        CliCommand::Simulate { scenario } => simulate(scenario, global_options).await,
        CliCommand::DefaultConfig => print_default_config(),
    };

    if let Err(err) = result {
        eprintln!("** Error ** \n {err}");
        std::process::exit(1);
    }
}

async fn simulate(path: PathBuf, options: GlobalOptions) -> Result<(), anyhow::Error> {
    let config = options.netting_config()?;
    let scenario = Scenario::load(&path)?;
    info!("Loaded {} steps from {}", scenario.steps.len(), path.display());
    let report = scenario::run(&scenario, config).await?;
    report.steps_table().printstd();
    println!();
    println!("Channel {} is {}", report.record.channel_address(), report.record.state());
    report.record_table().printstd();
    if let (Some(alice), Some(bob)) = (report.netted(Party::Alice), report.netted(Party::Bob)) {
        println!("Final balances: alice {alice}, bob {bob}");
    }
    Ok(())
}

fn print_default_config() -> Result<(), anyhow::Error> {
    let yaml = serde_yml::to_string(&NettingConfig::default())?;
    println!("{yaml}");
    Ok(())
}
