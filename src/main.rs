use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use flashsettle::adapter::cli::{Cli, Commands, KeygenArgs};
use flashsettle::adapter::groth16::{Groth16Verifier, SettlementProver};
use flashsettle::adapter::status::{StatusConfig, StatusWriter};
use flashsettle::application::lifecycle::{Collaborators, MarketController};
use flashsettle::infrastructure::config::settings::Config;
use tokio::signal;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    let config = Config::load(&cli.config)
        .with_context(|| format!("failed to load config from {}", cli.config.display()))?;
    config.logging.init();

    match cli.command {
        Commands::Run => run(config).await,
        Commands::CheckConfig => {
            println!("{}: ok", cli.config.display());
            Ok(())
        }
        Commands::Keygen(args) => keygen(&config, &args),
    }
}

async fn run(config: Config) -> anyhow::Result<()> {
    info!("flashsettle starting");
    let verifier = Groth16Verifier::from_config(&config.resolution)
        .context("failed to set up proof verifier")?;
    if config.resolution.verifying_key_path.is_none() {
        warn!(
            seed = config.resolution.development_seed,
            "No verifying key configured, using development setup"
        );
    }
    let controller = MarketController::start(&config, Collaborators::new(Arc::new(verifier)));

    let writer = config
        .engine
        .status_file
        .clone()
        .map(|path| StatusWriter::new(path, StatusConfig::from(&config)));
    let mut ticker = tokio::time::interval(config.engine.status_interval());

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Some(writer) = &writer {
                    writer.update(controller.status());
                    if let Err(e) = writer.write() {
                        error!(
                            path = %writer.path().display(),
                            error = %e,
                            "Failed to write status file"
                        );
                    }
                }
            }
            _ = signal::ctrl_c() => {
                info!("Shutdown signal received");
                break;
            }
        }
    }

    controller.shutdown();
    info!("flashsettle stopped");
    Ok(())
}

fn keygen(config: &Config, args: &KeygenArgs) -> anyhow::Result<()> {
    let seed = args.seed.unwrap_or(config.resolution.development_seed);
    let prover = SettlementProver::development(seed).context("key setup failed")?;
    std::fs::write(&args.out, prover.verifying_key_hex()?)
        .with_context(|| format!("failed to write {}", args.out.display()))?;
    info!(seed, path = %args.out.display(), "Wrote verifying key");
    Ok(())
}
