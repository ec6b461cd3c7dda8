//! The `pisa` binary: a thin `clap` shell around [`pisa_node::PisaNode`],
//! modeled on `bin/reth`'s own `main.rs` - parse arguments, install the
//! global logger, build a tokio runtime, hand off to the library crate.

use clap::Parser;
use pisa_chain_provider::EthersChainProvider;
use pisa_config::Config;
use pisa_node::{load_secret_key, PisaNode};
use pisa_responder::{FixedStepGasEstimator, LocalWalletSigner};
use pisa_tasks::TaskExecutor;
use pisa_tracing::LogFormat;
use std::path::PathBuf;
use tokio::sync::oneshot;
use tracing::info;

/// A PISA watchtower node.
#[derive(Debug, Parser)]
#[command(name = "pisa", version, about = "PISA watchtower node")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, clap::Subcommand)]
enum Command {
    /// Start the watchtower: block processor, reducer framework and HTTP
    /// ingress surface, running until interrupted.
    Node {
        /// Path to the TOML configuration file.
        #[arg(long, default_value = "pisa.toml")]
        config: PathBuf,

        /// Override the configured log format.
        #[arg(long, value_enum, default_value = "terminal")]
        log_format: CliLogFormat,

        /// `EnvFilter` directives, e.g. "pisa=debug,info". Falls back to
        /// `RUST_LOG`, then `info`, if unset.
        #[arg(long)]
        log_filter: Option<String>,

        /// The tower's own on-chain contract address (§6 "Appointment
        /// digest"), hex-encoded with an optional `0x` prefix.
        #[arg(long)]
        tower_contract: String,
    },
    /// Write a default configuration file to the given path.
    InitConfig {
        #[arg(long, default_value = "pisa.toml")]
        config: PathBuf,
    },
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum CliLogFormat {
    Terminal,
    Json,
}

impl From<CliLogFormat> for LogFormat {
    fn from(value: CliLogFormat) -> Self {
        match value {
            CliLogFormat::Terminal => LogFormat::Terminal,
            CliLogFormat::Json => LogFormat::Json,
        }
    }
}

fn main() -> eyre::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::InitConfig { config } => {
            let contents = Config::default().to_toml_string()?;
            std::fs::write(&config, contents)?;
            println!("wrote default configuration to {}", config.display());
            Ok(())
        }
        Command::Node { config, log_format, log_filter, tower_contract } => {
            pisa_tracing::init(log_format.into(), log_filter.as_deref());
            let runtime = tokio::runtime::Builder::new_multi_thread().enable_all().build()?;
            runtime.block_on(run_node(config, tower_contract))
        }
    }
}

async fn run_node(config_path: PathBuf, tower_contract: String) -> eyre::Result<()> {
    let config = Config::load(&config_path)?;
    info!(path = %config_path.display(), "loaded configuration");

    let tower_contract = tower_contract.trim().trim_start_matches("0x");
    let tower_contract_bytes = hex::decode(tower_contract)?;
    if tower_contract_bytes.len() != 20 {
        eyre::bail!("tower contract address must be 20 bytes, got {}", tower_contract_bytes.len());
    }
    let tower_contract = pisa_primitives::Address::from_slice(&tower_contract_bytes);

    let (responder_key, responder_address) = load_secret_key(&config.responder.signer_key_path)?;
    let (tower_key, tower_address) = load_secret_key(&config.ingress.tower_key_path)?;

    let provider = std::sync::Arc::new(EthersChainProvider::connect(&config.chain.rpc_url).await?);
    let signer = std::sync::Arc::new(LocalWalletSigner::new(responder_key, responder_address));
    let estimator = std::sync::Arc::new(FixedStepGasEstimator::new(alloy_primitives::U256::from(1_000_000_000u64), 20));

    let tasks = TaskExecutor::current();
    let node = PisaNode::build(&config, provider, signer, estimator, tower_key, tower_address, tower_contract, tasks).await?;

    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        info!("received interrupt signal, shutting down");
        let _ = shutdown_tx.send(());
    });

    node.run(shutdown_rx).await?;
    Ok(())
}
