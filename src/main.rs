//! Application entry: loads configuration, starts the `Engine`, and runs
//! until interrupted, liquidating every open position on shutdown.

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use snipe_engine::config::{Config, SniperMode};
use snipe_engine::engine::Engine;

#[derive(Parser, Debug)]
#[command(author, version, about = "Actor-per-token sniper/trading engine")]
struct Cli {
    /// Override the configured run mode (sim or real).
    #[arg(long)]
    mode: Option<String>,
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let mut cfg = Config::load();
    if let Some(mode) = cli.mode.as_deref() {
        match mode.to_lowercase().as_str() {
            "sim" => cfg.mode = SniperMode::Sim,
            "real" => cfg.mode = SniperMode::Real,
            other => anyhow::bail!("unknown --mode {other}, expected sim or real"),
        }
    }
    cfg.validate().map_err(|e| anyhow::anyhow!(e))?;

    info!(mode = ?cfg.effective_mode(), "starting engine");
    let engine = Engine::start(cfg).await?;

    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received, liquidating open positions");
    engine.stop().await;

    Ok(())
}
