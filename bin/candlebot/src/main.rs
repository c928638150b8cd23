mod replay;

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tracing::info;
use tracing_subscriber::EnvFilter;

use common::{Config, HostServices};
use engine::{event_channel, Session, StrategyRuntime};
use paper::PaperHost;
use portfolio::{PairsTrading, Rebalancer};
use strategy::{StrategyFileConfig, StrategyRegistry};

#[tokio::main]
async fn main() -> Result<()> {
    // ── Logging ──────────────────────────────────────────────────────────────
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // ── Config ────────────────────────────────────────────────────────────────
    let cfg = Config::from_env().context("reading environment configuration")?;
    let file = StrategyFileConfig::load(&cfg.strategy_config_path)
        .with_context(|| format!("loading strategy config '{}'", cfg.strategy_config_path))?;
    info!(path = %cfg.strategy_config_path, "CandleBot starting");

    // ── Paper host and session ────────────────────────────────────────────────
    let (host_tx, host_rx) = event_channel();
    let host = Arc::new(PaperHost::new(
        host_tx,
        cfg.paper_initial_cash,
        cfg.paper_slippage_bps,
    ));
    let (mut session, handle) = Session::new(host.clone(), host_rx);

    // ── Participants ──────────────────────────────────────────────────────────
    let registry = StrategyRegistry::from_config(&file).context("building strategies")?;
    for strategy in registry.build_all()? {
        session.add(StrategyRuntime::new(strategy, host.clone()));
    }
    for rebalancer in file.rebalancers {
        let name = rebalancer.name.clone();
        session.add(
            Rebalancer::from_config(rebalancer, host.clone())
                .with_context(|| format!("building rebalancer '{name}'"))?,
        );
    }
    for pairs in file.pairs {
        let name = pairs.name.clone();
        session.add(
            PairsTrading::new(pairs, host.clone()).with_context(|| format!("building pairs trade '{name}'"))?,
        );
    }
    if session.is_empty() {
        bail!("no strategies configured in '{}'", cfg.strategy_config_path);
    }
    info!(participants = session.len(), "Session configured");

    // ── Run ───────────────────────────────────────────────────────────────────
    let task = tokio::spawn(session.run());
    let replayed = tokio::select! {
        sent = replay::replay(&cfg.candle_input, &handle) => sent.map(Some),
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received");
            Ok(None)
        }
    };
    handle.stop();
    task.await.context("session task failed")?;
    if let Some(sent) = replayed? {
        info!(events = sent, "Replay finished");
    }

    // ── Summary ───────────────────────────────────────────────────────────────
    for status in handle.status().await {
        info!(
            name = %status.name,
            kind = %status.kind,
            state = ?status.state,
            holdings = ?status.holdings,
            error = ?status.last_error,
            "Final status"
        );
    }
    info!(cash = host.cash(), value = ?host.portfolio_value(), "Paper account");
    Ok(())
}
