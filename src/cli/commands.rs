//! CLI command implementations (§3 supplemented CLI): just enough to
//! exercise the Gate Orchestrator and Auto-Exit Engine from a shell.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::info;

use crate::activity::{ActivityEntry, ActivityLogSink};
use crate::candidate::Candidate;
use crate::config::Config;
use crate::error;
use crate::exit::ExitEngine;
use crate::gate::{GateEnrichment, GateOrchestrator};
use crate::monitor::LiquidityMonitor;
use crate::position::{PositionManager, SafetyLimits};
use crate::quote::QuoteClient;
use crate::rpc::RpcClient;
use crate::tradability::TradabilityProbe;
use crate::wallet::{SwapReceipt, SwapRequest, WalletSigner};

/// `tracing`-backed sink for one-shot CLI invocations; a long-running
/// embedder would wire `ChannelActivitySink` instead (§4.H).
struct StdoutActivitySink;

#[async_trait]
impl ActivityLogSink for StdoutActivitySink {
    async fn emit(&self, entry: ActivityEntry) {
        info!(
            token = entry.token_address,
            level = ?entry.level,
            category = ?entry.category,
            "{}",
            entry.message
        );
    }
}

/// No signing key material lives in this crate (§2.6); the CLI has
/// nothing to hand a real wallet, so `scan-exits` always surfaces
/// pending-exit notifications rather than auto-executing.
struct UnconfiguredSigner;

#[async_trait]
impl WalletSigner for UnconfiguredSigner {
    async fn sign_and_send_swap(&self, _request: SwapRequest) -> error::Result<SwapReceipt> {
        Err(error::Error::WalletSigner("no wallet signer configured for this CLI".into()))
    }
}

/// Evaluate a single candidate, read as JSON from `candidate_path`, and
/// print the resulting `Decision` as pretty JSON.
pub async fn evaluate(config: &Config, candidate_path: &Path) -> Result<()> {
    let raw = std::fs::read_to_string(candidate_path)
        .with_context(|| format!("reading candidate file {}", candidate_path.display()))?;
    let candidate: Candidate = serde_json::from_str(&raw).context("parsing candidate JSON")?;

    let quote = Arc::new(QuoteClient::new(config.quote.aggregator_endpoints.clone()));
    let orchestrator = GateOrchestrator::new(quote, config.gate.clone());
    let sink = StdoutActivitySink;

    let decision = orchestrator.evaluate(&candidate, &GateEnrichment::default(), Some(&sink)).await;
    println!("{}", serde_json::to_string_pretty(&decision)?);

    Ok(())
}

/// Run a single Auto-Exit Engine scan against an empty, freshly
/// constructed position book and print any triggered outcomes. A real
/// deployment would share a long-lived `PositionManager` with the
/// trading loop that opens positions; the CLI has none of its own.
pub async fn scan_exits(config: &Config) -> Result<()> {
    let positions = Arc::new(PositionManager::new(SafetyLimits::from(config.safety.clone())));
    let quote = Arc::new(QuoteClient::new(config.quote.aggregator_endpoints.clone()));
    let monitor = Arc::new(LiquidityMonitor::new(
        config.monitor.stable_drop_threshold_pct,
        config.monitor.stable_dominant_buyer_threshold_pct,
    ));
    let rpc = Arc::new(RpcClient::new(config.rpc.endpoints.clone()));
    let tradability = Arc::new(
        TradabilityProbe::new(config.tradability.bonding_curve_base_url.clone()).with_rpc(rpc),
    );
    let wallet: Arc<dyn WalletSigner> = Arc::new(UnconfiguredSigner);
    let sink: Option<Arc<dyn ActivityLogSink>> = Some(Arc::new(StdoutActivitySink));

    let engine = ExitEngine::new(positions.clone(), quote, monitor, tradability, wallet, sink, config.exit.clone());

    info!(open_positions = positions.position_count().await, "running one exit scan");
    let outcomes = engine.scan_once().await;
    if outcomes.is_empty() {
        println!("no exit conditions triggered");
    } else {
        for outcome in outcomes {
            println!(
                "{} {} pnl={:.1}% executed={}",
                outcome.token_address,
                outcome.reason.as_str(),
                outcome.pnl_percent,
                outcome.executed
            );
        }
    }

    Ok(())
}

/// Print the loaded configuration with secrets/full URLs masked.
pub fn show_config(config: &Config) -> Result<()> {
    println!("{}", config.masked_display());
    Ok(())
}
