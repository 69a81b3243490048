//! LP / Liquidity Monitor (§4.D) — a per-token time-bounded session that
//! accumulates on-chain events and derives stability signals consumed by
//! the gate and the exit engine.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// Monitoring window before a session becomes eligible for eviction at
/// 2x this duration (§3, §4.D).
pub const MONITORING_DURATION: Duration = Duration::from_secs(120);

/// Poll cadence for `run_full_cycle` (§4.D).
const FULL_CYCLE_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// One liquidity/price observation, strictly ordered by insertion (§3
/// invariant: snapshots are append-only and time-ordered).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub ts: DateTime<Utc>,
    pub liquidity_usd: f64,
    pub price_usd: f64,
    pub volume_24h_usd: Option<f64>,
}

/// Per-wallet buy/sell volume tallies within a session.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WalletVolume {
    pub buy_usd: f64,
    pub sell_usd: f64,
    pub tx_count: u64,
}

/// Structural LP-event counters (§3).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LpCounters {
    pub lp_withdrawals: u64,
    pub lp_mint_events: u64,
    pub lp_authority_changes: u64,
    pub lp_supply_changes: u64,
    pub deployer_lp_transfers: u64,
}

/// A per-token monitoring session. Exclusively owned by the monitor;
/// callers only ever get read-only snapshots via `evaluate`/`snapshot`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub token_address: String,
    pub started_at: DateTime<Utc>,
    pub initial_liquidity_usd: f64,
    pub snapshots: Vec<Snapshot>,
    pub volume_by_wallet: std::collections::HashMap<String, WalletVolume>,
    pub counters: LpCounters,
    pub is_active: bool,
    pub deployer_wallet: Option<String>,
}

/// Derived stability signals (§4.D evaluator).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationResult {
    pub liquidity_drop_percent: f64,
    pub dominant_buyer_percent: f64,
    pub lp_withdrawal_detected: bool,
    pub lp_mint_event_detected: bool,
    pub lp_authority_changed: bool,
    pub lp_supply_increased: bool,
    pub deployer_lp_transfer: bool,
    pub stable: bool,
}

impl EvaluationResult {
    fn structural_flags_clear(&self) -> bool {
        !(self.lp_withdrawal_detected
            || self.lp_mint_event_detected
            || self.lp_authority_changed
            || self.lp_supply_increased
            || self.deployer_lp_transfer)
    }
}

/// Options for `start` — currently just the owning deployer, kept as a
/// struct so future fields don't change the call signature.
#[derive(Debug, Clone, Default)]
pub struct StartOptions {
    pub deployer_wallet: Option<String>,
}

/// Process-wide `token_address -> Session` map with per-session
/// serialized mutation (§4.D concurrency note: one owner advancing
/// state, readers take point-in-time snapshots).
pub struct LiquidityMonitor {
    sessions: Arc<DashMap<String, Arc<Mutex<Session>>>>,
    stable_drop_threshold_pct: f64,
    stable_dominant_buyer_threshold_pct: f64,
}

impl LiquidityMonitor {
    pub fn new(stable_drop_threshold_pct: f64, stable_dominant_buyer_threshold_pct: f64) -> Self {
        Self {
            sessions: Arc::new(DashMap::new()),
            stable_drop_threshold_pct,
            stable_dominant_buyer_threshold_pct,
        }
    }

    pub fn start(&self, token: &str, initial_liquidity_usd: f64, initial_price_usd: f64, opts: StartOptions) -> Result<()> {
        if self.sessions.contains_key(token) {
            return Err(Error::SessionAlreadyActive(token.to_string()));
        }
        let now = Utc::now();
        let session = Session {
            token_address: token.to_string(),
            started_at: now,
            initial_liquidity_usd,
            snapshots: vec![Snapshot {
                ts: now,
                liquidity_usd: initial_liquidity_usd,
                price_usd: initial_price_usd,
                volume_24h_usd: None,
            }],
            volume_by_wallet: std::collections::HashMap::new(),
            counters: LpCounters::default(),
            is_active: true,
            deployer_wallet: opts.deployer_wallet,
        };
        self.sessions.insert(token.to_string(), Arc::new(Mutex::new(session)));
        debug!(token_address = token, "monitor session started");
        Ok(())
    }

    fn get(&self, token: &str) -> Result<Arc<Mutex<Session>>> {
        self.sessions
            .get(token)
            .map(|e| e.value().clone())
            .ok_or_else(|| Error::SessionNotFound(token.to_string()))
    }

    pub async fn add_snapshot(
        &self,
        token: &str,
        liquidity_usd: f64,
        price_usd: f64,
        volume_24h_usd: Option<f64>,
    ) -> Result<()> {
        let handle = self.get(token)?;
        let mut session = handle.lock().await;
        session.snapshots.push(Snapshot {
            ts: Utc::now(),
            liquidity_usd,
            price_usd,
            volume_24h_usd,
        });
        Ok(())
    }

    pub async fn record_transaction(&self, token: &str, wallet: &str, is_buy: bool, usd: f64) -> Result<()> {
        let handle = self.get(token)?;
        let mut session = handle.lock().await;
        let entry = session.volume_by_wallet.entry(wallet.to_string()).or_default();
        if is_buy {
            entry.buy_usd += usd;
        } else {
            entry.sell_usd += usd;
        }
        entry.tx_count += 1;
        Ok(())
    }

    pub async fn record_lp_withdrawal(&self, token: &str) -> Result<()> {
        self.bump_counter(token, |c| c.lp_withdrawals += 1).await
    }

    pub async fn record_lp_mint(&self, token: &str) -> Result<()> {
        self.bump_counter(token, |c| c.lp_mint_events += 1).await
    }

    pub async fn record_lp_authority(&self, token: &str) -> Result<()> {
        self.bump_counter(token, |c| c.lp_authority_changes += 1).await
    }

    pub async fn record_lp_supply(&self, token: &str) -> Result<()> {
        self.bump_counter(token, |c| c.lp_supply_changes += 1).await
    }

    pub async fn record_deployer_lp_transfer(&self, token: &str) -> Result<()> {
        self.bump_counter(token, |c| c.deployer_lp_transfers += 1).await
    }

    async fn bump_counter(&self, token: &str, f: impl FnOnce(&mut LpCounters)) -> Result<()> {
        let handle = self.get(token)?;
        let mut session = handle.lock().await;
        f(&mut session.counters);
        Ok(())
    }

    pub fn stop(&self, token: &str) {
        self.sessions.remove(token);
        debug!(token_address = token, "monitor session stopped");
    }

    pub fn is_monitored(&self, token: &str) -> bool {
        self.sessions.contains_key(token)
    }

    pub async fn evaluate(&self, token: &str) -> Result<EvaluationResult> {
        let handle = self.get(token)?;
        let session = handle.lock().await;
        Ok(Self::evaluate_session(&session, self.stable_drop_threshold_pct, self.stable_dominant_buyer_threshold_pct))
    }

    fn evaluate_session(session: &Session, drop_threshold: f64, dominant_threshold: f64) -> EvaluationResult {
        let current_liquidity = session
            .snapshots
            .last()
            .map(|s| s.liquidity_usd)
            .unwrap_or(session.initial_liquidity_usd);

        let liquidity_drop_percent = if session.initial_liquidity_usd > 0.0 {
            ((session.initial_liquidity_usd - current_liquidity) / session.initial_liquidity_usd * 100.0).max(0.0)
        } else {
            0.0
        };

        let total_buy: f64 = session.volume_by_wallet.values().map(|w| w.buy_usd).sum();
        let max_single_buy = session
            .volume_by_wallet
            .values()
            .map(|w| w.buy_usd)
            .fold(0.0_f64, f64::max);
        let dominant_buyer_percent = if total_buy > 0.0 {
            (max_single_buy / total_buy) * 100.0
        } else {
            0.0
        };

        let mut result = EvaluationResult {
            liquidity_drop_percent,
            dominant_buyer_percent,
            lp_withdrawal_detected: session.counters.lp_withdrawals > 0,
            lp_mint_event_detected: session.counters.lp_mint_events > 0,
            lp_authority_changed: session.counters.lp_authority_changes > 0,
            lp_supply_increased: session.counters.lp_supply_changes > 0,
            deployer_lp_transfer: session.counters.deployer_lp_transfers > 0,
            stable: false,
        };

        result.stable = liquidity_drop_percent <= drop_threshold
            && dominant_buyer_percent <= dominant_threshold
            && result.structural_flags_clear();

        result
    }

    /// Drive a full 2-minute monitoring cycle of 10s polls, fetching the
    /// next snapshot through `on_update` each tick and exiting early the
    /// first time `evaluate` reports the session is no longer stable
    /// (§4.D `run_full_cycle`). Starts the session if one isn't already
    /// active for `token`.
    pub async fn run_full_cycle<F, Fut>(
        &self,
        token: &str,
        initial_liquidity_usd: f64,
        initial_price_usd: f64,
        mut on_update: F,
    ) -> Result<EvaluationResult>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<(f64, f64, Option<f64>)>>,
    {
        if !self.is_monitored(token) {
            self.start(token, initial_liquidity_usd, initial_price_usd, StartOptions::default())?;
        }

        let polls = MONITORING_DURATION.as_secs() / FULL_CYCLE_POLL_INTERVAL.as_secs();
        let mut last_eval = self.evaluate(token).await?;

        for _ in 0..polls {
            tokio::time::sleep(FULL_CYCLE_POLL_INTERVAL).await;
            let (liquidity_usd, price_usd, volume_24h_usd) = on_update().await?;
            self.add_snapshot(token, liquidity_usd, price_usd, volume_24h_usd).await?;
            last_eval = self.evaluate(token).await?;
            if !last_eval.stable {
                return Ok(last_eval);
            }
        }

        Ok(last_eval)
    }

    /// Single-snapshot comparison against an expected liquidity figure
    /// (§4.D `quick_check`).
    pub async fn quick_check(&self, token: &str, expected_liquidity_usd: f64, tolerance_pct: f64) -> Result<bool> {
        let handle = self.get(token)?;
        let session = handle.lock().await;
        let current = session
            .snapshots
            .last()
            .map(|s| s.liquidity_usd)
            .unwrap_or(session.initial_liquidity_usd);
        if expected_liquidity_usd <= 0.0 {
            return Ok(true);
        }
        let drift_pct = ((current - expected_liquidity_usd).abs() / expected_liquidity_usd) * 100.0;
        Ok(drift_pct <= tolerance_pct)
    }

    /// Evict sessions older than `2 x MONITORING_DURATION` (§4.D
    /// cleanup, run every 5 minutes by the embedding application).
    pub async fn cleanup(&self) {
        let now = Utc::now();
        let mut stale = Vec::new();
        for entry in self.sessions.iter() {
            let session = entry.value().lock().await;
            let age = now.signed_duration_since(session.started_at);
            if age.num_seconds() as u64 >= MONITORING_DURATION.as_secs() * 2 {
                stale.push(entry.key().clone());
            }
        }
        for token in stale {
            warn!(token_address = %token, "evicting stale monitor session");
            self.sessions.remove(&token);
        }
    }

    pub fn active_session_count(&self) -> usize {
        self.sessions.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_start_then_duplicate_fails() {
        let monitor = LiquidityMonitor::new(30.0, 70.0);
        monitor.start("tok1", 10_000.0, 1.0, StartOptions::default()).unwrap();
        assert!(monitor.start("tok1", 10_000.0, 1.0, StartOptions::default()).is_err());
    }

    #[tokio::test]
    async fn test_snapshots_ordered_and_first_matches_start() {
        let monitor = LiquidityMonitor::new(30.0, 70.0);
        monitor.start("tok1", 10_000.0, 1.0, StartOptions::default()).unwrap();
        monitor.add_snapshot("tok1", 9_000.0, 0.9, None).await.unwrap();
        monitor.add_snapshot("tok1", 8_000.0, 0.8, None).await.unwrap();

        let handle = monitor.get("tok1").unwrap();
        let session = handle.lock().await;
        assert_eq!(session.snapshots.len(), 3);
        assert_eq!(session.snapshots[0].ts, session.started_at);
        for w in session.snapshots.windows(2) {
            assert!(w[0].ts <= w[1].ts);
        }
    }

    #[tokio::test]
    async fn test_evaluate_stable_for_small_drop() {
        let monitor = LiquidityMonitor::new(30.0, 70.0);
        monitor.start("tok1", 10_000.0, 1.0, StartOptions::default()).unwrap();
        monitor.add_snapshot("tok1", 9_500.0, 1.0, None).await.unwrap();
        let eval = monitor.evaluate("tok1").await.unwrap();
        assert!(eval.stable);
    }

    #[tokio::test]
    async fn test_evaluate_unstable_for_large_drop() {
        let monitor = LiquidityMonitor::new(30.0, 70.0);
        monitor.start("tok1", 10_000.0, 1.0, StartOptions::default()).unwrap();
        monitor.add_snapshot("tok1", 4_000.0, 1.0, None).await.unwrap();
        let eval = monitor.evaluate("tok1").await.unwrap();
        assert!(!eval.stable);
        assert_eq!(eval.liquidity_drop_percent, 60.0);
    }

    #[tokio::test]
    async fn test_lp_withdrawal_makes_session_unstable() {
        let monitor = LiquidityMonitor::new(30.0, 70.0);
        monitor.start("tok1", 10_000.0, 1.0, StartOptions::default()).unwrap();
        monitor.record_lp_withdrawal("tok1").await.unwrap();
        let eval = monitor.evaluate("tok1").await.unwrap();
        assert!(!eval.stable);
        assert!(eval.lp_withdrawal_detected);
    }

    #[tokio::test]
    async fn test_stop_removes_session() {
        let monitor = LiquidityMonitor::new(30.0, 70.0);
        monitor.start("tok1", 10_000.0, 1.0, StartOptions::default()).unwrap();
        monitor.stop("tok1");
        assert!(!monitor.is_monitored("tok1"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_full_cycle_exits_early_when_unstable() {
        use std::sync::atomic::{AtomicU32, Ordering};

        let monitor = LiquidityMonitor::new(30.0, 70.0);
        let tick = AtomicU32::new(0);
        let eval = monitor
            .run_full_cycle("tok1", 10_000.0, 1.0, || {
                let n = tick.fetch_add(1, Ordering::SeqCst);
                async move { if n == 0 { Ok((9_500.0, 1.0, None)) } else { Ok((1_000.0, 1.0, None)) } }
            })
            .await
            .unwrap();

        assert!(!eval.stable);
        assert_eq!(eval.liquidity_drop_percent, 90.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_full_cycle_runs_to_completion_when_stable() {
        let monitor = LiquidityMonitor::new(30.0, 70.0);
        let eval = monitor
            .run_full_cycle("tok1", 10_000.0, 1.0, || async { Ok((9_800.0, 1.0, None)) })
            .await
            .unwrap();

        assert!(eval.stable);
        let handle = monitor.get("tok1").unwrap();
        let session = handle.lock().await;
        assert_eq!(session.snapshots.len(), 13);
    }

    #[tokio::test]
    async fn test_dominant_buyer_percent() {
        let monitor = LiquidityMonitor::new(30.0, 70.0);
        monitor.start("tok1", 10_000.0, 1.0, StartOptions::default()).unwrap();
        monitor.record_transaction("tok1", "whale", true, 900.0).await.unwrap();
        monitor.record_transaction("tok1", "minnow", true, 100.0).await.unwrap();
        let eval = monitor.evaluate("tok1").await.unwrap();
        assert_eq!(eval.dominant_buyer_percent, 90.0);
        assert!(!eval.stable);
    }
}
