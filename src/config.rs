//! Configuration loading and validation (§2.3). Layered: built-in
//! defaults, then an optional file, then `GATE__`-prefixed environment
//! overrides, matching the teacher's `config` crate + `dotenvy` idiom.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

use crate::candidate::TierFeatures;
use crate::exit::ExitConfig as ExitEngineConfig;
use crate::gate::GateConfig as GateOrchestratorConfig;
use crate::position::SafetyLimits;

/// Main configuration structure.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub rpc: RpcConfig,
    pub quote: QuoteConfig,
    pub tradability: TradabilityConfig,
    pub monitor: MonitorConfig,
    /// Not file/env-driven: `GateConfig`/`ExitConfig` carry ~20 fields
    /// each with their own sensible defaults; embedders override specific
    /// fields programmatically on the loaded `Config` rather than through
    /// the layered file/env source.
    #[serde(skip_deserializing)]
    pub gate: GateConfig,
    #[serde(skip_deserializing)]
    pub exit: ExitConfig,
    pub safety: SafetyConfig,
    #[serde(default)]
    pub tier_features: TierFeaturesConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RpcConfig {
    #[serde(default = "default_rpc_endpoints")]
    pub endpoints: Vec<String>,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct QuoteConfig {
    #[serde(default = "default_aggregator_endpoints")]
    pub aggregator_endpoints: Vec<String>,
    #[serde(default = "default_quote_slippage_bps")]
    pub default_slippage_bps: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TradabilityConfig {
    #[serde(default = "default_bonding_curve_url")]
    pub bonding_curve_base_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MonitorConfig {
    #[serde(default = "default_stable_drop_threshold")]
    pub stable_drop_threshold_pct: f64,
    #[serde(default = "default_stable_dominant_buyer_threshold")]
    pub stable_dominant_buyer_threshold_pct: f64,
}

/// Mirrors `gate::GateConfig` field-for-field so the layered loader can
/// deserialize overrides directly into the orchestrator's own config
/// type without a second copy of its defaults drifting out of sync.
pub type GateConfig = GateOrchestratorConfig;

pub type ExitConfig = ExitEngineConfig;

#[derive(Debug, Clone, Deserialize)]
pub struct SafetyConfig {
    #[serde(default = "default_max_position_sol")]
    pub max_position_sol: f64,
    #[serde(default = "default_daily_loss_limit")]
    pub daily_loss_limit_sol: f64,
}

impl From<SafetyConfig> for SafetyLimits {
    fn from(c: SafetyConfig) -> Self {
        SafetyLimits {
            max_position_sol: c.max_position_sol,
            daily_loss_limit_sol: c.daily_loss_limit_sol,
        }
    }
}

/// The boolean feature map read (never fetched) by the gate off
/// `Candidate.tier_features` (§2.6); this config section only supplies
/// the embedding application's default for candidates that don't set
/// their own.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TierFeaturesConfig {
    #[serde(default)]
    pub advanced_clustering: bool,
    #[serde(default)]
    pub capital_preservation: bool,
}

impl From<TierFeaturesConfig> for TierFeatures {
    fn from(c: TierFeaturesConfig) -> Self {
        TierFeatures {
            advanced_clustering: c.advanced_clustering,
            capital_preservation: c.capital_preservation,
        }
    }
}

fn default_rpc_endpoints() -> Vec<String> {
    vec![std::env::var("RPC_ENDPOINT").unwrap_or_else(|_| "https://api.mainnet-beta.solana.com".into())]
}

fn default_timeout_ms() -> u64 {
    6000
}

fn default_aggregator_endpoints() -> Vec<String> {
    vec!["https://quote-api.jup.ag/v6/quote".into()]
}

fn default_quote_slippage_bps() -> u16 {
    1500
}

fn default_bonding_curve_url() -> String {
    "https://frontend-api.pump.fun".into()
}

fn default_stable_drop_threshold() -> f64 {
    30.0
}

fn default_stable_dominant_buyer_threshold() -> f64 {
    70.0
}

fn default_max_position_sol() -> f64 {
    0.5
}

fn default_daily_loss_limit() -> f64 {
    1.0
}

impl Config {
    /// Load configuration from file and environment variables.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let settings = config::Config::builder()
            .set_default("rpc.endpoints", default_rpc_endpoints())?
            .set_default("rpc.timeout_ms", default_timeout_ms() as i64)?
            .set_default("quote.aggregator_endpoints", default_aggregator_endpoints())?
            .set_default("quote.default_slippage_bps", default_quote_slippage_bps() as i64)?
            .set_default("tradability.bonding_curve_base_url", default_bonding_curve_url())?
            .set_default("monitor.stable_drop_threshold_pct", default_stable_drop_threshold())?
            .set_default(
                "monitor.stable_dominant_buyer_threshold_pct",
                default_stable_dominant_buyer_threshold(),
            )?
            .set_default("safety.max_position_sol", default_max_position_sol())?
            .set_default("safety.daily_loss_limit_sol", default_daily_loss_limit())?
            .add_source(config::File::from(path).required(false))
            .add_source(
                config::Environment::with_prefix("GATE")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to build configuration")?;

        let config: Config = settings
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values.
    fn validate(&self) -> Result<()> {
        if self.rpc.endpoints.is_empty() {
            anyhow::bail!("at least one rpc.endpoints entry is required");
        }
        if self.quote.aggregator_endpoints.is_empty() {
            anyhow::bail!("at least one quote.aggregator_endpoints entry is required");
        }
        let mut seen = std::collections::HashSet::new();
        for endpoint in self.rpc.endpoints.iter().chain(self.quote.aggregator_endpoints.iter()) {
            if !seen.insert(endpoint) {
                anyhow::bail!("duplicate endpoint configured: {endpoint}");
            }
        }

        if self.rpc.timeout_ms == 0 {
            anyhow::bail!("rpc.timeout_ms must be positive");
        }

        if !(0.0..=100.0).contains(&self.gate.cap_ceiling) {
            anyhow::bail!("gate.cap_ceiling must be in [0,100]");
        }
        if self.gate.observation_drift_tolerance_pct < 0.0 {
            anyhow::bail!("gate.observation_drift_tolerance_pct must be non-negative");
        }

        if self.exit.poll_interval_secs == 0 {
            anyhow::bail!("exit.poll_interval_secs must be positive");
        }
        if self.exit.take_profit_target_pct <= 0.0 {
            anyhow::bail!("exit.take_profit_target_pct must be positive");
        }
        if self.exit.stop_loss_limit_pct <= 0.0 || self.exit.stop_loss_limit_pct >= 100.0 {
            anyhow::bail!("exit.stop_loss_limit_pct must be between 0 and 100");
        }

        if self.safety.max_position_sol <= 0.0 {
            anyhow::bail!("safety.max_position_sol must be positive");
        }
        if self.safety.daily_loss_limit_sol <= 0.0 {
            anyhow::bail!("safety.daily_loss_limit_sol must be positive");
        }

        Ok(())
    }

    /// Masked configuration for display (hide secrets / full endpoint URLs).
    pub fn masked_display(&self) -> String {
        format!(
            r#"Configuration:
  RPC:
    endpoints: {:?}
    timeout: {}ms
  Quote:
    aggregator_endpoints: {}
    default_slippage: {}bps
  Tradability:
    bonding_curve_base_url: {}
  Monitor:
    stable_drop_threshold: {}%
    stable_dominant_buyer_threshold: {}%
  Gate:
    cap_ceiling: {}
    high_liquidity_usd: {}
  Exit:
    poll_interval: {}s
    take_profit_target: {}%
    stop_loss_limit: {}%
    auto_execute: {}
  Safety:
    max_position: {} SOL
    daily_loss_limit: {} SOL
"#,
            self.rpc.endpoints.iter().map(|e| mask_url(e)).collect::<Vec<_>>(),
            self.rpc.timeout_ms,
            self.quote.aggregator_endpoints.len(),
            self.quote.default_slippage_bps,
            mask_url(&self.tradability.bonding_curve_base_url),
            self.monitor.stable_drop_threshold_pct,
            self.monitor.stable_dominant_buyer_threshold_pct,
            self.gate.cap_ceiling,
            self.gate.high_liquidity_usd,
            self.exit.poll_interval_secs,
            self.exit.take_profit_target_pct,
            self.exit.stop_loss_limit_pct,
            self.exit.auto_execute,
            self.safety.max_position_sol,
            self.safety.daily_loss_limit_sol,
        )
    }
}

/// Mask URL for display (hide API keys in query params).
fn mask_url(url: &str) -> String {
    if let Some(idx) = url.find('?') {
        format!("{}?***", &url[..idx])
    } else {
        url.to_string()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            rpc: RpcConfig {
                endpoints: default_rpc_endpoints(),
                timeout_ms: default_timeout_ms(),
            },
            quote: QuoteConfig {
                aggregator_endpoints: default_aggregator_endpoints(),
                default_slippage_bps: default_quote_slippage_bps(),
            },
            tradability: TradabilityConfig {
                bonding_curve_base_url: default_bonding_curve_url(),
            },
            monitor: MonitorConfig {
                stable_drop_threshold_pct: default_stable_drop_threshold(),
                stable_dominant_buyer_threshold_pct: default_stable_dominant_buyer_threshold(),
            },
            gate: GateConfig::default(),
            exit: ExitConfig::default(),
            safety: SafetyConfig {
                max_position_sol: default_max_position_sol(),
                daily_loss_limit_sol: default_daily_loss_limit(),
            },
            tier_features: TierFeaturesConfig::default(),
        }
    }
}
