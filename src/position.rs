//! Position tracking (§3 Position, §4.G Auto-Exit Engine), adapted from
//! the teacher's position manager: open/close bookkeeping plus daily
//! safety-limit enforcement.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PositionStatus {
    Open,
    Closed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub id: String,
    pub token_address: String,
    pub amount: u64,
    pub entry_price_usd: f64,
    pub entry_value_sol: f64,
    #[serde(skip)]
    pub current_price_usd: f64,
    pub status: PositionStatus,
    pub profit_loss_percent: Option<f64>,
    pub exit_reason: Option<String>,
    pub opened_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
}

impl Position {
    pub fn new(token_address: String, amount: u64, entry_price_usd: f64, entry_value_sol: f64) -> Self {
        Position {
            id: Uuid::new_v4().to_string(),
            token_address,
            amount,
            entry_price_usd,
            entry_value_sol,
            current_price_usd: entry_price_usd,
            status: PositionStatus::Open,
            profit_loss_percent: Some(0.0),
            exit_reason: None,
            opened_at: Utc::now(),
            closed_at: None,
        }
    }

    /// `(current/entry - 1) x 100` (§3).
    pub fn compute_pnl_percent(&self) -> f64 {
        if self.entry_price_usd <= 0.0 {
            return 0.0;
        }
        (self.current_price_usd / self.entry_price_usd - 1.0) * 100.0
    }

    pub fn current_value_usd(&self) -> f64 {
        self.amount as f64 * self.current_price_usd
    }

    pub fn is_profitable(&self) -> bool {
        self.compute_pnl_percent() > 0.0
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DailyStats {
    pub total_trades: u32,
    pub winning_trades: u32,
    pub losing_trades: u32,
    pub total_profit_sol: f64,
    pub total_loss_sol: f64,
}

impl DailyStats {
    pub fn net_pnl_sol(&self) -> f64 {
        self.total_profit_sol - self.total_loss_sol
    }

    pub fn win_rate(&self) -> f64 {
        if self.total_trades == 0 {
            0.0
        } else {
            self.winning_trades as f64 / self.total_trades as f64 * 100.0
        }
    }
}

/// Safety guard fields reused verbatim from the teacher's config
/// (§2.3 SPEC_FULL: `safety` is carried unmodified).
#[derive(Debug, Clone, Copy)]
pub struct SafetyLimits {
    pub max_position_sol: f64,
    pub daily_loss_limit_sol: f64,
}

pub struct PositionManager {
    positions: Arc<RwLock<HashMap<String, Position>>>,
    daily_stats: Arc<RwLock<DailyStats>>,
    limits: SafetyLimits,
}

impl PositionManager {
    pub fn new(limits: SafetyLimits) -> Self {
        Self {
            positions: Arc::new(RwLock::new(HashMap::new())),
            daily_stats: Arc::new(RwLock::new(DailyStats::default())),
            limits,
        }
    }

    pub async fn open_position(
        &self,
        token_address: String,
        amount: u64,
        entry_price_usd: f64,
        entry_value_sol: f64,
    ) -> Result<Position> {
        let stats = self.daily_stats.read().await;
        if stats.net_pnl_sol() <= -self.limits.daily_loss_limit_sol {
            return Err(Error::DailyLossLimitReached {
                lost: -stats.net_pnl_sol(),
                limit: self.limits.daily_loss_limit_sol,
            });
        }
        drop(stats);

        let positions = self.positions.read().await;
        let current_total: f64 = positions
            .values()
            .filter(|p| p.status == PositionStatus::Open)
            .map(|p| p.entry_value_sol)
            .sum();
        if current_total + entry_value_sol > self.limits.max_position_sol {
            return Err(Error::MaxPositionExceeded {
                current: current_total,
                buy: entry_value_sol,
                max: self.limits.max_position_sol,
            });
        }
        drop(positions);

        let position = Position::new(token_address, amount, entry_price_usd, entry_value_sol);
        self.positions.write().await.insert(position.id.clone(), position.clone());
        Ok(position)
    }

    pub async fn update_price(&self, id: &str, current_price_usd: f64) -> Result<()> {
        let mut positions = self.positions.write().await;
        let position = positions.get_mut(id).ok_or_else(|| Error::PositionNotFound(id.to_string()))?;
        position.current_price_usd = current_price_usd;
        position.profit_loss_percent = Some(position.compute_pnl_percent());
        Ok(())
    }

    pub async fn close_position(&self, id: &str, exit_price_usd: f64, exit_reason: &str) -> Result<Position> {
        let mut positions = self.positions.write().await;
        let position = positions.get_mut(id).ok_or_else(|| Error::PositionNotFound(id.to_string()))?;

        position.current_price_usd = exit_price_usd;
        let pnl_percent = position.compute_pnl_percent();
        position.profit_loss_percent = Some(pnl_percent);
        position.status = PositionStatus::Closed;
        position.exit_reason = Some(exit_reason.to_string());
        position.closed_at = Some(Utc::now());

        let closed = position.clone();
        drop(positions);

        let mut stats = self.daily_stats.write().await;
        stats.total_trades += 1;
        let pnl_sol = closed.entry_value_sol * (pnl_percent / 100.0);
        if pnl_sol >= 0.0 {
            stats.winning_trades += 1;
            stats.total_profit_sol += pnl_sol;
        } else {
            stats.losing_trades += 1;
            stats.total_loss_sol += pnl_sol.abs();
        }

        Ok(closed)
    }

    pub async fn get_position(&self, id: &str) -> Option<Position> {
        self.positions.read().await.get(id).cloned()
    }

    pub async fn get_open_positions(&self) -> Vec<Position> {
        self.positions
            .read()
            .await
            .values()
            .filter(|p| p.status == PositionStatus::Open)
            .cloned()
            .collect()
    }

    pub async fn total_unrealized_pnl_sol(&self) -> f64 {
        self.positions
            .read()
            .await
            .values()
            .filter(|p| p.status == PositionStatus::Open)
            .map(|p| p.entry_value_sol * (p.compute_pnl_percent() / 100.0))
            .sum()
    }

    pub async fn get_daily_stats(&self) -> DailyStats {
        self.daily_stats.read().await.clone()
    }

    pub async fn reset_daily_stats(&self) {
        *self.daily_stats.write().await = DailyStats::default();
    }

    pub async fn position_count(&self) -> usize {
        self.positions.read().await.len()
    }
}
