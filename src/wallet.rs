//! Wallet signing collaborator (§2.6, §4.G step 4). No key material or
//! signing logic lives in this crate — only the interface the Auto-Exit
//! Engine calls against.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwapRequest {
    pub token_address: String,
    pub amount: u64,
    pub direction: SwapDirection,
    pub min_out_amount: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SwapDirection {
    Buy,
    Sell,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwapReceipt {
    pub signature: String,
    pub out_amount: u64,
    pub executed_price_usd: f64,
}

#[async_trait]
pub trait WalletSigner: Send + Sync {
    async fn sign_and_send_swap(&self, request: SwapRequest) -> Result<SwapReceipt>;
}
