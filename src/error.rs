//! Error types for the trading-safety gate

use thiserror::Error;

/// Result type alias using our custom Error
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the gate and exit engine
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),

    // Candidate / Decision errors
    #[error("Invalid candidate: {0}")]
    InvalidCandidate(String),

    #[error("Invalid pubkey: {0}")]
    InvalidPubkey(String),

    // Quote client errors
    #[error("Quote request failed: {0}")]
    Quote(String),

    #[error("Quote request timed out after {0}ms")]
    QuoteTimeout(u64),

    #[error("Quote circuit breaker open, resets in {0}ms")]
    CircuitOpen(u64),

    // RPC errors
    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("RPC timeout after {0}ms")]
    RpcTimeout(u64),

    #[error("No RPC endpoints configured")]
    NoRpcEndpoints,

    #[error("Unknown pool program owner: {0}")]
    UnknownPoolOwner(String),

    #[error("Pool account decode failed: {0}")]
    PoolDecode(String),

    // Tradability probe errors
    #[error("Tradability probe failed: {0}")]
    Tradability(String),

    #[error("Transaction simulation failed: {0}")]
    SimulationFailed(String),

    // LP / liquidity monitor errors
    #[error("Monitor session not found: {0}")]
    SessionNotFound(String),

    #[error("Monitor session already active: {0}")]
    SessionAlreadyActive(String),

    // Rule / gate errors
    #[error("Rule {0} produced no result")]
    RuleIncomplete(String),

    // Position / exit errors
    #[error("Position not found: {0}")]
    PositionNotFound(String),

    #[error("Position persistence failed: {0}")]
    PositionPersistence(String),

    #[error("Safety limit exceeded: {0}")]
    SafetyLimitExceeded(String),

    #[error("Daily loss limit reached: lost {lost}SOL, limit is {limit}SOL")]
    DailyLossLimitReached { lost: f64, limit: f64 },

    #[error("Max position size exceeded: current {current}SOL + buy {buy}SOL > max {max}SOL")]
    MaxPositionExceeded { current: f64, buy: f64, max: f64 },

    // Wallet collaborator errors (signing lives outside this crate)
    #[error("Wallet signer rejected swap: {0}")]
    WalletSigner(String),

    // Store collaborator errors
    #[error("Store error: {0}")]
    Store(String),

    // Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(String),

    // Generic errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl Error {
    /// Transient external failure (§7) — safe to retry or degrade, never
    /// to fail the candidate outright.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Rpc(_)
                | Error::RpcTimeout(_)
                | Error::Quote(_)
                | Error::QuoteTimeout(_)
                | Error::CircuitOpen(_)
        )
    }

    /// Structural violation / safety guard — never retried within an evaluation.
    pub fn is_safety_violation(&self) -> bool {
        matches!(
            self,
            Error::SafetyLimitExceeded(_)
                | Error::DailyLossLimitReached { .. }
                | Error::MaxPositionExceeded { .. }
        )
    }
}

impl From<solana_client::client_error::ClientError> for Error {
    fn from(e: solana_client::client_error::ClientError) -> Self {
        Error::Rpc(e.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Error::QuoteTimeout(0)
        } else {
            Error::Quote(e.to_string())
        }
    }
}
