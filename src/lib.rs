//! Real-time trading-safety gate and automated exit engine for newly
//! launched Solana tokens (§1). Candidates run through the rule catalog
//! and Gate Orchestrator to produce a `Decision`; open positions are
//! watched and closed by the Auto-Exit Engine.

pub mod activity;
pub mod candidate;
pub mod cli;
pub mod config;
pub mod decision;
pub mod error;
pub mod exit;
pub mod gate;
pub mod monitor;
pub mod position;
pub mod quote;
pub mod rpc;
pub mod rules;
pub mod store;
pub mod tradability;
pub mod wallet;

// Re-export commonly used types
pub use candidate::Candidate;
pub use config::Config;
pub use decision::{Decision, DecisionState};
pub use error::{Error, Result};
pub use gate::GateOrchestrator;
