//! Raydium AMM V4 account decode (§4.B, §6) — a fixed byte-offset parse,
//! not a full borsh/anchor decode, matching the external-interface
//! contract exactly.

use solana_sdk::pubkey::Pubkey;

use crate::error::{Error, Result};

pub const RAYDIUM_AMM_V4_PROGRAM_ID: &str = "675kPX9MHTjS2zt1qfr1NYHuzeLXfQM9H24wFSUt1Mp8";

const OFFSET_STATUS: usize = 0;
const OFFSET_OPEN_TIME: usize = 8;
const OFFSET_BASE_DECIMALS: usize = 24;
const OFFSET_QUOTE_DECIMALS: usize = 25;
const OFFSET_BASE_MINT: usize = 72;
const OFFSET_QUOTE_MINT: usize = 104;
const OFFSET_BASE_VAULT: usize = 136;
const OFFSET_QUOTE_VAULT: usize = 168;
const MIN_ACCOUNT_LEN: usize = OFFSET_QUOTE_VAULT + 32;

/// Statuses that indicate an initialized, tradable pool (§4.C strict
/// on-chain mode: "status bits indicate initialized (1 or 6)").
const INITIALIZED_STATUSES: [u8; 2] = [1, 6];

#[derive(Debug, Clone)]
pub struct RaydiumPool {
    pub status: u8,
    pub open_time: u64,
    pub base_decimals: u8,
    pub quote_decimals: u8,
    pub base_mint: Pubkey,
    pub quote_mint: Pubkey,
    pub base_vault: Pubkey,
    pub quote_vault: Pubkey,
}

impl RaydiumPool {
    pub fn is_initialized(&self) -> bool {
        INITIALIZED_STATUSES.contains(&self.status)
    }
}

/// Decode a Raydium AMM V4 pool account. The account must be owned by
/// the Raydium AMM V4 program; callers are expected to have already
/// checked ownership before calling this (`decode` does not take the
/// owner, only the data, to keep the parse itself pure and testable).
pub fn decode(data: &[u8]) -> Result<RaydiumPool> {
    if data.len() < MIN_ACCOUNT_LEN {
        return Err(Error::PoolDecode(format!(
            "account too short: {} bytes, need at least {}",
            data.len(),
            MIN_ACCOUNT_LEN
        )));
    }

    let status = data[OFFSET_STATUS];
    let open_time = u64::from_le_bytes(data[OFFSET_OPEN_TIME..OFFSET_OPEN_TIME + 8].try_into().unwrap());
    let base_decimals = data[OFFSET_BASE_DECIMALS];
    let quote_decimals = data[OFFSET_QUOTE_DECIMALS];
    let base_mint = Pubkey::try_from(&data[OFFSET_BASE_MINT..OFFSET_BASE_MINT + 32])
        .map_err(|e| Error::PoolDecode(format!("base_mint: {e}")))?;
    let quote_mint = Pubkey::try_from(&data[OFFSET_QUOTE_MINT..OFFSET_QUOTE_MINT + 32])
        .map_err(|e| Error::PoolDecode(format!("quote_mint: {e}")))?;
    let base_vault = Pubkey::try_from(&data[OFFSET_BASE_VAULT..OFFSET_BASE_VAULT + 32])
        .map_err(|e| Error::PoolDecode(format!("base_vault: {e}")))?;
    let quote_vault = Pubkey::try_from(&data[OFFSET_QUOTE_VAULT..OFFSET_QUOTE_VAULT + 32])
        .map_err(|e| Error::PoolDecode(format!("quote_vault: {e}")))?;

    Ok(RaydiumPool {
        status,
        open_time,
        base_decimals,
        quote_decimals,
        base_mint,
        quote_mint,
        base_vault,
        quote_vault,
    })
}

/// Check the owning program id, returning the typed error the spec
/// requires for an unknown pool owner (§4.B).
pub fn check_owner(owner: &Pubkey) -> Result<()> {
    if owner.to_string() == RAYDIUM_AMM_V4_PROGRAM_ID {
        Ok(())
    } else {
        Err(Error::UnknownPoolOwner(owner.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(status: u8, open_time: u64, base_decimals: u8, quote_decimals: u8) -> Vec<u8> {
        let mut buf = vec![0u8; MIN_ACCOUNT_LEN];
        buf[OFFSET_STATUS] = status;
        buf[OFFSET_OPEN_TIME..OFFSET_OPEN_TIME + 8].copy_from_slice(&open_time.to_le_bytes());
        buf[OFFSET_BASE_DECIMALS] = base_decimals;
        buf[OFFSET_QUOTE_DECIMALS] = quote_decimals;
        let base_mint = Pubkey::new_unique();
        let quote_mint = Pubkey::new_unique();
        let base_vault = Pubkey::new_unique();
        let quote_vault = Pubkey::new_unique();
        buf[OFFSET_BASE_MINT..OFFSET_BASE_MINT + 32].copy_from_slice(base_mint.as_ref());
        buf[OFFSET_QUOTE_MINT..OFFSET_QUOTE_MINT + 32].copy_from_slice(quote_mint.as_ref());
        buf[OFFSET_BASE_VAULT..OFFSET_BASE_VAULT + 32].copy_from_slice(base_vault.as_ref());
        buf[OFFSET_QUOTE_VAULT..OFFSET_QUOTE_VAULT + 32].copy_from_slice(quote_vault.as_ref());
        buf
    }

    #[test]
    fn test_decode_round_trips_fields() {
        let buf = encode(1, 123_456, 6, 9);
        let pool = decode(&buf).unwrap();
        assert_eq!(pool.status, 1);
        assert_eq!(pool.open_time, 123_456);
        assert_eq!(pool.base_decimals, 6);
        assert_eq!(pool.quote_decimals, 9);
        assert!(pool.is_initialized());
    }

    #[test]
    fn test_decode_rejects_short_account() {
        let buf = vec![0u8; 10];
        assert!(decode(&buf).is_err());
    }

    #[test]
    fn test_uninitialized_status_not_initialized() {
        let buf = encode(0, 0, 6, 9);
        let pool = decode(&buf).unwrap();
        assert!(!pool.is_initialized());
    }

    #[test]
    fn test_check_owner_rejects_unknown_program() {
        let owner = Pubkey::new_unique();
        assert!(check_owner(&owner).is_err());
    }
}
