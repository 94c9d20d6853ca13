//! Pure trigger/extraction logic for the Pair Discovery Pipeline, isolated
//! from RPC/WSS plumbing so it is unit-testable without any network I/O.
//! Ported from `new_pair_scanner.py::process_new_pool`.

use crate::types::{PoolCandidate, TokenId, WalletId};
use std::str::FromStr;

/// SPL Token program; the log subscription mentions this program.
pub const TOKEN_PROGRAM: &str = "TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA";
/// Raydium Liquidity Pool V4 program id.
pub const RAYDIUM_LP_V4: &str = "675kPX9MHTjS2zt1qfr1NYHuzeLXfQM9H24wFSUt1Mp8";
pub const SOL_MINT: &str = "So11111111111111111111111111111111111111112";
/// `initialize2` instruction discriminant, preserved exactly as observed in
/// the original scanner.
pub const INITIALIZE2_DISCRIMINANT: [u8; 8] = [0xd8, 0x1c, 0x8e, 0x23, 0x84, 0x96, 0xe9, 0x9b];
pub const TRIGGER_SUBSTRING: &str = "Instruction: InitializeAccount";

/// One top-level instruction decoded to the minimum shape needed to match
/// the Raydium `initialize2` call, independent of which JSON-RPC encoding
/// produced it.
#[derive(Debug, Clone)]
pub struct RawInstruction {
    pub program_id: String,
    pub accounts: Vec<String>,
    pub data_base58: String,
}

/// Cheap pre-triage over raw log lines. The trigger is account
/// initialization, not mint initialization -- the original scanner's
/// observed behavior, preserved as-is.
pub fn logs_contain_trigger(logs: &[String]) -> bool {
    logs.iter().any(|line| line.contains(TRIGGER_SUBSTRING))
}

/// Verify the Raydium LP V4 program is referenced
/// among the transaction's account keys, then scan top-level instructions
/// for an `initialize2` discriminant match, and pull the two mints at
/// `accounts[8]`/`accounts[9]` of the matching instruction. Returns the
/// non-SOL mint as a new [`PoolCandidate`], or `None` if nothing matches.
pub fn extract_pool_candidate(
    signature: &str,
    slot: u64,
    timestamp: u64,
    fee_payer: &str,
    account_keys: &[String],
    instructions: &[RawInstruction],
) -> Option<PoolCandidate> {
    if !account_keys.iter().any(|k| k == RAYDIUM_LP_V4) {
        return None;
    }

    for ix in instructions {
        if ix.program_id != RAYDIUM_LP_V4 {
            continue;
        }
        let Ok(data) = bs58::decode(&ix.data_base58).into_vec() else {
            continue;
        };
        if !data.starts_with(&INITIALIZE2_DISCRIMINANT) {
            continue;
        }
        if ix.accounts.len() <= 9 {
            continue;
        }

        let token0 = &ix.accounts[8];
        let token1 = &ix.accounts[9];
        let new_mint = if token0 == SOL_MINT {
            token1
        } else if token1 == SOL_MINT {
            token0
        } else {
            continue;
        };

        let Ok(token_id) = TokenId::from_str(new_mint) else { continue };
        let Ok(creator) = WalletId::from_str(fee_payer) else { continue };
        return Some(PoolCandidate {
            token_id,
            creator,
            slot,
            timestamp,
            signature: signature.to_string(),
        });
    }
    None
}
