//! Core domain types shared by every subsystem.

use serde::{Deserialize, Serialize};
use solana_sdk::pubkey::Pubkey;
use std::fmt;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

/// Opaque 32-44 char base58 token mint identifier. Immutable; equality is
/// byte-equal (delegated to the wrapped `Pubkey`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TokenId(Pubkey);

impl TokenId {
    pub fn new(pubkey: Pubkey) -> Self {
        Self(pubkey)
    }

    pub fn pubkey(&self) -> Pubkey {
        self.0
    }
}

impl fmt::Display for TokenId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for TokenId {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() < 32 || s.len() > 44 {
            anyhow::bail!("token id must be 32-44 base58 chars, got {}", s.len());
        }
        Ok(Self(Pubkey::from_str(s)?))
    }
}

/// Opaque wallet identifier. Kept distinct from [`TokenId`] at the type
/// level so a set of mints and a set of wallets can never be mixed up, even
/// though both wrap a `Pubkey`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct WalletId(Pubkey);

impl WalletId {
    pub fn new(pubkey: Pubkey) -> Self {
        Self(pubkey)
    }

    pub fn pubkey(&self) -> Pubkey {
        self.0
    }
}

impl fmt::Display for WalletId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for WalletId {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Pubkey::from_str(s)?))
    }
}

/// The process-level run mode, decided once at `Engine::start` and never
/// changed for the lifetime of a gateway/journal pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RunMode {
    Sim,
    Real,
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunMode::Sim => write!(f, "SIM"),
            RunMode::Real => write!(f, "REAL"),
        }
    }
}

/// Per-token state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TokenState {
    Candidate,
    Filtered,
    Admitted,
    Held,
    Selling,
    Sold,
    Rejected,
}

/// A newly observed mint, forwarded by the Pair Discovery Pipeline to the
/// Decision Engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolCandidate {
    pub token_id: TokenId,
    pub creator: WalletId,
    pub slot: u64,
    pub timestamp: u64,
    pub signature: String,
}

/// An open position, exclusively owned by its per-token actor task
///. Invariant: `max_price_seen >= buy_price`,
/// `buy_amount_native > 0`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub token_id: TokenId,
    pub buy_price: f64,
    pub buy_amount_native: f64,
    pub max_price_seen: f64,
    pub creator_wallets: std::collections::BTreeSet<WalletId>,
    pub buy_timestamp: u64,
}

impl Position {
    pub fn new(
        token_id: TokenId,
        buy_price: f64,
        buy_amount_native: f64,
        creator_wallets: std::collections::BTreeSet<WalletId>,
    ) -> Self {
        Self {
            token_id,
            buy_price,
            buy_amount_native,
            max_price_seen: buy_price,
            creator_wallets,
            buy_timestamp: now_secs(),
        }
    }

    /// Update the running high-water mark. Never decreases.
    pub fn observe_price(&mut self, price: f64) {
        if price > self.max_price_seen {
            self.max_price_seen = price;
        }
    }
}

pub fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Validation error for an out-of-range [`EngineParams`] write. The
/// round-trip property requires a rejected write to have no
/// side effects, so setters return this instead of clamping.
#[derive(Debug, Clone, thiserror::Error)]
#[error("parameter {name} out of range: {value} not in {bounds}")]
pub struct ParamError {
    pub name: String,
    pub value: f64,
    pub bounds: &'static str,
}

/// Engine-wide tunable parameters. Single-writer-at-a-time:
/// writers (UI or the Self-Tuning Controller) serialize through
/// `Engine::set_param`; readers snapshot the struct by value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EngineParams {
    pub buy_amount_native: f64,
    pub sell_multiplier: f64,
    pub trailing_stop_fraction: f64,
}

impl Default for EngineParams {
    fn default() -> Self {
        Self {
            buy_amount_native: 0.1,
            sell_multiplier: 2.0,
            trailing_stop_fraction: 0.15,
        }
    }
}

impl EngineParams {
    pub fn validate(&self) -> Result<(), ParamError> {
        Self::check_buy_amount(self.buy_amount_native)?;
        Self::check_sell_multiplier(self.sell_multiplier)?;
        Self::check_trailing_stop(self.trailing_stop_fraction)?;
        Ok(())
    }

    pub fn check_buy_amount(v: f64) -> Result<(), ParamError> {
        if (0.01..=2.0).contains(&v) {
            Ok(())
        } else {
            Err(ParamError { name: "buy_amount_native".into(), value: v, bounds: "[0.01, 2.0]" })
        }
    }

    pub fn check_sell_multiplier(v: f64) -> Result<(), ParamError> {
        if (1.0..=2.5).contains(&v) {
            Ok(())
        } else {
            Err(ParamError { name: "sell_multiplier".into(), value: v, bounds: "[1.0, 2.5]" })
        }
    }

    pub fn check_trailing_stop(v: f64) -> Result<(), ParamError> {
        if v > 0.0 && v < 1.0 {
            Ok(())
        } else {
            Err(ParamError { name: "trailing_stop_fraction".into(), value: v, bounds: "(0, 1)" })
        }
    }

    /// Set a single named parameter by value, rejecting an out-of-range
    /// write without mutating `self`.
    pub fn set_param(&mut self, name: &str, value: f64) -> Result<(), ParamError> {
        match name {
            "buy_amount_native" => {
                Self::check_buy_amount(value)?;
                self.buy_amount_native = value;
            }
            "sell_multiplier" => {
                Self::check_sell_multiplier(value)?;
                self.sell_multiplier = value;
            }
            "trailing_stop_fraction" => {
                Self::check_trailing_stop(value)?;
                self.trailing_stop_fraction = value;
            }
            other => {
                return Err(ParamError {
                    name: other.to_string(),
                    value,
                    bounds: "unknown parameter",
                });
            }
        }
        Ok(())
    }

    pub fn get_param(&self, name: &str) -> Option<f64> {
        match name {
            "buy_amount_native" => Some(self.buy_amount_native),
            "sell_multiplier" => Some(self.sell_multiplier),
            "trailing_stop_fraction" => Some(self.trailing_stop_fraction),
            _ => None,
        }
    }
}

/// Tagged trade-kind, replacing the source's dynamically-typed JSON record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum TradeKind {
    #[serde(rename = "BUY")]
    Buy,
    #[serde(rename = "SELL")]
    Sell,
    #[serde(rename = "BUY_FAILED")]
    BuyFailed { reason: String },
}

/// One append-only journal entry. Never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeRecord {
    #[serde(flatten)]
    pub kind: TradeKind,
    pub token_id: TokenId,
    pub price: f64,
    pub amount_native: f64,
    pub timestamp: u64,
    pub mode: RunMode,
    /// Set only on a `liquidate_all()` forced sell.
    #[serde(default)]
    pub forced: bool,
}

/// Cached safety-oracle + liquidity verdict.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SafetyReport {
    pub is_honeypot: bool,
    pub tax_buy: f64,
    pub tax_sell: f64,
    pub marketcap: f64,
    pub anti_bot: bool,
    pub has_liquidity: bool,
    pub is_sellable: bool,
}

impl SafetyReport {
    /// The conservative all-negative report used whenever any safety check
    /// fails.
    pub fn conservative() -> Self {
        Self {
            is_honeypot: true,
            tax_buy: 1.0,
            tax_sell: 1.0,
            marketcap: f64::MAX,
            anti_bot: true,
            has_liquidity: false,
            is_sellable: false,
        }
    }

    /// Admission rules table. Returns the first violated
    /// rule, in table order, or `None` if the report passes.
    pub fn rejection_reason(&self) -> Option<&'static str> {
        if self.is_honeypot {
            return Some("is_honeypot");
        }
        if self.tax_buy > 0.15 {
            return Some("tax_buy_too_high");
        }
        if self.tax_sell > 0.15 {
            return Some("tax_sell_too_high");
        }
        if self.marketcap > 50_000.0 {
            return Some("marketcap_too_high");
        }
        if self.anti_bot {
            return Some("anti_bot");
        }
        if !self.has_liquidity {
            return Some("no_liquidity");
        }
        if !self.is_sellable {
            return Some("not_sellable");
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixed_pubkey(byte: u8) -> Pubkey {
        let mut b = [0u8; 32];
        b.fill(byte);
        Pubkey::new_from_array(b)
    }

    #[test]
    fn position_max_price_never_decreases() {
        let mut pos = Position::new(TokenId::new(fixed_pubkey(1)), 1.0, 0.1, Default::default());
        pos.observe_price(1.5);
        pos.observe_price(1.2);
        assert_eq!(pos.max_price_seen, 1.5);
        assert!(pos.max_price_seen >= pos.buy_price);
    }

    #[test]
    fn engine_params_reject_without_mutation() {
        let mut params = EngineParams::default();
        let before = params;
        let err = params.set_param("buy_amount_native", 5.0).unwrap_err();
        assert_eq!(err.name, "buy_amount_native");
        assert_eq!(params, before, "rejected write must not mutate state");
    }

    #[test]
    fn engine_params_roundtrip_in_range() {
        let mut params = EngineParams::default();
        params.set_param("sell_multiplier", 1.8).unwrap();
        assert_eq!(params.get_param("sell_multiplier"), Some(1.8));
    }

    #[test]
    fn safety_report_admission_rules() {
        let mut report = SafetyReport {
            is_honeypot: false,
            tax_buy: 0.0,
            tax_sell: 0.0,
            marketcap: 1.0,
            anti_bot: false,
            has_liquidity: true,
            is_sellable: true,
        };
        assert_eq!(report.rejection_reason(), None);

        report.is_honeypot = true;
        assert_eq!(report.rejection_reason(), Some("is_honeypot"));

        report.is_honeypot = false;
        report.marketcap = 60_000.0;
        assert_eq!(report.rejection_reason(), Some("marketcap_too_high"));
    }

    #[test]
    fn conservative_report_rejects() {
        assert!(SafetyReport::conservative().rejection_reason().is_some());
    }
}
