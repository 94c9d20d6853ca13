//! Validation and rate-limiting guards applied ahead of the Decision
//! Engine's admission procedure, adapted from `PremintCandidate`/raw
//! `Pubkey` to [`PoolCandidate`]/[`TokenId`]/[`WalletId`].

use crate::types::PoolCandidate;
use governor::clock::DefaultClock;
use governor::state::keyed::DefaultKeyedStateStore;
use governor::{Quota, RateLimiter};
use solana_sdk::pubkey::Pubkey;
use std::collections::HashSet;
use std::num::NonZeroU32;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Per-mint GCRA quota: `max_per_window` admissions per `window_secs`,
/// replenished steadily rather than in a hard sliding window.
fn mint_quota(max_per_window: u32, window_secs: u64) -> Quota {
    let period = Duration::from_secs(window_secs) / max_per_window;
    Quota::with_period(period)
        .expect("window_secs/max_per_window must be nonzero")
        .allow_burst(NonZeroU32::new(max_per_window).expect("max_per_window must be nonzero"))
}

/// Validation and security checks for candidates and operations.
pub struct SecurityValidator {
    /// Track seen signatures to detect duplicates.
    seen_signatures: Arc<Mutex<HashSet<String>>>,
    /// Rate limiting per mint to prevent spam.
    mint_rate_limiter: RateLimiter<Pubkey, DefaultKeyedStateStore<Pubkey>, DefaultClock>,
    /// Last seen slot for monotonic validation.
    last_slot: Arc<Mutex<u64>>,
}

impl Default for SecurityValidator {
    fn default() -> Self {
        Self::new()
    }
}

impl SecurityValidator {
    /// Default quota: 5 candidates per mint per 60s.
    pub fn new() -> Self {
        Self::with_mint_rate_limit(5, 60)
    }

    pub fn with_mint_rate_limit(max_per_window: u32, window_secs: u64) -> Self {
        Self {
            seen_signatures: Arc::new(Mutex::new(HashSet::new())),
            mint_rate_limiter: RateLimiter::keyed(mint_quota(max_per_window, window_secs)),
            last_slot: Arc::new(Mutex::new(0)),
        }
    }

    /// Validate a candidate for security issues.
    pub fn validate_candidate(&self, candidate: &PoolCandidate) -> ValidationResult {
        let mut issues = Vec::new();

        if candidate.token_id.pubkey() == Pubkey::default() {
            issues.push("Invalid mint pubkey: default/zero pubkey".to_string());
        }

        if candidate.creator.pubkey() == Pubkey::default() {
            issues.push("Invalid creator pubkey: default/zero pubkey".to_string());
        }

        // Slot monotonic validation (slots should generally increase).
        {
            let mut last_slot = self.last_slot.lock().unwrap();
            if candidate.slot < *last_slot && *last_slot > 0 {
                // Allow some backwards tolerance for network reordering.
                if *last_slot - candidate.slot > 10 {
                    issues.push(format!(
                        "Slot significantly backwards: current {} vs last {}",
                        candidate.slot, *last_slot
                    ));
                }
            } else {
                *last_slot = candidate.slot.max(*last_slot);
            }
        }

        if candidate.signature.is_empty() {
            issues.push("Empty transaction signature".to_string());
        }

        // Timestamp sanity check (not too far in past or future).
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();

        if candidate.timestamp > 0 {
            let time_diff = if candidate.timestamp > now {
                candidate.timestamp - now
            } else {
                now - candidate.timestamp
            };

            // Allow 5 minutes tolerance.
            if time_diff > 300 {
                issues.push(format!(
                    "Timestamp too far from current time: {} vs {}",
                    candidate.timestamp, now
                ));
            }
        }

        ValidationResult { issues }
    }

    /// Check if a mint is being spammed (rate limiting).
    pub fn check_mint_rate_limit(&self, mint: &Pubkey) -> bool {
        self.mint_rate_limiter.check_key(mint).is_ok()
    }

    /// Check for duplicate transaction-signature attempts.
    pub fn check_duplicate_signature(&self, signature: &str) -> bool {
        let mut seen = self.seen_signatures.lock().unwrap();
        if seen.contains(signature) {
            return false;
        }
        seen.insert(signature.to_string());

        if seen.len() > 10000 {
            let mut sigs: Vec<_> = seen.iter().cloned().collect();
            sigs.sort();
            seen.clear();
            for sig in sigs.into_iter().skip(5000) {
                seen.insert(sig);
            }
        }

        true
    }

    /// Validate holdings percentage for overflow protection.
    pub fn validate_holdings_percent(&self, percent: f64) -> Result<f64, String> {
        if !percent.is_finite() {
            return Err("Holdings percent is not finite".to_string());
        }
        if percent < 0.0 {
            return Err("Holdings percent cannot be negative".to_string());
        }
        if percent > 1.0 {
            return Err("Holdings percent cannot exceed 100%".to_string());
        }
        Ok(percent)
    }

    /// Validate a lamports amount for overflow protection.
    pub fn validate_lamports(&self, amount: u64) -> Result<u64, String> {
        const MAX_REASONABLE_LAMPORTS: u64 = 1_000_000_000_000_000;
        if amount > MAX_REASONABLE_LAMPORTS {
            return Err(format!(
                "Lamports amount {} exceeds reasonable maximum {}",
                amount, MAX_REASONABLE_LAMPORTS
            ));
        }
        Ok(amount)
    }

    /// Clear old data periodically for memory management.
    pub fn cleanup_old_data(&self) {
        self.mint_rate_limiter.retain_recent();

        {
            let mut seen = self.seen_signatures.lock().unwrap();
            if seen.len() > 10000 {
                let to_remove = seen.len() - 5000;
                let mut sigs: Vec<_> = seen.iter().cloned().collect();
                sigs.sort();
                for sig in sigs.into_iter().take(to_remove) {
                    seen.remove(&sig);
                }
            }
        }
    }
}

#[derive(Debug)]
pub struct ValidationResult {
    pub issues: Vec<String>,
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        self.issues.is_empty()
    }

    pub fn has_critical_issues(&self) -> bool {
        !self.issues.is_empty()
    }
}

/// Global security validator instance.
static GLOBAL_VALIDATOR: std::sync::OnceLock<SecurityValidator> = std::sync::OnceLock::new();

pub fn validator() -> &'static SecurityValidator {
    GLOBAL_VALIDATOR.get_or_init(SecurityValidator::new)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{TokenId, WalletId};

    fn fixed_pubkey(byte: u8) -> Pubkey {
        let mut b = [0u8; 32];
        b.fill(byte);
        Pubkey::new_from_array(b)
    }

    fn mk_candidate(byte: u8, ts: u64, signature: &str) -> PoolCandidate {
        PoolCandidate {
            token_id: TokenId::new(fixed_pubkey(byte)),
            creator: WalletId::new(fixed_pubkey(byte.wrapping_add(1))),
            slot: 1000,
            timestamp: ts,
            signature: signature.to_string(),
        }
    }

    #[test]
    fn test_candidate_validation() {
        let validator = SecurityValidator::new();

        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_secs();
        let valid_candidate = mk_candidate(1, now, "sig-valid");
        let result = validator.validate_candidate(&valid_candidate);
        assert!(result.is_valid());

        let invalid_candidate = PoolCandidate {
            token_id: TokenId::new(Pubkey::default()),
            creator: WalletId::new(Pubkey::default()),
            slot: 0,
            timestamp: 0,
            signature: String::new(),
        };
        let result = validator.validate_candidate(&invalid_candidate);
        assert!(!result.is_valid());
        assert!(result.issues.len() >= 2);
    }

    #[test]
    fn test_rate_limiting() {
        let validator = SecurityValidator::with_mint_rate_limit(3, 60);
        let mint = Pubkey::new_unique();

        assert!(validator.check_mint_rate_limit(&mint));
        assert!(validator.check_mint_rate_limit(&mint));
        assert!(validator.check_mint_rate_limit(&mint));
        assert!(!validator.check_mint_rate_limit(&mint));
    }

    #[test]
    fn test_duplicate_signature_detection() {
        let validator = SecurityValidator::new();

        assert!(validator.check_duplicate_signature("sig1"));
        assert!(!validator.check_duplicate_signature("sig1"));
        assert!(validator.check_duplicate_signature("sig2"));
    }

    #[test]
    fn test_holdings_validation() {
        let validator = SecurityValidator::new();

        assert!(validator.validate_holdings_percent(0.5).is_ok());
        assert!(validator.validate_holdings_percent(1.0).is_ok());
        assert!(validator.validate_holdings_percent(0.0).is_ok());

        assert!(validator.validate_holdings_percent(-0.1).is_err());
        assert!(validator.validate_holdings_percent(1.1).is_err());
        assert!(validator.validate_holdings_percent(f64::INFINITY).is_err());
        assert!(validator.validate_holdings_percent(f64::NAN).is_err());
    }
}
