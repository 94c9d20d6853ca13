//! Available-capital accounting. Grounded on the guarded-counter idiom in
//! the original `buy_engine.rs`'s `BackoffState` (a small mutex-guarded
//! struct with checked mutation methods), applied here to SOL-denominated
//! capital instead of a retry counter.

use tokio::sync::Mutex;

pub struct CapitalLedger {
    available: Mutex<f64>,
}

impl CapitalLedger {
    pub fn new(initial: f64) -> Self {
        Self { available: Mutex::new(initial.max(0.0)) }
    }

    /// Reserve `amount`, failing (no side effect) if insufficient. Used by
    /// the non-trusted-creator admission path.
    pub async fn try_reserve(&self, amount: f64) -> bool {
        let mut guard = self.available.lock().await;
        if *guard >= amount {
            *guard -= amount;
            true
        } else {
            false
        }
    }

    /// Reserve `amount` unconditionally, floored at zero. Used by the
    /// SIM-mode unconditional-admit path, which still
    /// tracks capital without gating on it.
    pub async fn reserve_unconditional(&self, amount: f64) {
        let mut guard = self.available.lock().await;
        *guard = (*guard - amount).max(0.0);
    }

    /// Return capital to the pool (failed buy, or sell proceeds).
    pub async fn release(&self, amount: f64) {
        let mut guard = self.available.lock().await;
        *guard += amount;
    }

    pub async fn snapshot(&self) -> f64 {
        *self.available.lock().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn try_reserve_rejects_insufficient_without_mutation() {
        let ledger = CapitalLedger::new(1.0);
        assert!(!ledger.try_reserve(2.0).await);
        assert_eq!(ledger.snapshot().await, 1.0);
    }

    #[tokio::test]
    async fn try_reserve_then_release_round_trips() {
        let ledger = CapitalLedger::new(5.0);
        assert!(ledger.try_reserve(2.0).await);
        assert_eq!(ledger.snapshot().await, 3.0);
        ledger.release(2.0).await;
        assert_eq!(ledger.snapshot().await, 5.0);
    }

    #[tokio::test]
    async fn reserve_unconditional_never_goes_negative() {
        let ledger = CapitalLedger::new(0.5);
        ledger.reserve_unconditional(10.0).await;
        assert_eq!(ledger.snapshot().await, 0.0);
    }
}
