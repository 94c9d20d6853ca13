//! `TradeObserver`: a seam between the Decision Engine and whatever wants to
//! react to trades without the engine itself depending on those consumers.
//! Grounded on `metrics.rs`'s metrics-as-a-sink pattern (a global registry,
//! fed from call sites rather than pulled).

use async_trait::async_trait;

use crate::metrics::MetricsRegistry;
use crate::types::{TokenId, TradeKind, TradeRecord};

#[async_trait]
pub trait TradeObserver: Send + Sync {
    async fn on_buy(&self, record: &TradeRecord);
    async fn on_sell(&self, record: &TradeRecord);
    async fn on_reject(&self, token_id: TokenId, reason: &str);
}

/// Feeds every trade event into the global [`MetricsRegistry`].
pub struct MetricsObserver {
    registry: &'static MetricsRegistry,
}

impl MetricsObserver {
    pub fn new(registry: &'static MetricsRegistry) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl TradeObserver for MetricsObserver {
    async fn on_buy(&self, record: &TradeRecord) {
        if let TradeKind::BuyFailed { .. } = record.kind {
            self.registry.increment_counter("decision_buy_failed_total");
        } else {
            self.registry.increment_counter("decision_buy_total");
        }
    }

    async fn on_sell(&self, record: &TradeRecord) {
        self.registry.increment_counter("decision_sell_total");
        if record.forced {
            self.registry.increment_counter("decision_forced_liquidation_total");
        }
    }

    async fn on_reject(&self, _token_id: TokenId, _reason: &str) {
        self.registry.increment_counter("decision_reject_total");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::metrics;
    use crate::types::{now_secs, RunMode};
    use solana_sdk::pubkey::Pubkey;

    fn fixed_token(byte: u8) -> TokenId {
        let mut b = [0u8; 32];
        b.fill(byte);
        TokenId::new(Pubkey::new_from_array(b))
    }

    #[tokio::test]
    async fn on_reject_increments_counter() {
        let before = metrics().get_counter("decision_reject_total");
        let observer = MetricsObserver::new(metrics());
        observer.on_reject(fixed_token(1), "no_liquidity").await;
        assert_eq!(metrics().get_counter("decision_reject_total"), before + 1);
    }

    #[tokio::test]
    async fn on_sell_marks_forced_liquidations() {
        let before = metrics().get_counter("decision_forced_liquidation_total");
        let observer = MetricsObserver::new(metrics());
        let record = TradeRecord {
            kind: TradeKind::Sell,
            token_id: fixed_token(2),
            price: 1.0,
            amount_native: 0.1,
            timestamp: now_secs(),
            mode: RunMode::Sim,
            forced: true,
        };
        observer.on_sell(&record).await;
        assert_eq!(metrics().get_counter("decision_forced_liquidation_total"), before + 1);
    }
}
