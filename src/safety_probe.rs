//! Safety Probe: honeypot/tax/market-cap/anti-bot/liquidity
//! checks, cached 300s per token. Never fails its caller -- any subsystem
//! error degrades to the conservative all-negative report.
//!
//! Grounded on `order_executor.py`'s oracle call and on the concurrent-guard
//! idiom in `buy_engine.rs::try_buy_with_guards`. First real use of the
//! `moka` dependency (declared but previously unused).

use crate::execution_gateway::ExecutionGateway;
use crate::types::{SafetyReport, TokenId};
use moka::future::Cache;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

#[derive(Debug, Deserialize)]
struct OracleResponse {
    #[serde(default)]
    is_honeypot: bool,
    #[serde(default)]
    tax_buy: f64,
    #[serde(default)]
    tax_sell: f64,
    #[serde(default)]
    marketcap: f64,
    #[serde(default)]
    anti_bot: bool,
}

pub struct SafetyProbe {
    http: reqwest::Client,
    oracle_url: String,
    base_mint: String,
    gateway: Arc<dyn ExecutionGateway>,
    timeout: Duration,
    cache: Cache<TokenId, SafetyReport>,
}

impl SafetyProbe {
    pub fn new(
        oracle_url: String,
        base_mint: String,
        gateway: Arc<dyn ExecutionGateway>,
        timeout: Duration,
        cache_ttl: Duration,
    ) -> Self {
        Self {
            http: reqwest::Client::new(),
            oracle_url,
            base_mint,
            gateway,
            timeout,
            cache: Cache::builder().time_to_live(cache_ttl).max_capacity(50_000).build(),
        }
    }

    /// Evaluate a token, serving from the 300s TTL cache when present
    ///. Never returns an error: any failing subsystem check
    /// degrades the whole report to [`SafetyReport::conservative`].
    pub async fn evaluate(&self, token_id: TokenId) -> SafetyReport {
        if let Some(cached) = self.cache.get(&token_id).await {
            return cached;
        }

        let (oracle, forward, reverse) = tokio::join!(
            self.check_oracle(token_id),
            self.check_forward_liquidity(token_id),
            self.check_reverse_sellability(token_id),
        );

        let report = match (oracle, forward, reverse) {
            (Some(oracle), Some(has_liquidity), Some(is_sellable)) => SafetyReport {
                is_honeypot: oracle.is_honeypot,
                tax_buy: oracle.tax_buy,
                tax_sell: oracle.tax_sell,
                marketcap: oracle.marketcap,
                anti_bot: oracle.anti_bot,
                has_liquidity,
                is_sellable,
            },
            _ => {
                warn!(token_id = %token_id, "safety probe subsystem failure, using conservative report");
                SafetyReport::conservative()
            }
        };

        self.cache.insert(token_id, report).await;
        report
    }

    async fn check_oracle(&self, token_id: TokenId) -> Option<OracleResponse> {
        let url = format!("{}/tokens/{}", self.oracle_url, token_id);
        let resp = tokio::time::timeout(self.timeout, self.http.get(&url).send())
            .await
            .ok()?
            .ok()?;
        if !resp.status().is_success() {
            return None;
        }
        resp.json::<OracleResponse>().await.ok()
    }

    /// Forward-liquidity: quote base -> token_id for 5 units of base;
    /// passes iff `out_amount > 0`.
    async fn check_forward_liquidity(&self, token_id: TokenId) -> Option<bool> {
        let quote = self
            .gateway
            .quote(&self.base_mint, &token_id.to_string(), 5_000_000_000, 500)
            .await
            .ok()?;
        Some(quote.out_amount > 0)
    }

    /// Reverse-sellability: quote token_id -> base for 0.1 units; passes
    /// iff a route exists.
    async fn check_reverse_sellability(&self, token_id: TokenId) -> Option<bool> {
        Some(
            self.gateway
                .quote(&token_id.to_string(), &self.base_mint, 100_000_000, 500)
                .await
                .is_ok(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution_gateway::SimGateway;
    use crate::types::RunMode;
    use solana_sdk::pubkey::Pubkey;

    fn fixed_token(byte: u8) -> TokenId {
        let mut b = [0u8; 32];
        b.fill(byte);
        TokenId::new(Pubkey::new_from_array(b))
    }

    #[tokio::test]
    async fn oracle_unreachable_degrades_to_conservative() {
        // SimGateway's quote always succeeds, but the oracle URL below
        // resolves to nothing reachable, so the combined report must fall
        // back to conservative.
        let gateway: Arc<dyn ExecutionGateway> = Arc::new(SimGateway::new(RunMode::Sim));
        let probe = SafetyProbe::new(
            "http://127.0.0.1:1".to_string(),
            "So11111111111111111111111111111111111111112".to_string(),
            gateway,
            Duration::from_millis(200),
            Duration::from_secs(300),
        );
        let report = probe.evaluate(fixed_token(9)).await;
        assert!(report.rejection_reason().is_some());
    }

    #[tokio::test]
    async fn report_is_cached_within_ttl() {
        let gateway: Arc<dyn ExecutionGateway> = Arc::new(SimGateway::new(RunMode::Sim));
        let probe = SafetyProbe::new(
            "http://127.0.0.1:1".to_string(),
            "So11111111111111111111111111111111111111112".to_string(),
            gateway,
            Duration::from_millis(200),
            Duration::from_secs(300),
        );
        let token = fixed_token(3);
        let first = probe.evaluate(token).await;
        let second = probe.evaluate(token).await;
        assert_eq!(first, second);
    }
}
