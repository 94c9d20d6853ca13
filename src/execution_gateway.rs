//! Execution Gateway: quote and swap via an external
//! aggregator, usable in both live and simulated modes. The gateway never
//! retains state that survives a swap; callers persist outcomes themselves.
//!
//! Grounded on `order_executor.py`'s `execute_buy`/`execute_sell` (Jupiter
//! v6 quote+swap flow, `simulate` branch) and on `tx_builder.rs`'s
//! retry/timeout idiom (`tokio-retry` + exponential backoff, blockhash
//! caching generalized here into quote-call retries).

use crate::wallet::WalletManager;
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_retry::Retry;
use tracing::{debug, warn};

/// Failure modes a quote/swap call can surface to its caller.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("no route or zero output amount")]
    QuoteUnavailable,
    #[error("network error: {0}")]
    Network(String),
    #[error("signing error: {0}")]
    Signing(String),
    #[error("on-chain rejection: {0}")]
    OnChainRejected(String),
}

impl GatewayError {
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, GatewayError::Network(msg) if msg.contains("429"))
    }
}

/// Policy for a 429 from any gateway call: log it and sleep 2s, letting
/// the caller's next tick retry rather than retrying here.
pub async fn rate_limit_backoff(err: &GatewayError) {
    if err.is_rate_limited() {
        warn!("gateway call rate limited (429), backing off 2s");
        tokio::time::sleep(Duration::from_secs(2)).await;
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Quote {
    pub out_amount: u64,
    pub raw: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SwapOutcome {
    pub signature: String,
    pub received_out: u64,
}

/// Quote and swap via an external aggregator; balance lookup. Mode is
/// decided at construction and never changes.
#[async_trait]
pub trait ExecutionGateway: Send + Sync {
    async fn quote(
        &self,
        in_mint: &str,
        out_mint: &str,
        amount: u64,
        slippage_bps: u16,
    ) -> Result<Quote, GatewayError>;

    async fn swap(&self, quote: &Quote, user_pubkey: &str) -> Result<SwapOutcome, GatewayError>;

    async fn get_balance(&self, pubkey: &str) -> Result<u64, GatewayError>;

    /// Whether `wallet` appears to have recently sold `token_mint`: one of
    /// its last few transactions mentions the mint's account.
    async fn creator_recently_sold(&self, wallet: &str, token_mint: &str) -> Result<bool, GatewayError>;
}

#[derive(Debug, Deserialize)]
struct AggregatorQuoteResponse {
    #[serde(rename = "outAmount")]
    out_amount: String,
}

#[derive(Debug, Deserialize)]
struct AggregatorSwapResponse {
    #[serde(rename = "swapTransaction")]
    swap_transaction: String,
}

/// Live REAL-mode gateway: talks to the aggregator REST quote/swap
/// endpoints and to the RPC balance endpoint.
pub struct AggregatorGateway {
    http: reqwest::Client,
    aggregator_url: String,
    rpc_url: String,
    wallet: Arc<WalletManager>,
    quote_timeout: Duration,
    swap_timeout: Duration,
    balance_timeout: Duration,
}

impl AggregatorGateway {
    pub fn new(
        aggregator_url: String,
        rpc_url: String,
        wallet: Arc<WalletManager>,
        quote_timeout: Duration,
        swap_timeout: Duration,
        balance_timeout: Duration,
    ) -> Self {
        Self {
            http: reqwest::Client::new(),
            aggregator_url,
            rpc_url,
            wallet,
            quote_timeout,
            swap_timeout,
            balance_timeout,
        }
    }

    fn classify_status(status: reqwest::StatusCode, body: &str) -> GatewayError {
        if status.as_u16() == 429 {
            GatewayError::Network(format!("429 rate limited: {body}"))
        } else if status.is_server_error() {
            GatewayError::Network(format!("{status}: {body}"))
        } else {
            GatewayError::QuoteUnavailable
        }
    }
}

#[async_trait]
impl ExecutionGateway for AggregatorGateway {
    async fn quote(
        &self,
        in_mint: &str,
        out_mint: &str,
        amount: u64,
        slippage_bps: u16,
    ) -> Result<Quote, GatewayError> {
        let url = format!(
            "{}/quote?inputMint={in_mint}&outputMint={out_mint}&amount={amount}&slippageBps={slippage_bps}",
            self.aggregator_url
        );

        let retry_strategy = ExponentialBackoff::from_millis(50).map(jitter).take(2);
        let resp = Retry::spawn(retry_strategy, || async {
            tokio::time::timeout(self.quote_timeout, self.http.get(&url).send())
                .await
                .map_err(|_| GatewayError::Network("quote timed out".to_string()))?
                .map_err(|e| GatewayError::Network(e.to_string()))
        })
        .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(Self::classify_status(status, &body));
        }

        let raw: serde_json::Value = resp.json().await.map_err(|e| GatewayError::Network(e.to_string()))?;
        let parsed: AggregatorQuoteResponse =
            serde_json::from_value(raw.clone()).map_err(|_| GatewayError::QuoteUnavailable)?;
        let out_amount: u64 = parsed.out_amount.parse().map_err(|_| GatewayError::QuoteUnavailable)?;

        if out_amount == 0 {
            return Err(GatewayError::QuoteUnavailable);
        }
        Ok(Quote { out_amount, raw })
    }

    async fn swap(&self, quote: &Quote, user_pubkey: &str) -> Result<SwapOutcome, GatewayError> {
        let body = serde_json::json!({
            "quoteResponse": quote.raw,
            "userPublicKey": user_pubkey,
        });

        let resp = tokio::time::timeout(
            self.swap_timeout,
            self.http.post(format!("{}/swap", self.aggregator_url)).json(&body).send(),
        )
        .await
        .map_err(|_| GatewayError::Network("swap timed out".to_string()))?
        .map_err(|e| GatewayError::Network(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(Self::classify_status(status, &text));
        }

        let parsed: AggregatorSwapResponse =
            resp.json().await.map_err(|e| GatewayError::Network(e.to_string()))?;

        let tx_bytes = base64::Engine::decode(
            &base64::engine::general_purpose::STANDARD,
            parsed.swap_transaction,
        )
        .map_err(|e| GatewayError::Signing(format!("invalid base64 tx: {e}")))?;

        let mut tx: solana_sdk::transaction::VersionedTransaction =
            bincode::deserialize(&tx_bytes).map_err(|e| GatewayError::Signing(e.to_string()))?;

        self.wallet
            .sign_transaction(&mut tx)
            .map_err(|e| GatewayError::Signing(e.to_string()))?;

        let rpc = solana_client::nonblocking::rpc_client::RpcClient::new(self.rpc_url.clone());
        let signature = rpc
            .send_and_confirm_transaction(&tx)
            .await
            .map_err(|e| GatewayError::OnChainRejected(e.to_string()))?;

        Ok(SwapOutcome { signature: signature.to_string(), received_out: quote.out_amount })
    }

    async fn get_balance(&self, pubkey: &str) -> Result<u64, GatewayError> {
        let rpc = solana_client::nonblocking::rpc_client::RpcClient::new(self.rpc_url.clone());
        let parsed = pubkey.parse().map_err(|_| GatewayError::Network("invalid pubkey".to_string()))?;
        tokio::time::timeout(self.balance_timeout, rpc.get_balance(&parsed))
            .await
            .map_err(|_| GatewayError::Network("balance lookup timed out".to_string()))?
            .map_err(|e| GatewayError::Network(e.to_string()))
    }

    /// Grounded on `decision_module.py::_creator_wallet_selling`: pull the
    /// wallet's last few signatures and check whether any of the
    /// transactions they belong to mentions `token_mint`'s account.
    async fn creator_recently_sold(&self, wallet: &str, token_mint: &str) -> Result<bool, GatewayError> {
        use solana_client::rpc_config::RpcTransactionConfig;
        use solana_transaction_status::{EncodedTransaction, UiMessage, UiTransactionEncoding};

        let rpc = solana_client::nonblocking::rpc_client::RpcClient::new(self.rpc_url.clone());
        let pubkey: solana_sdk::pubkey::Pubkey =
            wallet.parse().map_err(|_| GatewayError::Network("invalid wallet pubkey".to_string()))?;

        let signatures = tokio::time::timeout(
            self.balance_timeout,
            rpc.get_signatures_for_address_with_config(&pubkey, Default::default()),
        )
        .await
        .map_err(|_| GatewayError::Network("signature lookup timed out".to_string()))?
        .map_err(|e| GatewayError::Network(e.to_string()))?;

        for sig_info in signatures.into_iter().take(5) {
            let sig: solana_sdk::signature::Signature = match sig_info.signature.parse() {
                Ok(s) => s,
                Err(_) => continue,
            };
            let Ok(tx) = rpc
                .get_transaction_with_config(
                    &sig,
                    RpcTransactionConfig {
                        encoding: Some(UiTransactionEncoding::JsonParsed),
                        commitment: None,
                        max_supported_transaction_version: Some(0),
                    },
                )
                .await
            else {
                continue;
            };
            let EncodedTransaction::Json(ui_tx) = tx.transaction.transaction else { continue };
            let UiMessage::Parsed(message) = ui_tx.message else { continue };
            if message.account_keys.iter().any(|a| a.pubkey == token_mint) {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

/// Simulated gateway: does no network I/O. Produces
/// a synthetic fill at the requested price (the Decision Engine supplies
/// the effective price via the quote amount it requests), tagged with a
/// monotonically increasing fake signature so journal entries stay
/// distinguishable.
pub struct SimGateway {
    signature_counter: AtomicU64,
}

impl SimGateway {
    pub fn new(_mode: crate::types::RunMode) -> Self {
        Self { signature_counter: AtomicU64::new(1) }
    }
}

#[async_trait]
impl ExecutionGateway for SimGateway {
    async fn quote(
        &self,
        _in_mint: &str,
        _out_mint: &str,
        amount: u64,
        _slippage_bps: u16,
    ) -> Result<Quote, GatewayError> {
        debug!(amount, "SIM quote (no network I/O)");
        Ok(Quote { out_amount: amount, raw: serde_json::json!({ "simulated": true, "outAmount": amount.to_string() }) })
    }

    async fn swap(&self, quote: &Quote, _user_pubkey: &str) -> Result<SwapOutcome, GatewayError> {
        let n = self.signature_counter.fetch_add(1, Ordering::Relaxed);
        Ok(SwapOutcome { signature: format!("SIM-{n}"), received_out: quote.out_amount })
    }

    async fn get_balance(&self, _pubkey: &str) -> Result<u64, GatewayError> {
        warn!("SIM get_balance called; returning a large synthetic balance");
        Ok(u64::MAX / 2)
    }

    async fn creator_recently_sold(&self, _wallet: &str, _token_mint: &str) -> Result<bool, GatewayError> {
        // No chain to watch in SIM; creator-sell exits only fire through
        // an explicit ActorEvent::CreatorSellDetected in this mode.
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RunMode;

    #[tokio::test]
    async fn sim_gateway_never_fails_and_echoes_amount() {
        let gw = SimGateway::new(RunMode::Sim);
        let quote = gw.quote("A", "B", 1_000, 50).await.unwrap();
        assert_eq!(quote.out_amount, 1_000);
        let outcome = gw.swap(&quote, "payer").await.unwrap();
        assert_eq!(outcome.received_out, 1_000);
        assert!(outcome.signature.starts_with("SIM-"));
    }

    #[tokio::test]
    async fn sim_gateway_signatures_are_unique() {
        let gw = SimGateway::new(RunMode::Sim);
        let q = gw.quote("A", "B", 1, 50).await.unwrap();
        let a = gw.swap(&q, "payer").await.unwrap();
        let b = gw.swap(&q, "payer").await.unwrap();
        assert_ne!(a.signature, b.signature);
    }
}
