//! One connection attempt's worth of WSS subscription logic: subscribe to
//! logs mentioning the token program at `finalized` commitment, validate
//! the subscription ack, and for every notification whose logs contain the
//! trigger substring, fetch the transaction and try to extract a new pool
//! candidate.
//!
//! Grounded on `sniffer/wss_source.rs`'s connection-loop idiom
//! (`PubsubClient::logs_subscribe`, `tokio::select!` against a stop
//! notifier) and on `new_pair_scanner.py`'s per-message handling.

use std::str::FromStr;
use std::sync::Arc;

use futures::StreamExt;
use solana_client::nonblocking::pubsub_client::PubsubClient;
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_client::rpc_config::{RpcTransactionConfig, RpcTransactionLogsConfig, RpcTransactionLogsFilter};
use solana_sdk::commitment_config::{CommitmentConfig, CommitmentLevel};
use solana_sdk::signature::Signature;
use solana_transaction_status::{EncodedTransaction, UiInstruction, UiMessage, UiParsedInstruction, UiTransactionEncoding};
use tokio::sync::mpsc::Sender;
use tracing::{debug, error, info, warn};

use crate::pair_discovery::source::{extract_pool_candidate, logs_contain_trigger, RawInstruction, TOKEN_PROGRAM};
use crate::structured_logging::StructuredLogger;
use crate::types::{now_secs, PoolCandidate};

/// Why a connection attempt ended, so the caller's reconnect loop can apply
/// the spec's 5s/10s backoff split.
pub enum ConnectionOutcome {
    /// The subscription stream ended cleanly (server closed it).
    Disconnected,
    /// Anything else: failed to connect, failed to subscribe, or an error
    /// surfaced mid-stream.
    Errored(String),
}

/// Run one connection attempt end-to-end. Returns once the subscription
/// ends or an error occurs; never retries internally.
pub async fn run_once(
    wss_endpoint: &str,
    rpc_endpoint: &str,
    candidate_tx: &Sender<PoolCandidate>,
    subscription_idle: std::time::Duration,
) -> ConnectionOutcome {
    debug!(target: "pair_discovery", "connecting to {}", wss_endpoint);
    let client = match PubsubClient::new(wss_endpoint).await {
        Ok(c) => c,
        Err(e) => return ConnectionOutcome::Errored(format!("connect failed: {e}")),
    };
    info!(target: "pair_discovery", "WSS connected to {}", wss_endpoint);

    // `logs_subscribe` consumes the subscription acknowledgement internally
    // and fails if it never arrives.
    let (mut stream, _unsubscribe) = match client
        .logs_subscribe(
            RpcTransactionLogsFilter::Mentions(vec![TOKEN_PROGRAM.to_string()]),
            RpcTransactionLogsConfig {
                commitment: Some(CommitmentConfig { commitment: CommitmentLevel::Finalized }),
            },
        )
        .await
    {
        Ok(pair) => pair,
        Err(e) => return ConnectionOutcome::Errored(format!("logs_subscribe failed: {e}")),
    };

    let rpc = Arc::new(RpcClient::new(rpc_endpoint.to_string()));

    loop {
        let next = match tokio::time::timeout(subscription_idle, stream.next()).await {
            Ok(next) => next,
            Err(_) => {
                warn!(target: "pair_discovery", "no notification within {:?}, treating subscription as disconnected", subscription_idle);
                return ConnectionOutcome::Disconnected;
            }
        };
        match next {
            Some(notification) => {
                let signature = notification.value.signature.clone();
                let slot = notification.context.slot;
                let logs = notification.value.logs;

                if !logs_contain_trigger(&logs) {
                    continue;
                }

                info!(target: "pair_discovery", signature = %signature, "candidate trigger observed");

                let rpc = rpc.clone();
                let candidate_tx = candidate_tx.clone();
                tokio::spawn(async move {
                    if let Err(e) = process_candidate_signature(&rpc, &signature, slot, &candidate_tx).await {
                        warn!(target: "pair_discovery", signature = %signature, error = %e, "failed to process candidate");
                    }
                });
            }
            None => return ConnectionOutcome::Disconnected,
        }
    }
}

async fn process_candidate_signature(
    rpc: &RpcClient,
    signature: &str,
    slot: u64,
    candidate_tx: &Sender<PoolCandidate>,
) -> Result<(), String> {
    let sig = Signature::from_str(signature).map_err(|e| format!("invalid signature: {e}"))?;

    let tx = rpc
        .get_transaction_with_config(
            &sig,
            RpcTransactionConfig {
                encoding: Some(UiTransactionEncoding::JsonParsed),
                commitment: Some(CommitmentConfig::finalized()),
                max_supported_transaction_version: Some(0),
            },
        )
        .await
        .map_err(|e| format!("get_transaction failed: {e}"))?;

    let EncodedTransaction::Json(ui_tx) = tx.transaction.transaction else {
        return Err("unexpected transaction encoding".to_string());
    };

    let UiMessage::Parsed(message) = ui_tx.message else {
        return Err("expected parsed message".to_string());
    };

    let account_keys: Vec<String> = message.account_keys.iter().map(|a| a.pubkey.clone()).collect();
    let Some(fee_payer) = account_keys.first().cloned() else {
        return Err("transaction has no account keys".to_string());
    };

    let instructions: Vec<RawInstruction> = message
        .instructions
        .iter()
        .filter_map(|ix| match ix {
            UiInstruction::Parsed(UiParsedInstruction::PartiallyDecoded(decoded)) => Some(RawInstruction {
                program_id: decoded.program_id.clone(),
                accounts: decoded.accounts.clone(),
                data_base58: decoded.data.clone(),
            }),
            _ => None,
        })
        .collect();

    if let Some(candidate) =
        extract_pool_candidate(signature, slot, now_secs(), &fee_payer, &account_keys, &instructions)
    {
        StructuredLogger::new("pair_discovery").log_candidate_observed(&candidate.token_id.to_string(), slot);
        if candidate_tx.send(candidate).await.is_err() {
            return Err("candidate receiver dropped".to_string());
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_outcome_variants_construct() {
        let _ = ConnectionOutcome::Disconnected;
        let _ = ConnectionOutcome::Errored("x".to_string());
    }
}
