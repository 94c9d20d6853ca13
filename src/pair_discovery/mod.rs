//! Pair Discovery Pipeline: subscribes to the token
//! program's log feed and emits each new mint exactly once, in arrival
//! order, to the Decision Engine.
//!
//! Grounded on a merge of `sniffer/wss_source.rs` (connection loop,
//! heartbeat, `logsSubscribe`, ack validation) and `new_pair_scanner.py`
//! (trigger substring, Raydium LP V4 pre-filter, the `initialize2`
//! discriminant, `accounts[8]`/`accounts[9]` mint extraction).

pub mod runner;
pub mod source;
pub mod wss_source;

pub use runner::DiscoveryRunner;

#[cfg(any(test, feature = "mock-mode"))]
pub mod mock {
    //! Synthetic candidate feed for local testing, grounded on
    //! `run_mock_sniffer`. Not wired into the real `Engine`.

    use crate::types::{now_secs, PoolCandidate, TokenId, WalletId};
    use solana_sdk::signature::{Keypair, Signer};
    use std::time::Duration;
    use tokio::sync::mpsc::Sender;
    use tokio::task::JoinHandle;
    use tokio::time;

    pub fn spawn_mock_feed(sender: Sender<PoolCandidate>, interval: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = time::interval(interval);
            let mut slot = 0u64;
            loop {
                ticker.tick().await;
                slot += 1;
                let candidate = PoolCandidate {
                    token_id: TokenId::new(Keypair::new().pubkey()),
                    creator: WalletId::new(Keypair::new().pubkey()),
                    slot,
                    timestamp: now_secs(),
                    signature: format!("MOCK-{slot}"),
                };
                if sender.send(candidate).await.is_err() {
                    break;
                }
            }
        })
    }
}
