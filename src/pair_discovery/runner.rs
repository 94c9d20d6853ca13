//! Self-restarting connection loop around one WSS connection attempt:
//! reconnect after 5s on a clean disconnect, 10s on any other error, no
//! maximum attempt count. Each reconnect re-subscribes.
//!
//! Grounded on `sniffer/runner.rs`'s orchestrator, simplified to a single
//! source (one discovery path, no HTTP-polling fallback) and rewritten to a
//! fixed 5s/10s backoff split instead of the original's doubling backoff
//! (recorded in DESIGN.md).

use std::time::Duration;

use tokio::sync::mpsc::Sender;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{error, warn};

use crate::config::Config;
use crate::pair_discovery::wss_source::{run_once, ConnectionOutcome};
use crate::types::PoolCandidate;

pub struct DiscoveryRunner {
    rpc_endpoint: String,
    wss_endpoint: String,
    disconnect_backoff: Duration,
    error_backoff: Duration,
    subscription_idle: Duration,
}

impl DiscoveryRunner {
    pub fn new(cfg: &Config) -> Self {
        Self {
            rpc_endpoint: cfg.rpc_endpoints.first().cloned().unwrap_or_default(),
            wss_endpoint: cfg.rpc_wss_endpoint.clone(),
            disconnect_backoff: Duration::from_secs(cfg.discovery_disconnect_backoff_secs),
            error_backoff: Duration::from_secs(cfg.discovery_error_backoff_secs),
            subscription_idle: Duration::from_millis(cfg.subscription_idle_ms),
        }
    }

    /// Spawn the reconnect loop as a background task forwarding every
    /// discovered [`PoolCandidate`] to `sender`.
    pub fn spawn(self, sender: Sender<PoolCandidate>) -> JoinHandle<()> {
        tokio::spawn(async move { self.run(sender).await })
    }

    async fn run(&self, sender: Sender<PoolCandidate>) {
        loop {
            if sender.is_closed() {
                warn!(target: "pair_discovery", "candidate receiver dropped, stopping discovery runner");
                return;
            }

            match run_once(&self.wss_endpoint, &self.rpc_endpoint, &sender, self.subscription_idle).await {
                ConnectionOutcome::Disconnected => {
                    warn!(target: "pair_discovery", "WSS disconnected, reconnecting in {:?}", self.disconnect_backoff);
                    sleep(self.disconnect_backoff).await;
                }
                ConnectionOutcome::Errored(reason) => {
                    error!(target: "pair_discovery", reason = %reason, "connection attempt failed, retrying in {:?}", self.error_backoff);
                    sleep(self.error_backoff).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoffs_come_from_config() {
        let mut cfg = Config::default();
        cfg.discovery_disconnect_backoff_secs = 5;
        cfg.discovery_error_backoff_secs = 10;
        let runner = DiscoveryRunner::new(&cfg);
        assert_eq!(runner.disconnect_backoff, Duration::from_secs(5));
        assert_eq!(runner.error_backoff, Duration::from_secs(10));
    }
}
