//! Engine configuration: loaded from `config.toml`, overridable by
//! environment variable, validated before `Engine::start` will accept
//! `REAL` mode.

use crate::types::EngineParams;
use serde::{Deserialize, Serialize};
use std::fs;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SniperMode {
    Sim,
    Real,
}

impl Default for SniperMode {
    fn default() -> Self {
        SniperMode::Sim
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// JSON-RPC HTTP endpoints, used for transaction fetch and balance
    /// lookups.
    #[serde(default = "default_rpc_endpoints")]
    pub rpc_endpoints: Vec<String>,
    /// WebSocket endpoint for the token-program log subscription.
    #[serde(default = "default_rpc_wss_endpoint")]
    pub rpc_wss_endpoint: String,

    /// Path to the wallet keypair file. Required to enter REAL mode.
    #[serde(default)]
    pub keypair_path: Option<String>,

    /// Requested run mode; may be overridden by the `SNIPER_MODE` env var.
    #[serde(default)]
    pub mode: SniperMode,

    /// Base currency mint used for quoting (e.g. wrapped SOL).
    #[serde(default = "default_base_mint")]
    pub base_mint: String,

    /// Aggregator quote/swap REST base URL.
    #[serde(default = "default_aggregator_url")]
    pub aggregator_url: String,
    /// Safety-oracle REST base URL.
    #[serde(default = "default_safety_oracle_url")]
    pub safety_oracle_url: String,

    #[serde(default = "default_quote_timeout_ms")]
    pub quote_timeout_ms: u64,
    #[serde(default = "default_swap_timeout_ms")]
    pub swap_timeout_ms: u64,
    #[serde(default = "default_balance_timeout_ms")]
    pub balance_timeout_ms: u64,
    #[serde(default = "default_safety_timeout_ms")]
    pub safety_timeout_ms: u64,
    #[serde(default = "default_subscription_idle_ms")]
    pub subscription_idle_ms: u64,
    /// Interval between re-quotes of every held position, used to feed
    /// `DecisionEngine::observe_price`.
    #[serde(default = "default_price_poll_interval_ms")]
    pub price_poll_interval_ms: u64,

    /// De-dup window the candidate pump holds incoming candidates in before
    /// forwarding the oldest-per-mint to the Decision Engine.
    #[serde(default = "default_candidate_buffer_ttl_ms")]
    pub candidate_buffer_ttl_ms: u64,
    #[serde(default = "default_candidate_buffer_capacity")]
    pub candidate_buffer_capacity: usize,

    /// Safety-report cache TTL.
    #[serde(default = "default_safety_cache_ttl_secs")]
    pub safety_cache_ttl_secs: u64,

    /// Starting available capital.
    #[serde(default = "default_initial_capital")]
    pub initial_capital: f64,

    /// Duration after start at which the engine enters the "exploitation
    /// phase".
    #[serde(default = "default_exploitation_phase_secs")]
    pub exploitation_phase_secs: u64,

    /// Self-Tuning Controller cadence.
    #[serde(default = "default_optimizer_first_tick_secs")]
    pub optimizer_first_tick_secs: u64,
    #[serde(default = "default_optimizer_tick_interval_secs")]
    pub optimizer_tick_interval_secs: u64,

    /// Pair discovery reconnect backoffs.
    #[serde(default = "default_discovery_disconnect_backoff_secs")]
    pub discovery_disconnect_backoff_secs: u64,
    #[serde(default = "default_discovery_error_backoff_secs")]
    pub discovery_error_backoff_secs: u64,

    /// Journal and persisted-state file paths.
    #[serde(default = "default_simulation_journal_path")]
    pub simulation_journal_path: String,
    #[serde(default = "default_real_journal_path")]
    pub real_journal_path: String,
    #[serde(default = "default_decision_log_path")]
    pub decision_log_path: String,
    #[serde(default = "default_engine_params_path")]
    pub engine_params_path: String,
    #[serde(default = "default_creator_cache_path")]
    pub creator_cache_path: String,

    #[serde(default)]
    pub initial_params: EngineParams,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            rpc_endpoints: default_rpc_endpoints(),
            rpc_wss_endpoint: default_rpc_wss_endpoint(),
            keypair_path: None,
            mode: SniperMode::default(),
            base_mint: default_base_mint(),
            aggregator_url: default_aggregator_url(),
            safety_oracle_url: default_safety_oracle_url(),
            quote_timeout_ms: default_quote_timeout_ms(),
            swap_timeout_ms: default_swap_timeout_ms(),
            balance_timeout_ms: default_balance_timeout_ms(),
            safety_timeout_ms: default_safety_timeout_ms(),
            subscription_idle_ms: default_subscription_idle_ms(),
            price_poll_interval_ms: default_price_poll_interval_ms(),
            candidate_buffer_ttl_ms: default_candidate_buffer_ttl_ms(),
            candidate_buffer_capacity: default_candidate_buffer_capacity(),
            safety_cache_ttl_secs: default_safety_cache_ttl_secs(),
            initial_capital: default_initial_capital(),
            exploitation_phase_secs: default_exploitation_phase_secs(),
            optimizer_first_tick_secs: default_optimizer_first_tick_secs(),
            optimizer_tick_interval_secs: default_optimizer_tick_interval_secs(),
            discovery_disconnect_backoff_secs: default_discovery_disconnect_backoff_secs(),
            discovery_error_backoff_secs: default_discovery_error_backoff_secs(),
            simulation_journal_path: default_simulation_journal_path(),
            real_journal_path: default_real_journal_path(),
            decision_log_path: default_decision_log_path(),
            engine_params_path: default_engine_params_path(),
            creator_cache_path: default_creator_cache_path(),
            initial_params: EngineParams::default(),
        }
    }
}

fn default_rpc_endpoints() -> Vec<String> {
    vec!["https://api.mainnet-beta.solana.com".to_string()]
}
fn default_rpc_wss_endpoint() -> String {
    "wss://api.mainnet-beta.solana.com".to_string()
}
fn default_base_mint() -> String {
    "So11111111111111111111111111111111111111112".to_string()
}
fn default_aggregator_url() -> String {
    "https://quote-api.jup.ag/v6".to_string()
}
fn default_safety_oracle_url() -> String {
    "https://api.rugcheck.xyz/v1".to_string()
}
fn default_quote_timeout_ms() -> u64 {
    10_000
}
fn default_swap_timeout_ms() -> u64 {
    10_000
}
fn default_balance_timeout_ms() -> u64 {
    5_000
}
fn default_safety_timeout_ms() -> u64 {
    10_000
}
fn default_subscription_idle_ms() -> u64 {
    30_000
}
fn default_price_poll_interval_ms() -> u64 {
    2_000
}
fn default_candidate_buffer_ttl_ms() -> u64 {
    250
}
fn default_candidate_buffer_capacity() -> usize {
    256
}
fn default_safety_cache_ttl_secs() -> u64 {
    300
}
fn default_initial_capital() -> f64 {
    5.0
}
fn default_exploitation_phase_secs() -> u64 {
    3_600
}
fn default_optimizer_first_tick_secs() -> u64 {
    3_600
}
fn default_optimizer_tick_interval_secs() -> u64 {
    1_200
}
fn default_discovery_disconnect_backoff_secs() -> u64 {
    5
}
fn default_discovery_error_backoff_secs() -> u64 {
    10
}
fn default_simulation_journal_path() -> String {
    "simulation.jsonl".to_string()
}
fn default_real_journal_path() -> String {
    "real.jsonl".to_string()
}
fn default_decision_log_path() -> String {
    "decision_log.jsonl".to_string()
}
fn default_engine_params_path() -> String {
    "engine_params.json".to_string()
}
fn default_creator_cache_path() -> String {
    "creator_cache.json".to_string()
}

impl Config {
    /// Load configuration from `config.toml` if present, otherwise
    /// defaults. `SNIPER_MODE=sim|real` overrides the file with highest
    /// priority.
    pub fn load() -> Self {
        let mut cfg = match fs::read_to_string("config.toml") {
            Ok(s) => toml::from_str::<Config>(&s).unwrap_or_default(),
            Err(_) => Config::default(),
        };

        if let Ok(v) = std::env::var("SNIPER_MODE") {
            match v.to_lowercase().as_str() {
                "sim" => cfg.mode = SniperMode::Sim,
                "real" => cfg.mode = SniperMode::Real,
                _ => {}
            }
        }

        cfg.validate().expect("invalid configuration");
        cfg
    }

    /// Validate configuration consistency and constraints. REAL mode
    /// additionally requires a configured keypair path.
    pub fn validate(&self) -> Result<(), String> {
        if self.rpc_endpoints.is_empty() {
            return Err("at least one RPC endpoint must be configured".to_string());
        }
        if self.rpc_wss_endpoint.is_empty() {
            return Err("rpc_wss_endpoint must be set".to_string());
        }
        if self.quote_timeout_ms == 0 || self.swap_timeout_ms == 0 || self.balance_timeout_ms == 0 {
            return Err("network timeouts must be greater than 0".to_string());
        }
        if self.safety_cache_ttl_secs == 0 {
            return Err("safety_cache_ttl_secs must be greater than 0".to_string());
        }
        if self.initial_capital < 0.0 {
            return Err("initial_capital must be non-negative".to_string());
        }
        if self.optimizer_tick_interval_secs == 0 {
            return Err("optimizer_tick_interval_secs must be greater than 0".to_string());
        }
        if self.price_poll_interval_ms == 0 {
            return Err("price_poll_interval_ms must be greater than 0".to_string());
        }
        if self.candidate_buffer_capacity == 0 {
            return Err("candidate_buffer_capacity must be greater than 0".to_string());
        }
        self.initial_params
            .validate()
            .map_err(|e| format!("invalid initial_params: {e}"))?;

        if self.mode == SniperMode::Real && self.keypair_path.is_none() {
            return Err("REAL mode requires keypair_path to be configured".to_string());
        }

        Ok(())
    }

    /// Degrade a requested REAL mode down to SIM when configuration is
    /// insufficient, rather than treating it as fatal at runtime.
    pub fn effective_mode(&self) -> SniperMode {
        if self.mode == SniperMode::Real && self.keypair_path.is_some() {
            SniperMode::Real
        } else {
            SniperMode::Sim
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        Config::default().validate().unwrap();
    }

    #[test]
    fn real_mode_without_keypair_is_rejected() {
        let mut cfg = Config::default();
        cfg.mode = SniperMode::Real;
        assert!(cfg.validate().is_err());
        assert_eq!(cfg.effective_mode(), SniperMode::Sim);
    }

    #[test]
    fn real_mode_with_keypair_validates() {
        let mut cfg = Config::default();
        cfg.mode = SniperMode::Real;
        cfg.keypair_path = Some("/tmp/does-not-need-to-exist.json".to_string());
        cfg.validate().unwrap();
        assert_eq!(cfg.effective_mode(), SniperMode::Real);
    }

    #[test]
    fn invalid_initial_params_rejected() {
        let mut cfg = Config::default();
        cfg.initial_params.sell_multiplier = 99.0;
        assert!(cfg.validate().is_err());
    }
}
