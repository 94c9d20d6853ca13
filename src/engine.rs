//! Top-level `Engine`: the single owning struct holding every subsystem.
//! Constructs every subsystem, spawns the background tasks, and exposes
//! `start`, `stop`, `liquidate_all`, `set_param`, `status` as the one
//! external read/write surface.
//!
//! Grounded on `main.rs`'s wiring order (wallet, then RPC/gateway, then the
//! candidate channel, then the worker tasks).

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::candidate_buffer::CandidateBuffer;
use crate::config::{Config, SniperMode};
use crate::creator_cache::CreatorCache;
use crate::decision_engine::actor::DEFAULT_SLIPPAGE_BPS;
use crate::decision_engine::observer::{MetricsObserver, TradeObserver};
use crate::decision_engine::{DecisionEngine, DecisionEngineConfig};
use crate::execution_gateway::{AggregatorGateway, ExecutionGateway, SimGateway};
use crate::journal::{DecisionLog, Journal};
use crate::metrics::metrics;
use crate::optimizer::SelfTuningController;
use crate::pair_discovery::DiscoveryRunner;
use crate::safety_probe::SafetyProbe;
use crate::security::SecurityValidator;
use crate::types::{ParamError, PoolCandidate, RunMode};
use crate::wallet::WalletManager;

/// Everything `Engine::start` spawns, held so `stop` can unwind cleanly.
struct RunningTasks {
    discovery: JoinHandle<()>,
    candidate_pump: JoinHandle<()>,
    price_ticker: JoinHandle<()>,
    optimizer: JoinHandle<()>,
}

impl RunningTasks {
    fn abort_all(&self) {
        self.discovery.abort();
        self.candidate_pump.abort();
        self.price_ticker.abort();
        self.optimizer.abort();
    }
}

/// Owns every subsystem for the process lifetime.
pub struct Engine {
    mode: RunMode,
    decision_engine: Arc<DecisionEngine>,
    gateway: Arc<dyn ExecutionGateway>,
    wallet_pubkey: String,
    tasks: RunningTasks,
}

impl Engine {
    /// Build and start every subsystem from `cfg`. REAL mode is only
    /// entered when `cfg.effective_mode()` says so; a requested REAL mode
    /// without a usable keypair has already degraded to SIM by that point.
    pub async fn start(cfg: Config) -> anyhow::Result<Self> {
        cfg.validate().map_err(|e| anyhow::anyhow!(e))?;
        let run_mode = match cfg.effective_mode() {
            SniperMode::Real => RunMode::Real,
            SniperMode::Sim => RunMode::Sim,
        };

        let wallet_pubkey = match (&cfg.keypair_path, run_mode) {
            (Some(path), RunMode::Real) => WalletManager::from_file(path)?.pubkey().to_string(),
            _ => WalletManager::new_random().pubkey().to_string(),
        };

        let gateway: Arc<dyn ExecutionGateway> = match run_mode {
            RunMode::Real => {
                let keypair_path = cfg
                    .keypair_path
                    .as_ref()
                    .expect("REAL mode validated to carry a keypair_path");
                let wallet = Arc::new(WalletManager::from_file(keypair_path)?);
                Arc::new(AggregatorGateway::new(
                    cfg.aggregator_url.clone(),
                    cfg.rpc_endpoints.first().cloned().unwrap_or_default(),
                    wallet,
                    Duration::from_millis(cfg.quote_timeout_ms),
                    Duration::from_millis(cfg.swap_timeout_ms),
                    Duration::from_millis(cfg.balance_timeout_ms),
                ))
            }
            RunMode::Sim => Arc::new(SimGateway::new(run_mode)),
        };

        let safety_probe = Arc::new(SafetyProbe::new(
            cfg.safety_oracle_url.clone(),
            cfg.base_mint.clone(),
            gateway.clone(),
            Duration::from_millis(cfg.safety_timeout_ms),
            Duration::from_secs(cfg.safety_cache_ttl_secs),
        ));

        let creator_cache = Arc::new(CreatorCache::load(cfg.creator_cache_path.clone()).await);
        let journal = Arc::new(Journal::new(cfg.simulation_journal_path.clone(), cfg.real_journal_path.clone()));
        let decision_log = Arc::new(DecisionLog::new(cfg.decision_log_path.clone()));

        let observers: Vec<Arc<dyn TradeObserver>> = vec![Arc::new(MetricsObserver::new(metrics()))];

        let decision_engine = Arc::new(DecisionEngine::new(
            DecisionEngineConfig {
                base_mint: cfg.base_mint.clone(),
                wallet_pubkey: wallet_pubkey.clone(),
                mode: run_mode,
                initial_capital_native: cfg.initial_capital,
                exploitation_phase_secs: cfg.exploitation_phase_secs,
                initial_params: cfg.initial_params,
            },
            gateway.clone(),
            safety_probe,
            creator_cache,
            journal.clone(),
            observers,
        ));

        let (candidate_tx, candidate_rx) = mpsc::channel::<PoolCandidate>(256);
        let discovery = DiscoveryRunner::new(&cfg).spawn(candidate_tx);

        let candidate_pump = {
            let decision_engine = decision_engine.clone();
            let buffer_ttl = Duration::from_millis(cfg.candidate_buffer_ttl_ms);
            let buffer_capacity = cfg.candidate_buffer_capacity;
            tokio::spawn(Self::run_candidate_pump(candidate_rx, decision_engine, buffer_ttl, buffer_capacity))
        };

        let price_ticker = {
            let decision_engine = decision_engine.clone();
            let gateway = gateway.clone();
            let base_mint = cfg.base_mint.clone();
            let interval = Duration::from_millis(cfg.price_poll_interval_ms);
            tokio::spawn(Self::run_price_ticker(decision_engine, gateway, base_mint, run_mode, interval))
        };

        let optimizer = SelfTuningController::new(
            decision_engine.clone(),
            journal,
            decision_log,
            Duration::from_secs(cfg.optimizer_first_tick_secs),
            Duration::from_secs(cfg.optimizer_tick_interval_secs),
            cfg.engine_params_path.clone(),
        )
        .spawn();

        info!(mode = %run_mode, "engine started");

        Ok(Self {
            mode: run_mode,
            decision_engine,
            gateway,
            wallet_pubkey,
            tasks: RunningTasks { discovery, candidate_pump, price_ticker, optimizer },
        })
    }

    /// De-dup, validate, and forward each discovered candidate to the
    /// Decision Engine. Incoming candidates sit in a short TTL+dedup buffer so that
    /// a burst of near-simultaneous log entries for the same mint collapses
    /// to one forward; the buffer drains on a fixed tick rather than on
    /// every push, so duplicates arriving within the same tick are actually
    /// caught rather than popped back out immediately.
    async fn run_candidate_pump(
        mut rx: mpsc::Receiver<PoolCandidate>,
        decision_engine: Arc<DecisionEngine>,
        buffer_ttl: Duration,
        buffer_capacity: usize,
    ) {
        let validator = SecurityValidator::new();
        let mut buffer = CandidateBuffer::new(buffer_ttl, buffer_capacity);
        let mut drain = tokio::time::interval(buffer_ttl);

        loop {
            tokio::select! {
                received = rx.recv() => {
                    match received {
                        Some(candidate) => { buffer.push(candidate); }
                        None => break,
                    }
                }
                _ = drain.tick() => {
                    Self::drain_candidate_buffer(&mut buffer, &validator, &decision_engine).await;
                }
            }
        }
        Self::drain_candidate_buffer(&mut buffer, &validator, &decision_engine).await;
    }

    async fn drain_candidate_buffer(
        buffer: &mut CandidateBuffer,
        validator: &SecurityValidator,
        decision_engine: &Arc<DecisionEngine>,
    ) {
        while let Some(candidate) = buffer.pop_best() {
            let result = validator.validate_candidate(&candidate);
            if result.has_critical_issues() {
                warn!(token_id = %candidate.token_id, issues = ?result.issues, "candidate rejected by security validator");
                continue;
            }
            if !validator.check_mint_rate_limit(&candidate.token_id.pubkey()) {
                warn!(token_id = %candidate.token_id, "candidate dropped, mint rate limit exceeded");
                continue;
            }
            decision_engine.process_candidate(candidate).await;
        }
    }

    /// Feed every held token a fresh price on a fixed cadence. In `Real`
    /// mode this re-quotes through the gateway, deriving the implied price
    /// the same way the buy price is derived, from the quote's
    /// `out_amount`, so buy/sell comparisons stay self-consistent against
    /// one quoting mechanism. In `Sim` mode there is no live market to
    /// quote against, so the synthetic price is `buy_price ·
    /// sell_multiplier` -- the take-profit exit price a simulated trade is
    /// defined to realize.
    async fn run_price_ticker(
        decision_engine: Arc<DecisionEngine>,
        gateway: Arc<dyn ExecutionGateway>,
        base_mint: String,
        mode: RunMode,
        interval: Duration,
    ) {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            match mode {
                RunMode::Sim => {
                    let sell_multiplier = decision_engine.current_params().sell_multiplier;
                    for (token_id, buy_price) in decision_engine.held_positions().await {
                        let price = buy_price * sell_multiplier;
                        decision_engine.observe_price(token_id, price).await;
                    }
                }
                RunMode::Real => {
                    for token_id in decision_engine.held_token_ids().await {
                        let probe_amount_native = 0.01;
                        let probe_amount_base = (probe_amount_native * 1_000_000_000.0).round() as u64;
                        match gateway
                            .quote(&base_mint, &token_id.to_string(), probe_amount_base, DEFAULT_SLIPPAGE_BPS)
                            .await
                        {
                            Ok(quote) if quote.out_amount > 0 => {
                                let price = probe_amount_native / quote.out_amount as f64;
                                decision_engine.observe_price(token_id, price).await;
                            }
                            Ok(_) => {}
                            Err(e) => {
                                warn!(token_id = %token_id, error = %e, "price tick quote failed");
                                crate::execution_gateway::rate_limit_backoff(&e).await;
                            }
                        }
                    }
                }
            }

            Self::check_creator_sells(&decision_engine, &gateway).await;
        }
    }

    /// Third exit trigger: a creator wallet recently transacting against
    /// its own token's mint. Checked on the same cadence as the price
    /// ticker; a no-op under [`crate::execution_gateway::SimGateway`],
    /// which has no chain to watch.
    async fn check_creator_sells(decision_engine: &Arc<DecisionEngine>, gateway: &Arc<dyn ExecutionGateway>) {
        for (token_id, creator_wallets) in decision_engine.held_creator_wallets().await {
            for wallet in creator_wallets {
                match gateway.creator_recently_sold(&wallet.to_string(), &token_id.to_string()).await {
                    Ok(true) => {
                        info!(token_id = %token_id, wallet = %wallet, "creator sell detected");
                        decision_engine.notify_creator_sell(token_id).await;
                        break;
                    }
                    Ok(false) => {}
                    Err(e) => {
                        warn!(token_id = %token_id, wallet = %wallet, error = %e, "creator-sell check failed");
                        crate::execution_gateway::rate_limit_backoff(&e).await;
                    }
                }
            }
        }
    }

    /// Force-sell every held position.
    pub async fn liquidate_all(&self) {
        self.decision_engine.liquidate_all().await;
    }

    /// Write one Engine parameter.
    pub fn set_param(&self, name: &str, value: f64) -> Result<(), ParamError> {
        self.decision_engine.set_param(name, value)
    }

    /// Current parameters, capital, and held-position count, plus a
    /// wallet-status snapshot, grounded on `order_executor.py::get_wallet_status`.
    pub async fn status(&self) -> serde_json::Value {
        let params = self.decision_engine.current_params();
        let capital = self.decision_engine.capital_snapshot().await;
        let held = self.decision_engine.held_count().await;
        let balance_lamports = self.gateway.get_balance(&self.wallet_pubkey).await.unwrap_or_default();

        json!({
            "mode": self.mode.to_string(),
            "wallet_pubkey": self.wallet_pubkey,
            "wallet_balance_lamports": balance_lamports,
            "available_capital_native": capital,
            "held_positions": held,
            "params": {
                "buy_amount_native": params.buy_amount_native,
                "sell_multiplier": params.sell_multiplier,
                "trailing_stop_fraction": params.trailing_stop_fraction,
            },
        })
    }

    /// Force-liquidate every position, then stop every background task.
    pub async fn stop(self) {
        self.decision_engine.liquidate_all().await;
        self.tasks.abort_all();
    }
}
