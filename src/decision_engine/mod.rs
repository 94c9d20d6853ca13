//! Decision Engine: the actor-per-token state machine that
//! admits candidates, holds positions, and exits them. Grounded on
//! `decision_module.py`'s `process_new_token_candidate` (admission),
//! `evaluate_held_tokens_for_sale`/`_execute_sale` (exit, now pushed into
//! [`actor`]), `sell_all_tokens` (forced liquidation), and `set_param`.

pub mod actor;
pub mod ledger;
pub mod observer;

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{watch, Mutex};
use tracing::{info, warn};

use crate::creator_cache::CreatorCache;
use crate::decision_engine::actor::{
    native_to_base_units, spawn_actor, ActorEvent, HeldMap, Slot, TokenActorDeps, DEFAULT_SLIPPAGE_BPS,
};
use crate::decision_engine::ledger::CapitalLedger;
use crate::decision_engine::observer::TradeObserver;
use crate::execution_gateway::ExecutionGateway;
use crate::journal::Journal;
use crate::safety_probe::SafetyProbe;
use crate::structured_logging::PipelineContext;
use crate::types::{now_secs, EngineParams, ParamError, PoolCandidate, Position, RunMode, TokenId, TradeKind, TradeRecord};

const MIN_BALANCE_HEADROOM_NATIVE: f64 = 0.001;

pub struct DecisionEngineConfig {
    pub base_mint: String,
    pub wallet_pubkey: String,
    pub mode: RunMode,
    pub initial_capital_native: f64,
    /// Process uptime after which an untrusted creator's token is rejected
    /// outright.
    pub exploitation_phase_secs: u64,
    pub initial_params: EngineParams,
}

/// Owns every in-flight [`Position`] and the shared state admission/exit
/// reads from. One instance per [`crate::engine::Engine`].
pub struct DecisionEngine {
    held: HeldMap,
    gateway: Arc<dyn ExecutionGateway>,
    safety_probe: Arc<SafetyProbe>,
    creator_cache: Arc<CreatorCache>,
    journal: Arc<Journal>,
    capital: Arc<CapitalLedger>,
    observers: Arc<Vec<Arc<dyn TradeObserver>>>,
    params_tx: watch::Sender<EngineParams>,
    params_rx: watch::Receiver<EngineParams>,
    base_mint: String,
    wallet_pubkey: String,
    mode: RunMode,
    started_at: std::time::Instant,
    exploitation_phase_secs: u64,
}

impl DecisionEngine {
    pub fn new(
        cfg: DecisionEngineConfig,
        gateway: Arc<dyn ExecutionGateway>,
        safety_probe: Arc<SafetyProbe>,
        creator_cache: Arc<CreatorCache>,
        journal: Arc<Journal>,
        observers: Vec<Arc<dyn TradeObserver>>,
    ) -> Self {
        let (params_tx, params_rx) = watch::channel(cfg.initial_params);
        Self {
            held: Arc::new(Mutex::new(HashMap::new())),
            gateway,
            safety_probe,
            creator_cache,
            journal,
            capital: Arc::new(CapitalLedger::new(cfg.initial_capital_native)),
            observers: Arc::new(observers),
            params_tx,
            params_rx,
            base_mint: cfg.base_mint,
            wallet_pubkey: cfg.wallet_pubkey,
            mode: cfg.mode,
            started_at: std::time::Instant::now(),
            exploitation_phase_secs: cfg.exploitation_phase_secs,
        }
    }

    fn in_exploitation_phase(&self) -> bool {
        self.started_at.elapsed().as_secs() < self.exploitation_phase_secs
    }

    pub async fn capital_snapshot(&self) -> f64 {
        self.capital.snapshot().await
    }

    pub async fn held_count(&self) -> usize {
        self.held.lock().await.len()
    }

    /// Token ids with a live actor (excludes in-flight `Slot::Reserved`
    /// admissions). Used by the price-ticker to know what to re-quote.
    pub async fn held_token_ids(&self) -> Vec<TokenId> {
        self.held
            .lock()
            .await
            .iter()
            .filter_map(|(id, slot)| match slot {
                Slot::Actor(_) => Some(*id),
                Slot::Reserved => None,
            })
            .collect()
    }

    /// Token ids with a live actor, paired with each position's entry
    /// price. Used by the price-ticker to derive SIM-mode synthetic
    /// prices without a network round-trip.
    pub async fn held_positions(&self) -> Vec<(TokenId, f64)> {
        self.held
            .lock()
            .await
            .iter()
            .filter_map(|(id, slot)| match slot {
                Slot::Actor(handle) => Some((*id, handle.buy_price)),
                Slot::Reserved => None,
            })
            .collect()
    }

    /// Token ids with a live actor, paired with each position's creator
    /// wallets. Used by the creator-sell watcher.
    pub async fn held_creator_wallets(&self) -> Vec<(TokenId, std::collections::BTreeSet<crate::types::WalletId>)> {
        self.held
            .lock()
            .await
            .iter()
            .filter_map(|(id, slot)| match slot {
                Slot::Actor(handle) => Some((*id, handle.creator_wallets.clone())),
                Slot::Reserved => None,
            })
            .collect()
    }

    pub fn current_params(&self) -> EngineParams {
        *self.params_rx.borrow()
    }

    /// Write one parameter (UI or the Self-Tuning Controller). Writes are
    /// serialized by `&self` taking no lock itself; `watch::Sender::send`
    /// is already atomic with respect to concurrent readers.
    pub fn set_param(&self, name: &str, value: f64) -> Result<(), ParamError> {
        let mut params = *self.params_rx.borrow();
        params.set_param(name, value)?;
        let _ = self.params_tx.send(params);
        Ok(())
    }

    async fn reject(&self, token_id: TokenId, reason: &'static str) {
        warn!(token_id = %token_id, reason, "candidate rejected");
        for observer in self.observers.iter() {
            observer.on_reject(token_id, reason).await;
        }
    }

    /// Entry point for every [`PoolCandidate`] surfaced by the Pair
    /// Discovery Pipeline. `Position::buy_price` is derived
    /// from the buy quote itself rather than supplied externally, so it is
    /// consistent with the price basis later exit quotes are measured
    /// against.
    pub async fn process_candidate(&self, candidate: PoolCandidate) {
        let token_id = candidate.token_id;
        let ctx = PipelineContext::new("decision_engine");

        {
            let mut held = self.held.lock().await;
            if held.contains_key(&token_id) {
                drop(held);
                self.reject(token_id, "already_held").await;
                ctx.logger.log_admission_decision(&token_id.to_string(), false, Some("already_held"));
                return;
            }
            held.insert(token_id, Slot::Reserved);
        }

        match self.run_admission(&candidate, &ctx).await {
            Ok(position) => {
                ctx.logger.log_admission_decision(&token_id.to_string(), true, None);
                let deps = TokenActorDeps {
                    gateway: self.gateway.clone(),
                    base_mint: self.base_mint.clone(),
                    wallet_pubkey: self.wallet_pubkey.clone(),
                    mode: self.mode,
                    journal: self.journal.clone(),
                    creator_cache: self.creator_cache.clone(),
                    capital: self.capital.clone(),
                    observers: self.observers.clone(),
                    held: self.held.clone(),
                };
                let handle = spawn_actor(position, self.params_rx.clone(), deps);
                self.held.lock().await.insert(token_id, Slot::Actor(handle));
            }
            Err(reason) => {
                self.held.lock().await.remove(&token_id);
                ctx.logger.log_admission_decision(&token_id.to_string(), false, Some(reason));
                self.reject(token_id, reason).await;
            }
        }
    }

    /// Runs the full admission procedure; the held-check is already
    /// enforced by the reservation above.
    async fn run_admission(&self, candidate: &PoolCandidate, ctx: &PipelineContext) -> Result<Position, &'static str> {
        let params = self.current_params();

        if self.mode == RunMode::Sim {
            // Unconditional admit: steps 3-7 bypassed.
            self.capital.reserve_unconditional(params.buy_amount_native).await;
            return self.execute_buy(candidate, params, ctx).await;
        }

        let trusted_creator = self.creator_cache.contains(&candidate.creator).await;

        if !trusted_creator {
            if self.in_exploitation_phase() {
                return Err("exploitation_phase_untrusted_creator");
            }

            let report = self.safety_probe.evaluate(candidate.token_id).await;
            if let Some(reason) = report.rejection_reason() {
                return Err(reason);
            }

            let balance_lamports = match self.gateway.get_balance(&self.wallet_pubkey).await {
                Ok(b) => b,
                Err(e) => {
                    crate::execution_gateway::rate_limit_backoff(&e).await;
                    return Err("balance_lookup_failed");
                }
            };
            let balance_native = balance_lamports as f64 / 1_000_000_000.0;
            if balance_native < params.buy_amount_native + MIN_BALANCE_HEADROOM_NATIVE {
                return Err("insufficient_balance");
            }

            if !self.capital.try_reserve(params.buy_amount_native).await {
                return Err("insufficient_capital");
            }
        } else {
            self.capital.reserve_unconditional(params.buy_amount_native).await;
        }

        self.execute_buy(candidate, params, ctx).await
    }

    async fn execute_buy(
        &self,
        candidate: &PoolCandidate,
        params: EngineParams,
        ctx: &PipelineContext,
    ) -> Result<Position, &'static str> {
        let token_id = candidate.token_id;
        let base_amount = native_to_base_units(params.buy_amount_native);
        ctx.logger.log_buy_attempt(&token_id.to_string(), params.buy_amount_native);

        let quote = match self.gateway.quote(&self.base_mint, &token_id.to_string(), base_amount, DEFAULT_SLIPPAGE_BPS).await {
            Ok(q) => q,
            Err(e) => {
                crate::execution_gateway::rate_limit_backoff(&e).await;
                self.capital.release(params.buy_amount_native).await;
                ctx.logger.log_buy_failure(&token_id.to_string(), &e.to_string(), 0);
                self.record_buy_failed(token_id, &e.to_string()).await;
                return Err("quote_failed");
            }
        };

        // Price basis for the whole position: native paid per unit of
        // token received, measured against the same quote the swap was
        // built from.
        let buy_price = if quote.out_amount > 0 {
            params.buy_amount_native / quote.out_amount as f64
        } else {
            0.0
        };

        match self.gateway.swap(&quote, &self.wallet_pubkey).await {
            Ok(outcome) => {
                let mut creator_wallets = std::collections::BTreeSet::new();
                creator_wallets.insert(candidate.creator);
                let position = Position::new(token_id, buy_price, params.buy_amount_native, creator_wallets);

                let record = TradeRecord {
                    kind: TradeKind::Buy,
                    token_id,
                    price: buy_price,
                    amount_native: params.buy_amount_native,
                    timestamp: now_secs(),
                    mode: self.mode,
                    forced: false,
                };
                if let Err(e) = self.journal.append(&record).await {
                    warn!(token_id = %token_id, error = %e, "failed to append buy record to journal");
                }
                for observer in self.observers.iter() {
                    observer.on_buy(&record).await;
                }

                info!(token_id = %token_id, buy_price, "admitted and bought");
                ctx.logger.log_buy_success(&token_id.to_string(), &outcome.signature, 0);
                Ok(position)
            }
            Err(e) => {
                crate::execution_gateway::rate_limit_backoff(&e).await;
                self.capital.release(params.buy_amount_native).await;
                ctx.logger.log_buy_failure(&token_id.to_string(), &e.to_string(), 0);
                self.record_buy_failed(token_id, &e.to_string()).await;
                Err("swap_failed")
            }
        }
    }

    async fn record_buy_failed(&self, token_id: TokenId, reason: &str) {
        let record = TradeRecord {
            kind: TradeKind::BuyFailed { reason: reason.to_string() },
            token_id,
            price: 0.0,
            amount_native: 0.0,
            timestamp: now_secs(),
            mode: self.mode,
            forced: false,
        };
        if let Err(e) = self.journal.append(&record).await {
            warn!(token_id = %token_id, error = %e, "failed to append buy-failed record to journal");
        }
        for observer in self.observers.iter() {
            observer.on_buy(&record).await;
        }
    }

    /// Forward a newly observed price to the held token's actor, if any.
    pub async fn observe_price(&self, token_id: TokenId, price: f64) {
        let held = self.held.lock().await;
        if let Some(Slot::Actor(handle)) = held.get(&token_id) {
            let _ = handle.sender.send(ActorEvent::PriceUpdate(price)).await;
        }
    }

    /// Signal that the creator of `token_id` appears to have sold.
    pub async fn notify_creator_sell(&self, token_id: TokenId) {
        let held = self.held.lock().await;
        if let Some(Slot::Actor(handle)) = held.get(&token_id) {
            let _ = handle.sender.send(ActorEvent::CreatorSellDetected).await;
        }
    }

    /// Force-sell every held position regardless of exit conditions.
    pub async fn liquidate_all(&self) {
        let senders: Vec<_> = {
            let held = self.held.lock().await;
            held.values()
                .filter_map(|slot| match slot {
                    Slot::Actor(handle) => Some(handle.sender.clone()),
                    Slot::Reserved => None,
                })
                .collect()
        };
        for sender in senders {
            let _ = sender.send(ActorEvent::Liquidate).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution_gateway::SimGateway;
    use solana_sdk::{pubkey::Pubkey, signature::Keypair, signature::Signer};
    use std::time::Duration;

    static TEST_ID: std::sync::atomic::AtomicU64 = std::sync::atomic::AtomicU64::new(0);
    fn unique_suffix() -> u64 {
        TEST_ID.fetch_add(1, std::sync::atomic::Ordering::Relaxed)
    }

    fn mk_candidate(byte: u8) -> PoolCandidate {
        let mut b = [0u8; 32];
        b.fill(byte);
        PoolCandidate {
            token_id: TokenId::new(Pubkey::new_from_array(b)),
            creator: crate::types::WalletId::new(Keypair::new().pubkey()),
            slot: 1,
            timestamp: now_secs(),
            signature: "SIG".to_string(),
        }
    }

    async fn mk_engine() -> DecisionEngine {
        let gateway: Arc<dyn ExecutionGateway> = Arc::new(SimGateway::new(RunMode::Sim));
        let safety_probe = Arc::new(SafetyProbe::new(
            "http://127.0.0.1:1".to_string(),
            "So11111111111111111111111111111111111111112".to_string(),
            gateway.clone(),
            Duration::from_millis(50),
            Duration::from_secs(300),
        ));
        let id = unique_suffix();
        let journal = Arc::new(Journal::new(
            std::env::temp_dir().join(format!("decision_engine_test_sim_{id}.jsonl")),
            std::env::temp_dir().join(format!("decision_engine_test_real_{id}.jsonl")),
        ));
        let creator_cache = Arc::new(
            CreatorCache::load(std::env::temp_dir().join(format!("decision_engine_test_cache_{id}.json"))).await,
        );
        DecisionEngine::new(
            DecisionEngineConfig {
                base_mint: "So11111111111111111111111111111111111111112".to_string(),
                wallet_pubkey: "11111111111111111111111111111111111111111".to_string(),
                mode: RunMode::Sim,
                initial_capital_native: 10.0,
                exploitation_phase_secs: 3600,
                initial_params: EngineParams::default(),
            },
            gateway,
            safety_probe,
            creator_cache,
            journal,
            Vec::new(),
        )
    }

    async fn wait_until_not_held(engine: &DecisionEngine, token_id: TokenId) {
        for _ in 0..50 {
            if !engine.held_token_ids().await.contains(&token_id) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("token {token_id} was never released");
    }

    #[tokio::test]
    async fn sim_mode_unconditionally_admits_and_holds() {
        let engine = mk_engine().await;
        let candidate = mk_candidate(1);
        engine.process_candidate(candidate).await;
        assert_eq!(engine.held_count().await, 1);
    }

    #[tokio::test]
    async fn duplicate_candidate_for_held_token_is_rejected() {
        let engine = mk_engine().await;
        let candidate = mk_candidate(2);
        engine.process_candidate(candidate.clone()).await;
        engine.process_candidate(candidate).await;
        assert_eq!(engine.held_count().await, 1);
    }

    #[tokio::test]
    async fn take_profit_sells_and_frees_the_slot() {
        let engine = mk_engine().await;
        let candidate = mk_candidate(3);
        let token_id = candidate.token_id;
        engine.process_candidate(candidate).await;
        assert_eq!(engine.held_count().await, 1);

        let sell_multiplier = engine.current_params().sell_multiplier;
        let buy_amount = engine.current_params().buy_amount_native;
        let buy_price = buy_amount / native_to_base_units(buy_amount) as f64;
        engine.observe_price(token_id, buy_price * (sell_multiplier + 0.1)).await;

        wait_until_not_held(&engine, token_id).await;
        assert_eq!(engine.held_count().await, 0);
    }

    #[tokio::test]
    async fn trailing_stop_sells_after_a_retreat_from_the_peak() {
        let engine = mk_engine().await;
        let candidate = mk_candidate(6);
        let token_id = candidate.token_id;
        engine.process_candidate(candidate).await;

        let params = engine.current_params();
        let buy_price = params.buy_amount_native / native_to_base_units(params.buy_amount_native) as f64;

        // Run the price up (short of the take-profit multiple) to set a
        // high-water mark, then retreat past the trailing-stop fraction.
        let peak = buy_price * (params.sell_multiplier - 0.2);
        engine.observe_price(token_id, peak).await;
        engine.observe_price(token_id, peak * (1.0 - params.trailing_stop_fraction - 0.05)).await;

        wait_until_not_held(&engine, token_id).await;
        assert_eq!(engine.held_count().await, 0);
    }

    #[tokio::test]
    async fn price_within_band_does_not_trigger_a_sell() {
        let engine = mk_engine().await;
        let candidate = mk_candidate(7);
        let token_id = candidate.token_id;
        engine.process_candidate(candidate).await;

        let params = engine.current_params();
        let buy_price = params.buy_amount_native / native_to_base_units(params.buy_amount_native) as f64;

        // A mild gain, well short of the take-profit multiple and not a
        // retreat from any peak: no exit condition fires.
        engine.observe_price(token_id, buy_price * 1.05).await;
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(engine.held_count().await, 1);
    }

    #[tokio::test]
    async fn liquidate_all_clears_every_held_token() {
        let engine = mk_engine().await;
        engine.process_candidate(mk_candidate(4)).await;
        engine.process_candidate(mk_candidate(5)).await;
        assert_eq!(engine.held_count().await, 2);

        engine.liquidate_all().await;
        for _ in 0..50 {
            if engine.held_count().await == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(engine.held_count().await, 0);
    }

    #[tokio::test]
    async fn real_mode_rejects_an_untrusted_creator_with_a_conservative_safety_report() {
        // REAL mode, past the exploitation phase, with an unreachable
        // safety-oracle URL: the conservative all-negative report
        // (is_honeypot = true) rejects the candidate outright.
        let gateway: Arc<dyn ExecutionGateway> = Arc::new(SimGateway::new(RunMode::Real));
        let safety_probe = Arc::new(SafetyProbe::new(
            "http://127.0.0.1:1".to_string(),
            "So11111111111111111111111111111111111111112".to_string(),
            gateway.clone(),
            Duration::from_millis(50),
            Duration::from_secs(300),
        ));
        let id = unique_suffix();
        let journal = Arc::new(Journal::new(
            std::env::temp_dir().join(format!("decision_engine_test_sim_real_{id}.jsonl")),
            std::env::temp_dir().join(format!("decision_engine_test_real_real_{id}.jsonl")),
        ));
        let creator_cache = Arc::new(
            CreatorCache::load(std::env::temp_dir().join(format!("decision_engine_test_cache_real_{id}.json"))).await,
        );
        let engine = DecisionEngine::new(
            DecisionEngineConfig {
                base_mint: "So11111111111111111111111111111111111111112".to_string(),
                wallet_pubkey: "11111111111111111111111111111111111111111".to_string(),
                mode: RunMode::Real,
                initial_capital_native: 10.0,
                exploitation_phase_secs: 0,
                initial_params: EngineParams::default(),
            },
            gateway,
            safety_probe,
            creator_cache,
            journal,
            Vec::new(),
        );

        engine.process_candidate(mk_candidate(8)).await;
        assert_eq!(engine.held_count().await, 0);
    }
}
