//! Per-token actor: owns
//! one [`Position`] exclusively for its lifetime and drives the exit
//! evaluation / sell procedure in response to events on its private
//! channel. Grounded on `decision_module.py::evaluate_held_tokens_for_sale`
//! and `_execute_sale`, rewritten as a `tokio::spawn`'d task instead of a
//! per-tick scan over a shared dict so a slow sell on one token can never
//! delay another token's exit check.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::creator_cache::CreatorCache;
use crate::decision_engine::ledger::CapitalLedger;
use crate::decision_engine::observer::TradeObserver;
use crate::execution_gateway::ExecutionGateway;
use crate::journal::Journal;
use crate::structured_logging::PipelineContext;
use crate::types::{now_secs, EngineParams, Position, RunMode, TokenId, TradeKind, TradeRecord};

/// Slippage tolerance applied to every quote/swap call (buy, sell, and the
/// price-ticker's probe quote all share it).
pub const DEFAULT_SLIPPAGE_BPS: u16 = 300;
const LAMPORTS_PER_SOL: f64 = 1_000_000_000.0;

pub fn native_to_base_units(native: f64) -> u64 {
    (native * LAMPORTS_PER_SOL).round() as u64
}

pub fn base_units_to_native(units: u64) -> f64 {
    units as f64 / LAMPORTS_PER_SOL
}

/// One slot in the held-token map: `Reserved` closes the race between the
/// held-check and the admission procedure; `Actor` is a live per-token task.
pub enum Slot {
    Reserved,
    Actor(ActorHandle),
}

pub type HeldMap = Arc<Mutex<HashMap<TokenId, Slot>>>;

pub struct ActorHandle {
    pub sender: mpsc::Sender<ActorEvent>,
    pub join: JoinHandle<()>,
    /// The position's entry price, fixed for its lifetime; read by the
    /// price-ticker to derive SIM-mode synthetic prices.
    pub buy_price: f64,
    /// The position's creator wallets, fixed for its lifetime; read by the
    /// creator-sell watcher.
    pub creator_wallets: std::collections::BTreeSet<crate::types::WalletId>,
}

#[derive(Debug, Clone)]
pub enum ActorEvent {
    /// A freshly observed price for this token.
    PriceUpdate(f64),
    /// The creator wallet liquidated its position. Checked externally and sparingly, since it is an
    /// on-chain lookup; delivered here as an event rather than polled.
    CreatorSellDetected,
    /// Forced exit regardless of exit conditions.
    Liquidate,
}

pub struct TokenActorDeps {
    pub gateway: Arc<dyn ExecutionGateway>,
    pub base_mint: String,
    pub wallet_pubkey: String,
    pub mode: RunMode,
    pub journal: Arc<Journal>,
    pub creator_cache: Arc<CreatorCache>,
    pub capital: Arc<CapitalLedger>,
    pub observers: Arc<Vec<Arc<dyn TradeObserver>>>,
    pub held: HeldMap,
}

struct TokenActor {
    position: Position,
    params_rx: watch::Receiver<EngineParams>,
    deps: TokenActorDeps,
}

/// Spawn the actor owning `position`, registering it in `held` under
/// `Slot::Actor` (replacing whatever `Slot::Reserved` placeholder the
/// admission procedure left there).
pub fn spawn_actor(position: Position, params_rx: watch::Receiver<EngineParams>, deps: TokenActorDeps) -> ActorHandle {
    let buy_price = position.buy_price;
    let creator_wallets = position.creator_wallets.clone();
    let (tx, rx) = mpsc::channel(32);
    let actor = TokenActor { position, params_rx, deps };
    let join = tokio::spawn(actor.run(rx));
    ActorHandle { sender: tx, join, buy_price, creator_wallets }
}

impl TokenActor {
    async fn run(mut self, mut rx: mpsc::Receiver<ActorEvent>) {
        let token_id = self.position.token_id;
        while let Some(event) = rx.recv().await {
            let sold = match event {
                ActorEvent::PriceUpdate(price) => {
                    self.position.observe_price(price);
                    let params = *self.params_rx.borrow();
                    let trigger = if price / self.position.buy_price >= params.sell_multiplier {
                        Some("take_profit")
                    } else if price < self.position.max_price_seen * (1.0 - params.trailing_stop_fraction) {
                        Some("trailing_stop")
                    } else {
                        None
                    };
                    match trigger {
                        Some(reason) => self.sell(reason, false).await,
                        None => false,
                    }
                }
                ActorEvent::CreatorSellDetected => self.sell("creator_sell", false).await,
                ActorEvent::Liquidate => self.sell("forced_liquidation", true).await,
            };
            if sold {
                break;
            }
        }
        self.deps.held.lock().await.remove(&token_id);
    }

    /// Sell the full position. Returns `true` on success (the actor should
    /// stop); `false` retains the position so the next event re-enters the
    /// exit check.
    async fn sell(&mut self, reason: &str, forced: bool) -> bool {
        let sell_amount_base = native_to_base_units(self.position.buy_amount_native);

        let quote = match self
            .deps
            .gateway
            .quote(&self.position.token_id.to_string(), &self.deps.base_mint, sell_amount_base, DEFAULT_SLIPPAGE_BPS)
            .await
        {
            Ok(q) => q,
            Err(e) => {
                warn!(token_id = %self.position.token_id, reason, error = %e, "sell quote failed, retaining position");
                crate::execution_gateway::rate_limit_backoff(&e).await;
                return false;
            }
        };

        let outcome = match self.deps.gateway.swap(&quote, &self.deps.wallet_pubkey).await {
            Ok(o) => o,
            Err(e) => {
                warn!(token_id = %self.position.token_id, reason, error = %e, "sell swap failed, retaining position");
                crate::execution_gateway::rate_limit_backoff(&e).await;
                return false;
            }
        };

        let received_native = base_units_to_native(outcome.received_out);
        let realized_multiple = if self.position.buy_amount_native > 0.0 {
            received_native / self.position.buy_amount_native
        } else {
            0.0
        };

        let record = TradeRecord {
            kind: TradeKind::Sell,
            token_id: self.position.token_id,
            price: self.position.max_price_seen,
            amount_native: received_native,
            timestamp: now_secs(),
            mode: self.deps.mode,
            forced,
        };

        if let Err(e) = self.deps.journal.append(&record).await {
            warn!(token_id = %self.position.token_id, error = %e, "failed to append sell record to journal");
        }
        for observer in self.deps.observers.iter() {
            observer.on_sell(&record).await;
        }

        self.deps.capital.release(received_native).await;

        // Trusted-creator promotion: a SIM-mode sale that hit the profit
        // multiple within the hour marks its creator wallets as trusted.
        if self.deps.mode == RunMode::Sim {
            let duration = now_secs().saturating_sub(self.position.buy_timestamp);
            let params = *self.params_rx.borrow();
            if duration < 3600 && realized_multiple >= params.sell_multiplier {
                for creator in &self.position.creator_wallets {
                    if let Err(e) = self.deps.creator_cache.insert(*creator).await {
                        warn!(wallet = %creator, error = %e, "failed to persist trusted creator");
                    }
                }
            }
        }

        info!(
            token_id = %self.position.token_id, reason, realized_multiple, forced,
            "sold position"
        );
        PipelineContext::new("decision_engine_sell").logger.log_sell(
            &self.position.token_id.to_string(),
            reason,
            realized_multiple,
            forced,
        );
        true
    }
}
