//! Self-Tuning Controller: periodically reviews simulation
//! trades and nudges [`EngineParams`] toward whatever has historically
//! performed best, freezing itself once performance is stable and rolling
//! back when it isn't.
//!
//! Grounded near line-for-line on `ai_auto_optimizer.py`'s
//! `analyze_and_adjust`/`_check_and_apply_rollback` (aggregate computation,
//! freeze/unfreeze hysteresis, strategy-profile rotation, drawdown guard,
//! winrate-driven mutation, random exploration, rollback, loss/win streak),
//! rewritten from its thread-and-sleep loop into a `tokio::spawn`'d periodic
//! task.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{info, warn};

use crate::decision_engine::DecisionEngine;
use crate::journal::{DecisionLog, Journal, OptimizerDecision};
use crate::structured_logging::StructuredLogger;
use crate::types::{now_secs, EngineParams, RunMode, TokenId, TradeKind, TradeRecord};

struct StrategyProfile {
    name: &'static str,
    buy_factor: f64,
    sell_add: f64,
}

const STRATEGY_PROFILES: [StrategyProfile; 3] = [
    StrategyProfile { name: "conservative", buy_factor: 0.8, sell_add: 0.1 },
    StrategyProfile { name: "aggressive", buy_factor: 1.2, sell_add: -0.05 },
    StrategyProfile { name: "balanced", buy_factor: 1.0, sell_add: 0.0 },
];

const PROFILE_SWITCH_PROBABILITY: f64 = 0.15;
const MUTATION_PROBABILITY: f64 = 0.10;
const FREEZE_WINRATE: f64 = 0.70;
const FREEZE_DRAWDOWN: f64 = 0.10;
const FREEZE_PROFIT: f64 = 0.5;
const UNFREEZE_WINRATE: f64 = 0.60;
const UNFREEZE_DRAWDOWN: f64 = 0.15;
const UNFREEZE_PROFIT_FRACTION: f64 = 0.8;
const HIGH_DRAWDOWN: f64 = 0.2;
const LOW_WINRATE: f64 = 0.4;
const HIGH_WINRATE: f64 = 0.7;
const ROLLBACK_PROFIT_FRACTION: f64 = 0.5;
const LOSS_STREAK_THRESHOLD: u32 = 3;

#[derive(Debug, Default, Clone, Copy)]
struct Aggregates {
    profit: f64,
    winrate: f64,
    avg_profit: f64,
    volatility: f64,
    drawdown: f64,
}

/// Mutable tuning state, owned exclusively by the controller's task and
/// persisted to a single JSON blob across restarts.
#[derive(Serialize, Deserialize)]
struct TuningState {
    best_params: Option<EngineParams>,
    best_profit: f64,
    freeze: bool,
    rollback_count: u64,
    loss_streak: u32,
    win_streak: u32,
    last_profit: f64,
    max_drawdown: f64,
    current_profile: usize,
}

impl Default for TuningState {
    fn default() -> Self {
        Self {
            best_params: None,
            best_profit: f64::NEG_INFINITY,
            freeze: false,
            rollback_count: 0,
            loss_streak: 0,
            win_streak: 0,
            last_profit: 0.0,
            max_drawdown: 0.0,
            current_profile: 2,
        }
    }
}

pub struct SelfTuningController {
    decision_engine: Arc<DecisionEngine>,
    journal: Arc<Journal>,
    decision_log: Arc<DecisionLog>,
    first_tick: Duration,
    tick_interval: Duration,
    state_path: PathBuf,
}

impl SelfTuningController {
    pub fn new(
        decision_engine: Arc<DecisionEngine>,
        journal: Arc<Journal>,
        decision_log: Arc<DecisionLog>,
        first_tick: Duration,
        tick_interval: Duration,
        state_path: impl Into<PathBuf>,
    ) -> Self {
        Self { decision_engine, journal, decision_log, first_tick, tick_interval, state_path: state_path.into() }
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move { self.run().await })
    }

    /// Load persisted tuning state, or start fresh if the file is absent or
    /// malformed.
    async fn load_state(&self) -> TuningState {
        match tokio::fs::read_to_string(&self.state_path).await {
            Ok(contents) => serde_json::from_str(&contents).unwrap_or_default(),
            Err(_) => TuningState::default(),
        }
    }

    /// Write-to-temp-then-rename so a reader never observes a half-written
    /// state file.
    async fn persist_state(&self, state: &TuningState) {
        let json = match serde_json::to_vec_pretty(state) {
            Ok(j) => j,
            Err(e) => {
                warn!(error = %e, "failed to serialize tuning state");
                return;
            }
        };
        let tmp_path = self.state_path.with_extension("json.tmp");
        if let Err(e) = tokio::fs::write(&tmp_path, &json).await {
            warn!(error = %e, "failed to write tuning state temp file");
            return;
        }
        if let Err(e) = tokio::fs::rename(&tmp_path, &self.state_path).await {
            warn!(error = %e, "failed to persist tuning state");
        }
    }

    async fn run(self) {
        let mut state = self.load_state().await;
        sleep(self.first_tick).await;
        loop {
            self.tick(&mut state).await;
            sleep(self.tick_interval).await;
        }
    }

    async fn tick(&self, state: &mut TuningState) {
        let trades = match self.journal.read_simulation().await {
            Ok(t) => t,
            Err(e) => {
                warn!(error = %e, "failed to read simulation journal for tuning tick");
                return;
            }
        };

        let agg = compute_aggregates(&trades);
        state.max_drawdown = state.max_drawdown.max(agg.drawdown);
        info!(
            profit = agg.profit, winrate = agg.winrate, volatility = agg.volatility, drawdown = agg.drawdown,
            "self-tuning tick"
        );
        StructuredLogger::new("optimizer").log_optimizer_tick(agg.profit, agg.winrate, agg.drawdown, state.freeze);

        let params = self.decision_engine.current_params();

        if agg.profit > state.best_profit {
            state.best_profit = agg.profit;
            state.best_params = Some(params);
            self.persist_state(state).await;
        }

        if !state.freeze && agg.winrate > FREEZE_WINRATE && agg.drawdown < FREEZE_DRAWDOWN && agg.profit > FREEZE_PROFIT {
            state.freeze = true;
            info!("self-tuning controller frozen: performance stable");
        }
        if state.freeze
            && (agg.winrate < UNFREEZE_WINRATE
                || agg.drawdown > UNFREEZE_DRAWDOWN
                || agg.profit < state.best_profit * UNFREEZE_PROFIT_FRACTION)
        {
            state.freeze = false;
            warn!("self-tuning controller unfrozen: performance degraded");
        }

        if !state.freeze {
            if fastrand::f64() < PROFILE_SWITCH_PROBABILITY {
                self.switch_profile(state).await;
            }

            let current = self.decision_engine.current_params();
            if agg.drawdown > HIGH_DRAWDOWN {
                self.apply(
                    "high drawdown",
                    "reduce_risk",
                    current,
                    &[
                        ("buy_amount_native", (current.buy_amount_native * 0.8).max(0.01)),
                        ("sell_multiplier", (current.sell_multiplier + 0.1).min(2.5)),
                    ],
                )
                .await;
            } else if agg.winrate < LOW_WINRATE {
                self.apply(
                    "low winrate",
                    "adjust_buy_amount",
                    current,
                    &[("buy_amount_native", (current.buy_amount_native * 0.9).max(0.01))],
                )
                .await;
            } else if agg.winrate > HIGH_WINRATE && agg.avg_profit > 0.0 {
                self.apply(
                    "high winrate and positive average profit",
                    "increase_risk",
                    current,
                    &[("buy_amount_native", (current.buy_amount_native * 1.1).min(2.0))],
                )
                .await;
            }

            if fastrand::f64() < MUTATION_PROBABILITY {
                let current = self.decision_engine.current_params();
                let factor = 0.95 + fastrand::f64() * 0.10;
                self.apply(
                    "random exploration",
                    "auto_tune",
                    current,
                    &[("buy_amount_native", (current.buy_amount_native * factor).max(0.01))],
                )
                .await;
            }
        }

        self.check_rollback(state, agg.profit).await;

        if agg.profit < state.last_profit {
            state.loss_streak += 1;
            state.win_streak = 0;
        } else if agg.profit > state.last_profit {
            state.win_streak += 1;
            state.loss_streak = 0;
        }

        if state.loss_streak >= LOSS_STREAK_THRESHOLD && !state.freeze {
            let current = self.decision_engine.current_params();
            self.apply(
                &format!("{} consecutive losses", state.loss_streak),
                "recovery_mode",
                current,
                &[
                    ("buy_amount_native", (current.buy_amount_native * 0.7).max(0.01)),
                    ("sell_multiplier", (current.sell_multiplier + 0.2).min(2.5)),
                ],
            )
            .await;
        }

        state.last_profit = agg.profit;
    }

    async fn switch_profile(&self, state: &mut TuningState) {
        let old_name = STRATEGY_PROFILES[state.current_profile].name;
        state.current_profile = (state.current_profile + 1) % STRATEGY_PROFILES.len();
        let profile = &STRATEGY_PROFILES[state.current_profile];
        let current = self.decision_engine.current_params();
        let new_buy = (current.buy_amount_native * profile.buy_factor).max(0.01);
        let new_sell = (current.sell_multiplier + profile.sell_add).clamp(1.0, 2.5);

        info!(from = old_name, to = profile.name, "switching strategy profile");
        self.apply(
            &format!("strategy exploration: switching to profile '{}'", profile.name),
            "switch_profile",
            current,
            &[("buy_amount_native", new_buy), ("sell_multiplier", new_sell)],
        )
        .await;
    }

    async fn check_rollback(&self, state: &mut TuningState, profit: f64) {
        let Some(best) = state.best_params else { return };
        if state.freeze || profit >= state.best_profit * ROLLBACK_PROFIT_FRACTION {
            return;
        }
        let current = self.decision_engine.current_params();
        state.rollback_count += 1;
        warn!(rollback_count = state.rollback_count, "rolling back to best-known parameters");
        self.apply(
            &format!(
                "performance drop (current profit {profit:.4} below 50% of best profit {:.4})",
                state.best_profit
            ),
            "rollback_to_best",
            current,
            &[
                ("buy_amount_native", best.buy_amount_native),
                ("sell_multiplier", best.sell_multiplier),
            ],
        )
        .await;
    }

    /// Apply each `(name, value)` write and record one [`OptimizerDecision`]
    /// capturing the net before/after parameter state.
    async fn apply(&self, reason: &str, action: &str, old_params: EngineParams, writes: &[(&str, f64)]) {
        StructuredLogger::new("optimizer").log_optimizer_mutation(reason);
        for (name, value) in writes {
            if let Err(e) = self.decision_engine.set_param(name, *value) {
                warn!(name, value, error = %e, "self-tuning controller rejected its own parameter write");
            }
        }
        let new_params = self.decision_engine.current_params();
        let entry = OptimizerDecision {
            timestamp: now_secs(),
            reason: reason.to_string(),
            action: action.to_string(),
            old_params,
            new_params,
        };
        if let Err(e) = self.decision_log.append(&entry).await {
            warn!(error = %e, "failed to append optimizer decision to decision log");
        }
    }
}

/// Pair each sell with the most recent unmatched buy for the same token,
/// mirroring `ai_auto_optimizer.py`'s `buy_prices` dict walk over the trade
/// log in arrival order.
fn compute_aggregates(trades: &[TradeRecord]) -> Aggregates {
    let mut buy_prices: HashMap<TokenId, f64> = HashMap::new();
    let mut profits: Vec<f64> = Vec::new();
    let mut equity = 0.0_f64;
    let mut peak = 0.0_f64;
    let mut max_dd = 0.0_f64;

    for trade in trades {
        match &trade.kind {
            TradeKind::Buy => {
                buy_prices.insert(trade.token_id, trade.price);
            }
            TradeKind::Sell => {
                if let Some(buy_price) = buy_prices.remove(&trade.token_id) {
                    let profit = trade.price - buy_price;
                    profits.push(profit);
                    equity += profit;
                    peak = peak.max(equity);
                    let dd = if peak > 0.0 { (peak - equity) / peak } else { 0.0 };
                    max_dd = max_dd.max(dd);
                }
            }
            TradeKind::BuyFailed { .. } => {}
        }
    }

    let total_profit: f64 = profits.iter().sum();
    let wins = profits.iter().filter(|p| **p > 0.0).count();
    let losses = profits.iter().filter(|p| **p <= 0.0).count();
    let total = wins + losses;
    let winrate = if total > 0 { wins as f64 / total as f64 } else { 0.0 };
    let avg_profit = if profits.is_empty() { 0.0 } else { total_profit / profits.len() as f64 };
    let volatility = if profits.is_empty() {
        0.0
    } else {
        (profits.iter().map(|p| (p - avg_profit).powi(2)).sum::<f64>() / profits.len() as f64).sqrt()
    };

    Aggregates { profit: total_profit, winrate, avg_profit, volatility, drawdown: max_dd }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::creator_cache::CreatorCache;
    use crate::decision_engine::{DecisionEngine, DecisionEngineConfig};
    use crate::execution_gateway::SimGateway;
    use crate::safety_probe::SafetyProbe;
    use solana_sdk::pubkey::Pubkey;
    use std::sync::atomic::{AtomicU64, Ordering};

    fn fixed_token(byte: u8) -> TokenId {
        let mut b = [0u8; 32];
        b.fill(byte);
        TokenId::new(Pubkey::new_from_array(b))
    }

    fn trade(kind: TradeKind, token_id: TokenId, price: f64) -> TradeRecord {
        TradeRecord { kind, token_id, price, amount_native: 0.1, timestamp: now_secs(), mode: RunMode::Sim, forced: false }
    }

    static TEST_ID: AtomicU64 = AtomicU64::new(0);
    fn unique_suffix() -> u64 {
        TEST_ID.fetch_add(1, Ordering::Relaxed)
    }

    async fn mk_controller() -> (SelfTuningController, Arc<Journal>) {
        let gateway = Arc::new(SimGateway::new(RunMode::Sim));
        let safety_probe = Arc::new(SafetyProbe::new(
            "http://127.0.0.1:1".to_string(),
            "So11111111111111111111111111111111111111112".to_string(),
            gateway.clone(),
            Duration::from_millis(200),
            Duration::from_secs(300),
        ));
        let id = unique_suffix();
        let journal = Arc::new(Journal::new(
            std::env::temp_dir().join(format!("optimizer_test_sim_{id}.jsonl")),
            std::env::temp_dir().join(format!("optimizer_test_real_{id}.jsonl")),
        ));
        let decision_log =
            Arc::new(DecisionLog::new(std::env::temp_dir().join(format!("optimizer_test_log_{id}.jsonl"))));
        let creator_cache =
            Arc::new(CreatorCache::load(std::env::temp_dir().join(format!("optimizer_test_cache_{id}.json"))).await);

        let decision_engine = Arc::new(DecisionEngine::new(
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
            journal.clone(),
            Vec::new(),
        ));

        (
            SelfTuningController::new(
                decision_engine,
                journal.clone(),
                decision_log,
                Duration::from_secs(3600),
                Duration::from_secs(1200),
                std::env::temp_dir().join(format!("optimizer_test_state_{id}.json")),
            ),
            journal,
        )
    }

    #[tokio::test]
    async fn freeze_engages_when_performance_is_strong() {
        let (controller, journal) = mk_controller().await;
        for byte in 1..=4u8 {
            journal.append(&trade(TradeKind::Buy, fixed_token(byte), 1.0)).await.unwrap();
            journal.append(&trade(TradeKind::Sell, fixed_token(byte), 2.0)).await.unwrap();
        }
        journal.append(&trade(TradeKind::Buy, fixed_token(5), 1.0)).await.unwrap();
        journal.append(&trade(TradeKind::Sell, fixed_token(5), 0.9)).await.unwrap();

        let mut state = TuningState::default();
        controller.tick(&mut state).await;

        assert!(state.freeze, "winrate 0.8 / drawdown 0.025 / profit 3.9 should engage the freeze");
    }

    #[tokio::test]
    async fn rollback_restores_best_known_params_after_a_profit_drop() {
        let (controller, journal) = mk_controller().await;
        let mut state = TuningState::default();

        // First tick: a middling result (winrate 0.5, no freeze) that
        // nonetheless records the engine's starting params as "best".
        journal.append(&trade(TradeKind::Buy, fixed_token(10), 1.0)).await.unwrap();
        journal.append(&trade(TradeKind::Sell, fixed_token(10), 2.0)).await.unwrap();
        journal.append(&trade(TradeKind::Buy, fixed_token(11), 1.0)).await.unwrap();
        journal.append(&trade(TradeKind::Sell, fixed_token(11), 0.8)).await.unwrap();
        controller.tick(&mut state).await;
        assert!(!state.freeze);
        let best = state.best_params.expect("first tick must record a best");

        // Second tick: a heavy loss drags cumulative profit below 50% of
        // the recorded best, forcing a rollback.
        journal.append(&trade(TradeKind::Buy, fixed_token(12), 1.0)).await.unwrap();
        journal.append(&trade(TradeKind::Sell, fixed_token(12), 0.0)).await.unwrap();
        controller.tick(&mut state).await;

        assert_eq!(state.rollback_count, 1);
        let restored = controller.decision_engine.current_params();
        assert_eq!(restored.buy_amount_native, best.buy_amount_native);
        assert_eq!(restored.sell_multiplier, best.sell_multiplier);
    }

    #[test]
    fn aggregates_compute_winrate_and_profit_from_paired_trades() {
        let t1 = fixed_token(1);
        let t2 = fixed_token(2);
        let trades = vec![
            trade(TradeKind::Buy, t1, 1.0),
            trade(TradeKind::Sell, t1, 2.0),
            trade(TradeKind::Buy, t2, 1.0),
            trade(TradeKind::Sell, t2, 0.5),
        ];
        let agg = compute_aggregates(&trades);
        assert_eq!(agg.profit, 0.5);
        assert_eq!(agg.winrate, 0.5);
    }

    #[test]
    fn unmatched_buy_does_not_affect_profit() {
        let t1 = fixed_token(3);
        let trades = vec![trade(TradeKind::Buy, t1, 1.0)];
        let agg = compute_aggregates(&trades);
        assert_eq!(agg.profit, 0.0);
        assert_eq!(agg.winrate, 0.0);
    }

    #[test]
    fn drawdown_tracks_equity_retreat_from_peak() {
        let t1 = fixed_token(4);
        let t2 = fixed_token(5);
        let t3 = fixed_token(6);
        let trades = vec![
            trade(TradeKind::Buy, t1, 1.0),
            trade(TradeKind::Sell, t1, 3.0),
            trade(TradeKind::Buy, t2, 1.0),
            trade(TradeKind::Sell, t2, 0.0),
            trade(TradeKind::Buy, t3, 1.0),
            trade(TradeKind::Sell, t3, 1.0),
        ];
        let agg = compute_aggregates(&trades);
        assert!(agg.drawdown > 0.0);
    }
}
