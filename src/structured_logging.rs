//! Structured (JSON-over-tracing) logging with correlation IDs.
//!
//! Canonical logging facade for the crate: merges two historical loggers
//! (`observability::StructuredLogger` and `structured_logging::StructuredLogger`)
//! into one. A correlation id is attached to every log line emitted while
//! processing one candidate or trade. [`PipelineContext`] carries one id
//! from candidate discovery through admission and buy in the Decision
//! Engine; the per-token actor and the Self-Tuning Controller each open
//! their own short-lived context for the event they're logging (a sell, a
//! tick) rather than threading the discovery-time id any further.

use serde_json::json;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, error, info, warn};

static CORRELATION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Opaque identifier threaded through one candidate's or trade's processing.
pub fn new_correlation_id() -> u64 {
    CORRELATION_ID_COUNTER.fetch_add(1, Ordering::Relaxed)
}

/// Structured logging with correlation-ID support.
#[derive(Clone, Debug)]
pub struct StructuredLogger {
    correlation_id: u64,
    component: String,
}

impl StructuredLogger {
    pub fn new(component: &str) -> Self {
        Self { correlation_id: new_correlation_id(), component: component.to_string() }
    }

    pub fn with_correlation_id(component: &str, correlation_id: u64) -> Self {
        Self { correlation_id, component: component.to_string() }
    }

    pub fn correlation_id(&self) -> u64 {
        self.correlation_id
    }

    fn log_structured(&self, level: &str, message: &str, extra_fields: serde_json::Value) {
        let log_entry = json!({
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "level": level,
            "component": self.component,
            "correlation_id": self.correlation_id,
            "message": message,
            "fields": extra_fields
        });

        let log_string = log_entry.to_string();
        match level {
            "DEBUG" => debug!(target: "structured", "{}", log_string),
            "INFO" => info!(target: "structured", "{}", log_string),
            "WARN" => warn!(target: "structured", "{}", log_string),
            "ERROR" => error!(target: "structured", "{}", log_string),
            _ => info!(target: "structured", "{}", log_string),
        }
    }

    pub fn info(&self, message: &str, fields: serde_json::Value) {
        self.log_structured("INFO", message, fields);
    }

    pub fn warn(&self, message: &str, fields: serde_json::Value) {
        self.log_structured("WARN", message, fields);
    }

    pub fn error(&self, message: &str, fields: serde_json::Value) {
        self.log_structured("ERROR", message, fields);
    }

    pub fn debug(&self, message: &str, fields: serde_json::Value) {
        self.log_structured("DEBUG", message, fields);
    }

    pub fn log_candidate_observed(&self, token_id: &str, slot: u64) {
        self.info(
            "candidate_observed",
            json!({ "token_id": token_id, "slot": slot, "action": "discovery" }),
        );
    }

    pub fn log_admission_decision(&self, token_id: &str, admitted: bool, reason: Option<&str>) {
        self.info(
            "admission_decision",
            json!({
                "token_id": token_id,
                "admitted": admitted,
                "reason": reason,
                "action": "admission"
            }),
        );
    }

    pub fn log_buy_attempt(&self, token_id: &str, buy_amount_native: f64) {
        self.info(
            "buy_attempt_started",
            json!({ "token_id": token_id, "buy_amount_native": buy_amount_native, "action": "buy_start" }),
        );
    }

    pub fn log_buy_success(&self, token_id: &str, signature: &str, latency_ms: u64) {
        self.info(
            "buy_success",
            json!({
                "token_id": token_id,
                "signature": signature,
                "latency_ms": latency_ms,
                "action": "buy_success"
            }),
        );
    }

    pub fn log_buy_failure(&self, token_id: &str, error: &str, latency_ms: u64) {
        self.error(
            "buy_failure",
            json!({
                "token_id": token_id,
                "error": error,
                "latency_ms": latency_ms,
                "action": "buy_failure"
            }),
        );
    }

    pub fn log_sell(&self, token_id: &str, reason: &str, realized_multiple: f64, forced: bool) {
        self.info(
            "sell",
            json!({
                "token_id": token_id,
                "reason": reason,
                "realized_multiple": realized_multiple,
                "forced": forced,
                "action": "sell"
            }),
        );
    }

    pub fn log_optimizer_tick(&self, profit: f64, winrate: f64, drawdown: f64, frozen: bool) {
        self.info(
            "optimizer_tick",
            json!({
                "profit": profit,
                "winrate": winrate,
                "drawdown": drawdown,
                "frozen": frozen,
                "action": "optimizer_tick"
            }),
        );
    }

    pub fn log_optimizer_mutation(&self, reason: &str) {
        self.info("optimizer_mutation", json!({ "reason": reason, "action": "optimizer_mutation" }));
    }

    pub fn log_rpc_request(&self, endpoint: &str, method: &str) {
        self.debug("rpc_request", json!({ "endpoint": endpoint, "method": method, "action": "rpc_send" }));
    }

    pub fn log_rpc_response(&self, endpoint: &str, method: &str, success: bool, latency_ms: u64) {
        let level = if success { "INFO" } else { "WARN" };
        self.log_structured(
            level,
            "rpc_response",
            json!({
                "endpoint": endpoint,
                "method": method,
                "success": success,
                "latency_ms": latency_ms,
                "action": "rpc_response"
            }),
        );
    }
}

/// Pipeline context carrying a correlation id through operations that span
/// multiple components (discovery -> admission -> buy -> journal).
#[derive(Clone, Debug)]
pub struct PipelineContext {
    pub correlation_id: u64,
    pub logger: StructuredLogger,
}

impl PipelineContext {
    pub fn new(component: &str) -> Self {
        let logger = StructuredLogger::new(component);
        let correlation_id = logger.correlation_id();
        Self { correlation_id, logger }
    }

    pub fn with_correlation_id(component: &str, correlation_id: u64) -> Self {
        let logger = StructuredLogger::with_correlation_id(component, correlation_id);
        Self { correlation_id, logger }
    }

    pub fn child(&self, component: &str) -> Self {
        Self::with_correlation_id(component, self.correlation_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn correlation_id_generation_is_monotonic() {
        let id1 = new_correlation_id();
        let id2 = new_correlation_id();
        assert!(id2 > id1);
    }

    #[test]
    fn structured_logger_does_not_panic() {
        let logger = StructuredLogger::new("test_component");
        let correlation_id = logger.correlation_id();
        logger.info("test message", json!({"key": "value"}));
        assert!(correlation_id > 0);
    }

    #[test]
    fn pipeline_context_child_keeps_correlation_id() {
        let ctx = PipelineContext::new("test");
        let child_ctx = ctx.child("child_component");
        assert_eq!(ctx.correlation_id, child_ctx.correlation_id);
    }
}
