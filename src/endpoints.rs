//! Observability surface: Prometheus-format metrics text and a health/status
//! JSON body, gated by the `prometheus_exporter` feature.
//!
//! Grounded on `endpoints.rs`, with the scoreboard/ranking concept dropped:
//! there is no per-mint ranking surface here, only the global metrics
//! registry and `Engine::status` (see DESIGN.md).

use crate::metrics::{metrics, MetricsSnapshot};
use serde_json::json;

#[derive(Debug, Default)]
pub struct EndpointServer;

impl EndpointServer {
    pub fn new() -> Self {
        Self
    }

    pub fn get_metrics_response(&self) -> String {
        let snapshot = metrics().export_metrics();
        Self::format_prometheus_metrics(&snapshot)
    }

    pub fn get_health_response(&self) -> String {
        json!({
            "status": "healthy",
            "timestamp": std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap_or_default()
                .as_secs(),
            "version": env!("CARGO_PKG_VERSION"),
        })
        .to_string()
    }

    pub fn get_status_response(&self) -> String {
        let snapshot = metrics().export_metrics();
        json!({
            "metrics": {
                "counters": snapshot.counters,
                "gauges": snapshot.gauges,
                "histograms": snapshot.histograms,
            },
            "uptime_seconds": std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap_or_default()
                .as_secs(),
        })
        .to_string()
    }

    fn format_prometheus_metrics(snapshot: &MetricsSnapshot) -> String {
        let mut output = String::new();

        for (name, value) in &snapshot.counters {
            output.push_str(&format!("# TYPE {name} counter\n"));
            output.push_str(&format!("{name} {value}\n"));
        }

        for (name, value) in &snapshot.gauges {
            output.push_str(&format!("# TYPE {name} gauge\n"));
            output.push_str(&format!("{name} {value}\n"));
        }

        for (name, stats) in &snapshot.histograms {
            output.push_str(&format!("# TYPE {name}_count counter\n"));
            output.push_str(&format!("{name}_count {}\n", stats.count));
            output.push_str(&format!("# TYPE {name} histogram\n"));
            output.push_str(&format!("{name}_bucket{{le=\"50\"}} {}\n", stats.p50));
            output.push_str(&format!("{name}_bucket{{le=\"95\"}} {}\n", stats.p95));
            output.push_str(&format!("{name}_bucket{{le=\"99\"}} {}\n", stats.p99));
            output.push_str(&format!("{name}_bucket{{le=\"+Inf\"}} {}\n", stats.count));
            output.push_str(&format!("{name}_min {}\n", stats.min));
            output.push_str(&format!("{name}_max {}\n", stats.max));
        }

        output
    }
}

static GLOBAL_ENDPOINT_SERVER: std::sync::OnceLock<EndpointServer> = std::sync::OnceLock::new();

pub fn endpoint_server() -> &'static EndpointServer {
    GLOBAL_ENDPOINT_SERVER.get_or_init(EndpointServer::new)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metrics_response_contains_recorded_counter() {
        let server = EndpointServer::new();
        metrics().increment_counter("endpoints_test_counter");
        let response = server.get_metrics_response();
        assert!(response.contains("endpoints_test_counter"));
    }

    #[test]
    fn health_response_reports_healthy() {
        let server = EndpointServer::new();
        assert!(server.get_health_response().contains("healthy"));
    }
}
