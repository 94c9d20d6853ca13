//! Central error taxonomy.
//!
//! One categorized error type per subsystem boundary, mapped to a shared
//! [`ErrorCategory`] for metrics/logging. Only the Decision Engine maps a
//! category to a policy (reject, retry-next-tick, degrade-to-sim); every
//! other subsystem just reports.

use thiserror::Error;

/// High-level error categories for metrics and monitoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Network/RPC/HTTP errors, including rate limiting.
    Network,
    /// Configuration errors (fatal at startup).
    Configuration,
    /// Quote/swap/gateway errors.
    Gateway,
    /// Safety-probe errors (always degrade, never fatal).
    Safety,
    /// Data-shape errors: malformed notification or journal line.
    DataShape,
    /// Internal system errors.
    System,
}

impl ErrorCategory {
    pub fn metric_label(&self) -> &'static str {
        match self {
            ErrorCategory::Network => "network",
            ErrorCategory::Configuration => "configuration",
            ErrorCategory::Gateway => "gateway",
            ErrorCategory::Safety => "safety",
            ErrorCategory::DataShape => "data_shape",
            ErrorCategory::System => "system",
        }
    }
}

/// Standardized error type carried across subsystem boundaries.
#[derive(Error, Debug)]
pub enum SniperError {
    #[error("network error: {message}")]
    Network { message: String, source: Option<anyhow::Error> },

    #[error("configuration error: {message}")]
    Configuration { message: String },

    #[error("gateway error: {message}")]
    Gateway { message: String, source: Option<anyhow::Error> },

    #[error("safety probe error: {message}")]
    Safety { message: String, source: Option<anyhow::Error> },

    #[error("data shape error: {context}: {message}")]
    DataShape { context: String, message: String },

    #[error("system error: {message}")]
    System { message: String, source: Option<anyhow::Error> },
}

impl SniperError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            SniperError::Network { .. } => ErrorCategory::Network,
            SniperError::Configuration { .. } => ErrorCategory::Configuration,
            SniperError::Gateway { .. } => ErrorCategory::Gateway,
            SniperError::Safety { .. } => ErrorCategory::Safety,
            SniperError::DataShape { .. } => ErrorCategory::DataShape,
            SniperError::System { .. } => ErrorCategory::System,
        }
    }

    pub fn network<S: Into<String>>(message: S) -> Self {
        Self::Network { message: message.into(), source: None }
    }

    pub fn network_with_source<S: Into<String>>(message: S, source: anyhow::Error) -> Self {
        Self::Network { message: message.into(), source: Some(source) }
    }

    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Configuration { message: message.into() }
    }

    pub fn gateway<S: Into<String>>(message: S) -> Self {
        Self::Gateway { message: message.into(), source: None }
    }

    pub fn gateway_with_source<S: Into<String>>(message: S, source: anyhow::Error) -> Self {
        Self::Gateway { message: message.into(), source: Some(source) }
    }

    pub fn safety<S: Into<String>>(message: S) -> Self {
        Self::Safety { message: message.into(), source: None }
    }

    pub fn data_shape<C: Into<String>, M: Into<String>>(context: C, message: M) -> Self {
        Self::DataShape { context: context.into(), message: message.into() }
    }

    pub fn system<S: Into<String>>(message: S) -> Self {
        Self::System { message: message.into(), source: None }
    }

    pub fn system_with_source<S: Into<String>>(message: S, source: anyhow::Error) -> Self {
        Self::System { message: message.into(), source: Some(source) }
    }
}

/// Extension trait to categorize anyhow errors at the point they cross
/// into a typed subsystem boundary.
pub trait ErrorContext {
    fn network_context<S: Into<String>>(self, message: S) -> SniperError;
    fn gateway_context<S: Into<String>>(self, message: S) -> SniperError;
    fn system_context<S: Into<String>>(self, message: S) -> SniperError;
}

impl ErrorContext for anyhow::Error {
    fn network_context<S: Into<String>>(self, message: S) -> SniperError {
        SniperError::network_with_source(message, self)
    }

    fn gateway_context<S: Into<String>>(self, message: S) -> SniperError {
        SniperError::gateway_with_source(message, self)
    }

    fn system_context<S: Into<String>>(self, message: S) -> SniperError {
        SniperError::system_with_source(message, self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    #[test]
    fn error_categorization() {
        let net_err = SniperError::network("RPC timeout");
        assert_eq!(net_err.category(), ErrorCategory::Network);
        assert_eq!(net_err.category().metric_label(), "network");

        let config_err = SniperError::config("missing wallet key");
        assert_eq!(config_err.category(), ErrorCategory::Configuration);

        let safety_err = SniperError::safety("oracle unreachable");
        assert_eq!(safety_err.category(), ErrorCategory::Safety);
    }

    #[test]
    fn error_context_extension() {
        let base_error = anyhow!("connection failed");
        let categorized = base_error.network_context("failed to connect to quote endpoint");

        assert_eq!(categorized.category(), ErrorCategory::Network);
        assert!(categorized.to_string().contains("network error"));
        assert!(categorized.to_string().contains("failed to connect to quote endpoint"));
    }
}
