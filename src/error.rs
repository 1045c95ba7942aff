//! Error types for the trading agent

use thiserror::Error;

/// Result type alias for agent operations
pub type Result<T> = std::result::Result<T, AgentError>;

#[derive(Error, Debug)]
pub enum AgentError {

    // =============================
    // Run Errors
    // =============================

    /// Missing credential, bad setting or broken prompt resource.
    /// Fatal: raised before the loop starts.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Network or HTTP failure talking to the model provider
    #[error("Transport error: {0}")]
    TransportError(String),

    /// Upstream answered, but not with a usable completion
    #[error("Invalid model response: {0}")]
    ResponseFormatError(String),

    /// Per-symbol quote failure; never escapes a whole fetch
    #[error("Market data error: {0}")]
    MarketDataError(String),
}

impl AgentError {
    /// Only configuration problems stop a run; everything else is
    /// absorbed by the loop.
    pub fn is_fatal(&self) -> bool {
        matches!(self, AgentError::ConfigError(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_config_errors_are_fatal() {
        assert!(AgentError::ConfigError("missing key".into()).is_fatal());
        assert!(!AgentError::TransportError("timeout".into()).is_fatal());
        assert!(!AgentError::ResponseFormatError("no choices".into()).is_fatal());
    }

    #[test]
    fn test_error_display() {
        let err = AgentError::TransportError("connection reset".into());
        assert_eq!(err.to_string(), "Transport error: connection reset");
    }
}
