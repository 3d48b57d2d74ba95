use thiserror::Error;

/// Main error type for the transaction observer
#[derive(Error, Debug)]
pub enum IndexerError {
    #[error("Chain source error: {0}")]
    Source(#[from] SourceError),

    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

/// Failures reported by a chain source adapter
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SourceError {
    /// Transport-level failure; the same request may succeed later.
    #[error("source unavailable: {0}")]
    Unavailable(String),

    /// The node answered, but not with something we can use.
    #[error("source protocol error: {0}")]
    Protocol(String),
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {value}")]
    InvalidValue { key: String, value: String },

    #[error("Configuration file not found: {0}")]
    FileNotFound(String),

    #[error("Configuration parsing failed: {0}")]
    Parsing(String),

    #[error("Invalid URL format: {0}")]
    InvalidUrl(String),
}

/// Validation errors for caller-supplied values
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Invalid Ethereum address: {0}")]
    InvalidAddress(String),

    #[error("Missing parameter: {0}")]
    MissingParameter(String),
}

pub type Result<T> = std::result::Result<T, IndexerError>;

/// Error severity levels for logging and monitoring
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    Critical,
    High,
    Medium,
    Low,
}

impl IndexerError {
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            IndexerError::InvariantViolation(_) => ErrorSeverity::Critical,
            IndexerError::Config(_) => ErrorSeverity::Critical,
            IndexerError::Source(SourceError::Protocol(_)) => ErrorSeverity::High,
            IndexerError::Source(SourceError::Unavailable(_)) => ErrorSeverity::Medium,
            IndexerError::Validation(_) => ErrorSeverity::Low,
        }
    }

    /// Whether the poller may keep running and retry on its next tick.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, IndexerError::Source(_))
    }

    /// Short stable identifier used in structured logs.
    pub fn code(&self) -> &'static str {
        match self {
            IndexerError::Source(SourceError::Unavailable(_)) => "source_unavailable",
            IndexerError::Source(SourceError::Protocol(_)) => "source_protocol_error",
            IndexerError::InvariantViolation(_) => "invariant_violation",
            IndexerError::Config(_) => "config_error",
            IndexerError::Validation(_) => "validation_error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_severity() {
        let critical = IndexerError::InvariantViolation("watermark regression".to_string());
        assert_eq!(critical.severity(), ErrorSeverity::Critical);

        let high = IndexerError::Source(SourceError::Protocol("bad json".to_string()));
        assert_eq!(high.severity(), ErrorSeverity::High);

        let medium = IndexerError::Source(SourceError::Unavailable("timeout".to_string()));
        assert_eq!(medium.severity(), ErrorSeverity::Medium);

        let low = IndexerError::Validation(ValidationError::InvalidAddress("0x12".to_string()));
        assert_eq!(low.severity(), ErrorSeverity::Low);
    }

    #[test]
    fn test_error_recoverability() {
        assert!(IndexerError::from(SourceError::Unavailable("down".to_string())).is_recoverable());
        assert!(IndexerError::from(SourceError::Protocol("garbage".to_string())).is_recoverable());
        assert!(!IndexerError::InvariantViolation("regression".to_string()).is_recoverable());
        assert!(!IndexerError::Config(ConfigError::InvalidUrl("ftp://node".to_string())).is_recoverable());
    }

    #[test]
    fn test_error_display() {
        let error = IndexerError::Source(SourceError::Unavailable("connection refused".to_string()));
        assert_eq!(
            format!("{}", error),
            "Chain source error: source unavailable: connection refused"
        );
        assert_eq!(error.code(), "source_unavailable");
    }
}
