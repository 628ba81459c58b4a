//! Error types for the agent runtime

use thiserror::Error;

/// Result type alias using the runtime's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the agent runtime
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// LLM provider API error
    #[error("API error: {0}")]
    Api(String),

    /// Rate limit exceeded
    #[error("Rate limit exceeded: {0}")]
    RateLimit(String),

    /// Per-task cost budget exceeded. Carries the running total and the
    /// configured limit; only the agent loop is allowed to catch this.
    #[error("Budget exceeded: ${spent:.4} spent of ${budget:.4} limit")]
    BudgetExceeded { spent: f64, budget: f64 },

    /// A tool with this name is already registered
    #[error("Tool '{0}' is already registered")]
    AlreadyRegistered(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Timeout error
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Cache database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// HTTP request error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Check if error is worth retrying at the transport level
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Http(_) | Error::RateLimit(_) | Error::Timeout(_)
        )
    }
}

impl From<config::ConfigError> for Error {
    fn from(err: config::ConfigError) -> Self {
        Error::Config(err.to_string())
    }
}
