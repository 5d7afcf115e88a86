//! Error taxonomy shared by the keystore, the remote client and the orchestrators.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration file error: {0}")]
    ConfigFile(#[from] config::ConfigError),

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("No wallet identity found for agent '{agent_id}'")]
    NotFound { agent_id: String },

    #[error("No signing key found for agent '{agent_id}'")]
    KeyNotFound { agent_id: String },

    #[error("Validation error: {field} {message}")]
    Validation { field: &'static str, message: String },

    #[error("Remote error ({status}): {body}")]
    Remote { status: u16, body: String },

    #[error("Insufficient funds: {message}")]
    InsufficientFunds { message: String },

    #[error("Transaction {transaction_id} returned no pending approval challenge")]
    ApprovalMissing { transaction_id: String },

    #[error("Transaction {transaction_id} produced no on-chain reference within {waited_ms}ms")]
    BroadcastTimeout { transaction_id: String, waited_ms: u64 },

    #[error("Signing error: {message}")]
    Signing { message: String },

    #[error("Protocol error: {message}")]
    Protocol { message: String },

    #[error("Wallet store error: {message}")]
    Storage { message: String },
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    pub fn validation(field: &'static str, message: impl Into<String>) -> Self {
        Self::Validation {
            field,
            message: message.into(),
        }
    }

    pub fn signing(message: impl Into<String>) -> Self {
        Self::Signing {
            message: message.into(),
        }
    }

    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    /// Whether a polling read that failed this way may simply be retried.
    ///
    /// Transport timeouts and connection failures, 5xx responses and 429
    /// rate limits are transient. Everything else aborts the poll.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            Self::Remote { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }

    /// Whether a remote failure body carries the insufficient-funds code.
    pub fn is_insufficient_funds(&self) -> bool {
        match self {
            Self::InsufficientFunds { .. } => true,
            Self::Remote { body, .. } => mentions_insufficient_funds(body),
            _ => false,
        }
    }
}

/// Match both the machine code (`insufficient-funds`) and the payment
/// status variants (`crypto-payer-insufficient-funds`, "insufficient funds").
pub fn mentions_insufficient_funds(text: &str) -> bool {
    let lower = text.to_ascii_lowercase();
    lower.contains("insufficient-funds") || lower.contains("insufficient funds")
}
