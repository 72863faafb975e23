//! Error types for Inbox Router.

use std::path::PathBuf;

/// Top-level error type for the router.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Classifier error: {0}")]
    Classifier(#[from] ClassifierError),

    #[error("Mailbox error: {0}")]
    Mailbox(#[from] MailboxError),

    #[error("Calendar error: {0}")]
    Calendar(#[from] CalendarError),

    #[error("Report error: {0}")]
    Report(#[from] ReportError),
}

/// Configuration-related errors. Always fatal at startup.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required configuration: {key}. {hint}")]
    MissingRequired { key: String, hint: String },

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Category '{category}' is invalid: {message}")]
    InvalidCategory { category: String, message: String },

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ConfigError {
    pub(crate) fn invalid(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidValue {
            key: key.into(),
            message: message.into(),
        }
    }

    pub(crate) fn category(category: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidCategory {
            category: category.into(),
            message: message.into(),
        }
    }
}

/// Classifier (LLM) errors. Never escape the classifier boundary: they are
/// logged and degraded to the default classification.
#[derive(Debug, thiserror::Error)]
pub enum ClassifierError {
    #[error("Provider {provider} request failed: {reason}")]
    RequestFailed { provider: String, reason: String },

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Mailbox transport errors.
#[derive(Debug, thiserror::Error)]
pub enum MailboxError {
    #[error("Message {id} not found")]
    NotFound { id: String },

    #[error("Failed to forward message {id} to {to}: {reason}")]
    ForwardFailed {
        id: String,
        to: String,
        reason: String,
    },

    #[error("Failed to update message {id}: {reason}")]
    UpdateFailed { id: String, reason: String },

    #[error("Failed to list unread messages: {0}")]
    ListFailed(String),
}

/// Calendar transport errors.
#[derive(Debug, thiserror::Error)]
pub enum CalendarError {
    #[error("Event creation failed: {0}")]
    CreateFailed(String),
}

/// Report delivery errors.
#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    #[error("Invalid address {address}: {reason}")]
    InvalidAddress { address: String, reason: String },

    #[error("Failed to build report email: {0}")]
    Build(String),

    #[error("SMTP send failed: {0}")]
    Send(String),
}

/// Result type alias for the router.
pub type Result<T> = std::result::Result<T, Error>;
