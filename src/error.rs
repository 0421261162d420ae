//! Error types for mailgram.

/// Top-level error type for the relay.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Sink error: {0}")]
    Sink(#[from] SinkError),
}

/// Configuration-related errors.
///
/// Fatal at startup only when they leave the process without a chat
/// destination or without a single registered account; a broken account
/// entry is logged and skipped.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("No inbox accounts configured")]
    NoAccounts,
}

/// Inbox transport errors. All recoverable — the affected account is
/// retried on the next scheduled cycle.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Connection to {host} failed: {reason}")]
    Connect { host: String, reason: String },

    #[error("Protocol error for account {account}: {reason}")]
    Protocol { account: String, reason: String },

    #[error("Failed to extract content of message {id}: {reason}")]
    Extract { id: String, reason: String },
}

/// Chat sink errors.
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    /// The sink rejected the payload for a rendering/markup reason.
    /// Triggers the one-shot plain-mode fallback.
    #[error("Payload rejected by sink: {reason}")]
    Rejected { reason: String },

    #[error("Failed to send to sink: {reason}")]
    SendFailed { reason: String },

    #[error("Sink returned HTTP {status}: {body}")]
    Http { status: u16, body: String },
}

/// Result type alias for the relay.
pub type Result<T> = std::result::Result<T, Error>;
