//! Error types for crosspost.

use crate::publish::Network;

/// Top-level error type for the assistant.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Staging error: {0}")]
    Staging(#[from] StagingError),

    #[error("Publish error: {0}")]
    Publish(#[from] PublishError),

    #[error("Dialog error: {0}")]
    Dialog(#[from] DialogError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required configuration: {key}. {hint}")]
    MissingRequired { key: String, hint: String },

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Chat-transport errors.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Transport {name} failed to start: {reason}")]
    StartupFailed { name: String, reason: String },

    #[error("Failed to send on transport {name}: {reason}")]
    SendFailed { name: String, reason: String },

    #[error("Failed to edit prompt on transport {name}: {reason}")]
    EditFailed { name: String, reason: String },

    #[error("Failed to fetch attachment on transport {name}: {reason}")]
    FetchFailed { name: String, reason: String },
}

/// Media staging errors.
#[derive(Debug, thiserror::Error)]
pub enum StagingError {
    #[error("Media limit reached: at most {max} items may be staged")]
    LimitExceeded { max: usize },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Per-network publish errors. One of these failing never touches the
/// other networks' attempts.
#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("No credentials configured for {network}")]
    MissingCredentials { network: Network },

    #[error("Bad credentials for {network}: {reason}")]
    BadCredentials { network: Network, reason: String },

    #[error("Authentication with {network} failed: {reason}")]
    AuthFailed { network: Network, reason: String },

    #[error("Request to {network} failed: {reason}")]
    RequestFailed { network: Network, reason: String },

    #[error("Invalid response from {network}: {reason}")]
    InvalidResponse { network: Network, reason: String },

    #[error("Media upload to {network} failed: {reason}")]
    UploadFailed { network: Network, reason: String },

    #[error("Could not resolve reply reference for {network}: {reason}")]
    ReplyResolution { network: Network, reason: String },
}

/// Dialog/step-handler errors. Caught at the step boundary; the
/// conversation stays on its current step.
#[derive(Debug, thiserror::Error)]
pub enum DialogError {
    #[error("Staging error: {0}")]
    Staging(#[from] StagingError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Unknown profile: {0}")]
    UnknownProfile(String),

    #[error("Handler fault: {0}")]
    Handler(String),
}

/// Result type alias for the assistant.
pub type Result<T> = std::result::Result<T, Error>;
