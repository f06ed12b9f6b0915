//! Error types for ddns-updater.

use crate::family::AddressFamily;
use thiserror::Error;

/// Result type alias for ddns-updater.
pub type Result<T> = std::result::Result<T, DdnsError>;

/// DDNS error types.
#[derive(Error, Debug)]
pub enum DdnsError {
    /// Configuration error. Fatal at startup.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Network/HTTP error.
    #[error("Network error: {0}")]
    Network(String),

    /// Every discovery source for a family failed this cycle.
    #[error("{family} resolution failed: {reason}")]
    ResolutionFailed {
        family: AddressFamily,
        reason: String,
    },

    /// Update failed in a way that may succeed on retry.
    #[error("Transient update failure: {0}")]
    TransientUpdate(String),

    /// Provider rejected the update deterministically.
    #[error("Update rejected ({token}): {message}")]
    TerminalUpdate { token: String, message: String },

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl DdnsError {
    /// Whether the update client may retry after this error.
    pub fn is_transient(&self) -> bool {
        matches!(self, DdnsError::Network(_) | DdnsError::TransientUpdate(_))
    }

    /// Whether this error rejects the update for the rest of the cycle.
    pub fn is_terminal(&self) -> bool {
        matches!(self, DdnsError::TerminalUpdate { .. })
    }
}

impl From<reqwest::Error> for DdnsError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            DdnsError::Network(format!("request timed out: {}", e))
        } else {
            DdnsError::Network(e.to_string())
        }
    }
}

impl From<toml::de::Error> for DdnsError {
    fn from(e: toml::de::Error) -> Self {
        DdnsError::Config(e.to_string())
    }
}

impl From<toml::ser::Error> for DdnsError {
    fn from(e: toml::ser::Error) -> Self {
        DdnsError::Serialization(e.to_string())
    }
}

impl From<serde_json::Error> for DdnsError {
    fn from(e: serde_json::Error) -> Self {
        DdnsError::Serialization(e.to_string())
    }
}
