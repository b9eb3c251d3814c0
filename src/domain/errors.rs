//! Error taxonomy for authentication, vault access and price extraction
//!
//! Per-item extraction problems are recorded as [`ExtractionFailure`] data on a
//! scrape result; everything that must stop the caller is a [`PriceWatchError`].

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::session::InvalidTransition;
use super::supplier::Supplier;

#[derive(Error, Debug)]
pub enum PriceWatchError {
    #[error("Authentication failed for {supplier}: {reason}")]
    AuthenticationFailed { supplier: Supplier, reason: String },

    #[error("Second-factor code rejected by {supplier}")]
    InvalidSecondFactor { supplier: Supplier },

    #[error("No second-factor challenge is pending for {supplier}")]
    NoPendingChallenge { supplier: Supplier },

    #[error("Session error for {supplier}: {source}")]
    SessionTransition {
        supplier: Supplier,
        #[source]
        source: InvalidTransition,
    },

    #[error("Session expired for {0}, log in again before scraping")]
    SessionExpired(Supplier),

    #[error("Not authenticated with {0}, log in before scraping")]
    NotAuthenticated(Supplier),

    #[error("No stored credentials for {0}")]
    CredentialNotFound(Supplier),

    #[error("Stored credentials for {supplier} could not be decrypted: {reason}")]
    DecryptionFailed { supplier: Supplier, reason: String },

    #[error("Credentials for {supplier} could not be encrypted: {reason}")]
    EncryptionFailed { supplier: Supplier, reason: String },

    #[error("Configuration error in '{field}': {message}")]
    ConfigurationError { field: String, message: String },

    #[error("Browser error: {0}")]
    Browser(String),

    #[error("Catalog error: {0}")]
    Catalog(String),

    #[error("Report error: {0}")]
    Report(String),

    #[error("No comparison has changes, nothing to report")]
    NothingToReport,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl PriceWatchError {
    pub fn configuration(field: &str, message: impl Into<String>) -> Self {
        Self::ConfigurationError {
            field: field.to_string(),
            message: message.into(),
        }
    }

    pub fn browser(err: impl std::fmt::Display) -> Self {
        Self::Browser(err.to_string())
    }

    /// Errors that mean a supplier's authenticated view can no longer be trusted.
    /// A batch must stop on these.
    pub const fn is_session_loss(&self) -> bool {
        matches!(self, Self::SessionExpired(_) | Self::NotAuthenticated(_))
    }

    /// Supplier whose session was lost, for batch-abort reporting
    pub const fn lost_session_supplier(&self) -> Option<Supplier> {
        match self {
            Self::SessionExpired(s) | Self::NotAuthenticated(s) => Some(*s),
            _ => None,
        }
    }

    /// Whether the caller may simply try the same operation again
    pub const fn is_retryable_by_caller(&self) -> bool {
        matches!(self, Self::InvalidSecondFactor { .. })
    }
}

pub type PriceWatchResult<T> = Result<T, PriceWatchError>;

/// Why a single supplier/product extraction produced no price.
///
/// Recorded on the scrape result and never aborts a batch.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "kind")]
pub enum ExtractionFailure {
    #[error("navigation timed out after {timeout_ms} ms")]
    NavigationTimeout { timeout_ms: u64 },

    #[error("navigation failed: {message}")]
    NavigationFailed { message: String },

    #[error("price not found (tried {strategies_tried} strategies)")]
    PriceNotFound { strategies_tried: usize },

    #[error("browser error: {message}")]
    Browser { message: String },
}

impl ExtractionFailure {
    pub fn navigation(err: impl std::fmt::Display) -> Self {
        Self::NavigationFailed {
            message: err.to_string(),
        }
    }

    pub fn browser(err: impl std::fmt::Display) -> Self {
        Self::Browser {
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_loss_is_classified() {
        assert!(PriceWatchError::SessionExpired(Supplier::Kmls).is_session_loss());
        assert!(PriceWatchError::NotAuthenticated(Supplier::Lca).is_session_loss());
        assert_eq!(
            PriceWatchError::SessionExpired(Supplier::Kmls).lost_session_supplier(),
            Some(Supplier::Kmls)
        );
        let vault = PriceWatchError::EncryptionFailed {
            supplier: Supplier::Lca,
            reason: "encryption failed".into(),
        };
        assert!(!vault.is_session_loss());
        assert_eq!(vault.lost_session_supplier(), None);
    }

    #[test]
    fn failure_messages_are_readable() {
        let failure = ExtractionFailure::NavigationTimeout { timeout_ms: 30_000 };
        assert_eq!(failure.to_string(), "navigation timed out after 30000 ms");
        assert_eq!(
            ExtractionFailure::navigation("net::ERR_NAME_NOT_RESOLVED").to_string(),
            "navigation failed: net::ERR_NAME_NOT_RESOLVED"
        );
        assert!(PriceWatchError::InvalidSecondFactor { supplier: Supplier::Lca }.is_retryable_by_caller());
    }
}
