use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Which store constraint a rejected batch ran into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntegrityKind {
    Uniqueness,
    Referential,
    NotNull,
    Check,
    /// Caught client-side before the batch reached the store.
    Invalid,
}

impl IntegrityKind {
    pub fn as_str(self) -> &'static str {
        match self {
            IntegrityKind::Uniqueness => "uniqueness",
            IntegrityKind::Referential => "referential",
            IntegrityKind::NotNull => "not_null",
            IntegrityKind::Check => "check",
            IntegrityKind::Invalid => "invalid",
        }
    }
}

impl fmt::Display for IntegrityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error taxonomy shared across empload crates.
#[derive(Debug, Error)]
pub enum Error {
    /// A required setting is missing or malformed. Fatal, never retried.
    #[error("configuration error: {0}")]
    Config(String),
    /// The store could not be reached, or stayed unreachable, after all retries.
    #[error("connection error after {attempts} attempt(s): {message}")]
    Connection { attempts: u32, message: String },
    /// Connectivity hiccup during an operation; retried at the connection level.
    #[error("transient operational error: {0}")]
    Transient(String),
    /// Uniqueness or referential violation; the owning batch is skipped.
    #[error("integrity violation ({kind}): {message}")]
    Integrity { kind: IntegrityKind, message: String },
    /// A generated record breaks a model invariant.
    #[error("invalid record: {0}")]
    InvalidRecord(String),
}

impl Error {
    /// Errors that terminate the run.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::Config(_) | Error::Connection { .. })
    }

    /// Errors isolated to a single batch.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Error::Integrity { .. } | Error::InvalidRecord(_))
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Transient(_))
    }
}

/// Convenience alias for results returned by empload crates.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification_partitions_the_taxonomy() {
        let config = Error::Config("DB_USER is required".to_string());
        let connection = Error::Connection {
            attempts: 3,
            message: "refused".to_string(),
        };
        let transient = Error::Transient("reset by peer".to_string());
        let integrity = Error::Integrity {
            kind: IntegrityKind::Uniqueness,
            message: "duplicate key".to_string(),
        };

        assert!(config.is_fatal() && connection.is_fatal());
        assert!(transient.is_retryable() && !transient.is_fatal());
        assert!(integrity.is_recoverable() && !integrity.is_retryable());
        assert_eq!(
            connection.to_string(),
            "connection error after 3 attempt(s): refused"
        );
    }
}
