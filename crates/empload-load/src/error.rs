use sqlx::error::ErrorKind;
use thiserror::Error;

use empload_core::{Error as CoreError, IntegrityKind};
use empload_generate::GenerationError;

/// Errors surfaced by a store backend.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A constraint rejected the write; the transaction was rolled back.
    #[error("integrity violation ({kind}): {message}")]
    Integrity { kind: IntegrityKind, message: String },
    /// The connection dropped or the store asked us to try again.
    #[error("transient store error: {0}")]
    Transient(String),
    /// The backend cannot honour the request (e.g. a session option it lacks).
    #[error("unsupported by {engine}: {what}")]
    Unsupported { engine: &'static str, what: String },
    #[error("store error: {0}")]
    Other(String),
}

impl StoreError {
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Transient(_))
    }
}

/// SQLSTATE codes worth retrying on a fresh connection: serialization
/// failure, deadlock, and operator intervention (shutdown, crash recovery).
const TRANSIENT_SQLSTATES: &[&str] = &["40001", "40P01", "57P01", "57P02", "57P03"];

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db) => {
                let kind = match db.kind() {
                    ErrorKind::UniqueViolation => Some(IntegrityKind::Uniqueness),
                    ErrorKind::ForeignKeyViolation => Some(IntegrityKind::Referential),
                    ErrorKind::NotNullViolation => Some(IntegrityKind::NotNull),
                    ErrorKind::CheckViolation => Some(IntegrityKind::Check),
                    _ => None,
                };
                if let Some(kind) = kind {
                    return StoreError::Integrity {
                        kind,
                        message: db.message().to_string(),
                    };
                }
                let transient = db.code().is_some_and(|code| {
                    code.starts_with("08") || TRANSIENT_SQLSTATES.contains(&code.as_ref())
                });
                if transient {
                    StoreError::Transient(err.to_string())
                } else {
                    StoreError::Other(err.to_string())
                }
            }
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::Protocol(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed => StoreError::Transient(err.to_string()),
            _ => StoreError::Other(err.to_string()),
        }
    }
}

/// Errors that end a load run.
#[derive(Debug, Error)]
pub enum LoadError {
    /// Configuration, connection and transient failures from the shared taxonomy.
    #[error(transparent)]
    Core(#[from] CoreError),
    #[error("generation failed: {0}")]
    Generation(#[from] GenerationError),
    #[error(transparent)]
    Store(StoreError),
}

impl LoadError {
    pub fn is_connection(&self) -> bool {
        matches!(
            self,
            LoadError::Core(CoreError::Connection { .. } | CoreError::Transient(_))
        )
    }

    pub fn is_config(&self) -> bool {
        matches!(self, LoadError::Core(CoreError::Config(_)))
    }
}

impl From<StoreError> for LoadError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Transient(message) => LoadError::Core(CoreError::Transient(message)),
            StoreError::Integrity { kind, message } => {
                LoadError::Core(CoreError::Integrity { kind, message })
            }
            other => LoadError::Store(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_errors_are_transient() {
        let err = sqlx::Error::Io(std::io::Error::new(
            std::io::ErrorKind::ConnectionReset,
            "reset by peer",
        ));
        assert!(StoreError::from(err).is_transient());
        assert!(StoreError::from(sqlx::Error::PoolTimedOut).is_transient());
    }

    #[test]
    fn row_not_found_is_not_transient() {
        assert!(matches!(
            StoreError::from(sqlx::Error::RowNotFound),
            StoreError::Other(_)
        ));
    }

    #[test]
    fn store_errors_map_onto_core_taxonomy() {
        let transient: LoadError = StoreError::Transient("gone".to_string()).into();
        assert!(transient.is_connection());

        let integrity: LoadError = StoreError::Integrity {
            kind: IntegrityKind::Referential,
            message: "fk".to_string(),
        }
        .into();
        assert!(matches!(
            integrity,
            LoadError::Core(CoreError::Integrity {
                kind: IntegrityKind::Referential,
                ..
            })
        ));

        let other: LoadError = StoreError::Other("syntax".to_string()).into();
        assert!(!other.is_connection() && !other.is_config());
    }
}
