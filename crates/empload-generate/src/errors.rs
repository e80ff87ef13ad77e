use thiserror::Error;

/// Errors emitted while generating records.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("invalid generator options: {0}")]
    InvalidOptions(String),
    #[error("identifier space exhausted: all {capacity} identifiers in {min}..={max} are reserved")]
    IdentifierSpaceExhausted { min: i64, max: i64, capacity: u64 },
    #[error("no departments to assign employees to")]
    NoDepartments,
    #[error("date out of range: {0}")]
    DateOutOfRange(String),
}
