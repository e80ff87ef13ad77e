//! Core contracts and helpers for empload.
//!
//! This crate defines the record model shared by the generator and the
//! loader, the error taxonomy, batch validation, session tuning declarations
//! and run configuration.

pub mod config;
pub mod connection;
pub mod error;
pub mod model;
pub mod session;
pub mod validation;

pub use config::{LoadConfig, load_env_file};
pub use connection::{ConnectionSettings, Engine, RedactedConnection};
pub use error::{Error, IntegrityKind, Result};
pub use model::{
    BatchRecords, Department, DepartmentAssignment, Employee, EmployeeId, Gender, OPEN_ENDED,
    Payload, SalaryRecord,
};
pub use session::{DurabilityLevel, SessionOption, SessionSetting, parse_session_tuning};
pub use validation::{earliest_hire_date, validate_batch};
