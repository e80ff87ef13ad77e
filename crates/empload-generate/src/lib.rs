//! Seedable record generation for empload.
//!
//! Produces batches of employees with their salary histories and department
//! assignments. Every random draw goes through an injected RNG, so a fixed
//! seed and reference date reproduce the same batches.

pub mod departments;
pub mod errors;
pub mod generator;
pub mod model;
pub mod persona;
pub mod tracker;

pub use departments::{DEPARTMENT_CATALOG, default_departments};
pub use errors::GenerationError;
pub use generator::RecordGenerator;
pub use model::{Bounds, GenerateOptions};
pub use persona::{Contact, FakePersonaProvider, LocaleKey, Persona, PersonaProvider};
pub use tracker::IdentifierTracker;
