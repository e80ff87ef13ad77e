use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::errors::GenerationError;

/// Inclusive `[min, max]` range.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds<T> {
    pub min: T,
    pub max: T,
}

impl<T: PartialOrd + Copy> Bounds<T> {
    pub const fn new(min: T, max: T) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, value: T) -> bool {
        self.min <= value && value <= self.max
    }

    fn check(&self, name: &str) -> Result<(), GenerationError> {
        // Written as a negation so NaN bounds are rejected too.
        if !(self.min <= self.max) {
            return Err(GenerationError::InvalidOptions(format!(
                "{name}: min must not exceed max"
            )));
        }
        Ok(())
    }
}

/// Options for the record generator.
///
/// Deserializable so a TOML generator profile can override any subset of
/// the defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerateOptions {
    /// "Today" for date draws; `None` uses the current UTC date.
    pub reference_date: Option<NaiveDate>,
    /// Range employee identifiers are drawn from.
    pub identifier_range: Bounds<i64>,
    /// Employee age in years at the reference date.
    pub age_years: Bounds<u32>,
    pub min_working_age_years: u32,
    /// Hire dates fall within this many years before the reference date.
    pub hire_lookback_years: u32,
    /// Salary records per employee.
    pub salary_records: Bounds<u32>,
    /// Amount of the first salary record.
    pub base_salary: Bounds<i64>,
    /// Percentage change applied from one salary record to the next.
    pub pct_change: Bounds<f64>,
    pub outlier_probability: f64,
    pub outlier_multiplier: Bounds<f64>,
    /// Nominal length of a closed salary interval.
    pub interval_days: i64,
    /// Maximum shift applied to each chained salary start, either direction.
    pub interval_jitter_days: i64,
    /// Weight of holding 1, 2, ... departments at once.
    pub department_weights: Vec<f64>,
    /// Maximum delay between hire date and assignment start.
    pub assignment_jitter_days: i64,
    pub profile_probability: f64,
    pub audit_probability: f64,
    /// Persona locale (`en_US` or `pt_BR`).
    pub locale: String,
}

impl Default for GenerateOptions {
    fn default() -> Self {
        Self {
            reference_date: None,
            identifier_range: Bounds::new(1_000_000, 9_999_999),
            age_years: Bounds::new(25, 65),
            min_working_age_years: 18,
            hire_lookback_years: 20,
            salary_records: Bounds::new(2, 4),
            base_salary: Bounds::new(30_000, 70_000),
            pct_change: Bounds::new(-3.0, 10.0),
            outlier_probability: 0.05,
            outlier_multiplier: Bounds::new(1.5, 2.0),
            interval_days: 365,
            interval_jitter_days: 45,
            department_weights: vec![0.8, 0.2],
            assignment_jitter_days: 30,
            profile_probability: 0.5,
            audit_probability: 0.25,
            locale: "en_US".to_string(),
        }
    }
}

impl GenerateOptions {
    pub fn validate(&self) -> Result<(), GenerationError> {
        self.identifier_range.check("identifier_range")?;
        if self.identifier_range.min < 1 || self.identifier_range.max > i64::from(i32::MAX) {
            return Err(GenerationError::InvalidOptions(format!(
                "identifier_range must lie within 1..={}",
                i32::MAX
            )));
        }
        self.age_years.check("age_years")?;
        if self.age_years.min < self.min_working_age_years {
            return Err(GenerationError::InvalidOptions(
                "age_years.min must be at least min_working_age_years".to_string(),
            ));
        }
        if self.hire_lookback_years == 0 {
            return Err(GenerationError::InvalidOptions(
                "hire_lookback_years must be positive".to_string(),
            ));
        }
        self.salary_records.check("salary_records")?;
        if self.salary_records.min == 0 {
            return Err(GenerationError::InvalidOptions(
                "salary_records.min must be at least 1".to_string(),
            ));
        }
        self.base_salary.check("base_salary")?;
        if self.base_salary.min <= 0 {
            return Err(GenerationError::InvalidOptions(
                "base_salary must be positive".to_string(),
            ));
        }
        self.pct_change.check("pct_change")?;
        if self.pct_change.min <= -100.0 {
            return Err(GenerationError::InvalidOptions(
                "pct_change.min must be above -100".to_string(),
            ));
        }
        self.outlier_multiplier.check("outlier_multiplier")?;
        if self.outlier_multiplier.min <= 0.0 {
            return Err(GenerationError::InvalidOptions(
                "outlier_multiplier must be positive".to_string(),
            ));
        }
        for (name, value) in [
            ("outlier_probability", self.outlier_probability),
            ("profile_probability", self.profile_probability),
            ("audit_probability", self.audit_probability),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(GenerationError::InvalidOptions(format!(
                    "{name} must be within [0, 1]"
                )));
            }
        }
        if self.interval_days <= 0 {
            return Err(GenerationError::InvalidOptions(
                "interval_days must be positive".to_string(),
            ));
        }
        if self.interval_jitter_days < 0 || self.interval_jitter_days >= self.interval_days {
            return Err(GenerationError::InvalidOptions(
                "interval_jitter_days must be within 0..interval_days".to_string(),
            ));
        }
        if self.assignment_jitter_days < 0 {
            return Err(GenerationError::InvalidOptions(
                "assignment_jitter_days must not be negative".to_string(),
            ));
        }
        if self.department_weights.is_empty()
            || self
                .department_weights
                .iter()
                .any(|weight| !weight.is_finite() || *weight < 0.0)
            || self.department_weights.iter().all(|weight| *weight == 0.0)
        {
            return Err(GenerationError::InvalidOptions(
                "department_weights needs at least one positive, finite weight".to_string(),
            ));
        }
        Ok(())
    }
}
