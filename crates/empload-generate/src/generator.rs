use chrono::{Months, NaiveDate, TimeDelta};
use rand::distr::Distribution;
use rand::distr::weighted::WeightedIndex;
use rand::seq::index;
use rand::{Rng, RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde_json::json;
use tracing::debug;

use empload_core::{
    BatchRecords, Department, DepartmentAssignment, Employee, EmployeeId, OPEN_ENDED, Payload,
    SalaryRecord, earliest_hire_date,
};

use crate::errors::GenerationError;
use crate::model::GenerateOptions;
use crate::persona::{FakePersonaProvider, LocaleKey, PersonaProvider};
use crate::tracker::IdentifierTracker;

pub const PROFILE_SCHEMA: &str = "profile/v1";
pub const SALARY_AUDIT_SCHEMA: &str = "salary-audit/v1";

/// Builds employees together with their salary histories and department
/// assignments.
///
/// The generator owns the run's [`IdentifierTracker`], so identifiers stay
/// unique across every batch it produces.
pub struct RecordGenerator<P = FakePersonaProvider, R = ChaCha8Rng> {
    options: GenerateOptions,
    reference_date: NaiveDate,
    department_weights: WeightedIndex<f64>,
    tracker: IdentifierTracker,
    persona: P,
    rng: R,
}

impl RecordGenerator<FakePersonaProvider, ChaCha8Rng> {
    /// Generator with the `fake`-backed persona provider and a ChaCha8 RNG.
    pub fn seeded(options: GenerateOptions, seed: u64) -> Result<Self, GenerationError> {
        Self::with_rng(options, ChaCha8Rng::seed_from_u64(seed))
    }

    /// Same as [`seeded`](Self::seeded), for a stream split off a parent RNG.
    pub fn with_rng(options: GenerateOptions, rng: ChaCha8Rng) -> Result<Self, GenerationError> {
        let locale = LocaleKey::parse(&options.locale).ok_or_else(|| {
            GenerationError::InvalidOptions(format!("unsupported locale '{}'", options.locale))
        })?;
        Self::new(options, FakePersonaProvider::new(locale), rng)
    }
}

impl<P: PersonaProvider, R: RngCore> RecordGenerator<P, R> {
    pub fn new(options: GenerateOptions, persona: P, rng: R) -> Result<Self, GenerationError> {
        options.validate()?;
        let department_weights = WeightedIndex::new(&options.department_weights)
            .map_err(|err| GenerationError::InvalidOptions(format!("department_weights: {err}")))?;
        let tracker = IdentifierTracker::new(options.identifier_range)?;
        let reference_date = options
            .reference_date
            .unwrap_or_else(|| chrono::Utc::now().date_naive());

        Ok(Self {
            options,
            reference_date,
            department_weights,
            tracker,
            persona,
            rng,
        })
    }

    pub fn options(&self) -> &GenerateOptions {
        &self.options
    }

    pub fn reference_date(&self) -> NaiveDate {
        self.reference_date
    }

    pub fn tracker(&self) -> &IdentifierTracker {
        &self.tracker
    }

    /// Clear identifier reservations so the generator can serve a new run.
    pub fn reset(&mut self) {
        self.tracker.reset();
    }

    /// Generate `count` employees and their dependent records.
    pub fn generate(
        &mut self,
        count: usize,
        departments: &[Department],
    ) -> Result<BatchRecords, GenerationError> {
        if departments.is_empty() {
            return Err(GenerationError::NoDepartments);
        }

        let mut records = BatchRecords {
            employees: Vec::with_capacity(count),
            salaries: Vec::with_capacity(count * self.options.salary_records.max as usize),
            assignments: Vec::with_capacity(count),
        };

        for _ in 0..count {
            let employee = self.employee()?;
            self.salary_history(&employee, &mut records.salaries)?;
            self.assignments(&employee, departments, &mut records.assignments)?;
            records.employees.push(employee);
        }

        debug!(
            employees = records.employees.len(),
            salaries = records.salaries.len(),
            assignments = records.assignments.len(),
            reserved = self.tracker.len(),
            "batch generated"
        );
        Ok(records)
    }

    fn employee(&mut self) -> Result<Employee, GenerationError> {
        let id = self.tracker.reserve(&mut self.rng)?;

        let birth_earliest = years_before(self.reference_date, self.options.age_years.max)?;
        let birth_latest = years_before(self.reference_date, self.options.age_years.min)?;
        let birth_date = random_date(&mut self.rng, birth_earliest, birth_latest)?;

        let working_age = earliest_hire_date(birth_date, self.options.min_working_age_years)
            .ok_or_else(|| {
                GenerationError::DateOutOfRange(format!("working age after {birth_date}"))
            })?;
        let lookback = years_before(self.reference_date, self.options.hire_lookback_years)?;
        let hire_date = random_date(&mut self.rng, working_age.max(lookback), self.reference_date)?;

        let persona = self.persona.persona(&mut self.rng);
        let profile = if self.rng.random_bool(self.options.profile_probability) {
            Some(Payload::new(
                PROFILE_SCHEMA,
                json!({
                    "contact": persona.contact,
                    "locale": self.options.locale,
                }),
            ))
        } else {
            None
        };

        Ok(Employee {
            id,
            birth_date,
            first_name: persona.first_name,
            last_name: persona.last_name,
            gender: persona.gender,
            hire_date,
            profile,
        })
    }

    /// The first record starts at the hire date and stays open-ended; each
    /// later one starts at the previous nominal end, shifted by up to
    /// `interval_jitter_days`, so neighbouring intervals may overlap.
    fn salary_history(
        &mut self,
        employee: &Employee,
        salaries: &mut Vec<SalaryRecord>,
    ) -> Result<(), GenerationError> {
        let options = &self.options;
        let rng = &mut self.rng;

        let count = rng.random_range(options.salary_records.min..=options.salary_records.max);
        let mut amount =
            rng.random_range(options.base_salary.min..=options.base_salary.max) as f64;
        let mut cursor = shift(employee.hire_date, options.interval_days)?;

        for index in 0..count {
            let (valid_from, valid_to, pct) = if index == 0 {
                (employee.hire_date, OPEN_ENDED, 0.0)
            } else {
                let jitter = rng
                    .random_range(-options.interval_jitter_days..=options.interval_jitter_days);
                let valid_from = shift(cursor, jitter)?;
                let valid_to = shift(valid_from, options.interval_days)?;
                cursor = valid_to;

                let pct = rng.random_range(options.pct_change.min..=options.pct_change.max);
                amount *= 1.0 + pct / 100.0;
                (valid_from, valid_to, pct)
            };

            let outlier = rng.random_bool(options.outlier_probability);
            if outlier {
                amount *= rng.random_range(
                    options.outlier_multiplier.min..=options.outlier_multiplier.max,
                );
            }

            let details = if rng.random_bool(options.audit_probability) {
                Some(Payload::new(
                    SALARY_AUDIT_SCHEMA,
                    json!({
                        "sequence": index,
                        "reason": if index == 0 { "hire" } else { "review" },
                        "pct_change": (pct * 100.0).round() / 100.0,
                        "outlier": outlier,
                    }),
                ))
            } else {
                None
            };

            salaries.push(SalaryRecord {
                employee_id: employee.id,
                amount: amount.round().max(1.0) as i64,
                valid_from,
                valid_to,
                details,
            });
        }

        Ok(())
    }

    fn assignments(
        &mut self,
        employee: &Employee,
        departments: &[Department],
        assignments: &mut Vec<DepartmentAssignment>,
    ) -> Result<(), GenerationError> {
        let wanted = self.department_weights.sample(&mut self.rng) + 1;
        let picked = index::sample(&mut self.rng, departments.len(), wanted.min(departments.len()));

        for position in picked.iter() {
            let delay = self
                .rng
                .random_range(0..=self.options.assignment_jitter_days);
            assignments.push(DepartmentAssignment {
                employee_id: employee.id,
                department_code: departments[position].code.clone(),
                valid_from: shift(employee.hire_date, delay)?,
                valid_to: OPEN_ENDED,
            });
        }

        Ok(())
    }
}

impl<P, R> RecordGenerator<P, R> {
    /// Whether `id` has already been handed out in this run.
    pub fn is_reserved(&self, id: EmployeeId) -> bool {
        self.tracker.contains(id)
    }
}

fn years_before(date: NaiveDate, years: u32) -> Result<NaiveDate, GenerationError> {
    date.checked_sub_months(Months::new(years.saturating_mul(12)))
        .ok_or_else(|| GenerationError::DateOutOfRange(format!("{years} years before {date}")))
}

fn shift(date: NaiveDate, days: i64) -> Result<NaiveDate, GenerationError> {
    TimeDelta::try_days(days)
        .and_then(|delta| date.checked_add_signed(delta))
        .ok_or_else(|| GenerationError::DateOutOfRange(format!("{date} shifted by {days} days")))
}

fn random_date(
    rng: &mut dyn RngCore,
    earliest: NaiveDate,
    latest: NaiveDate,
) -> Result<NaiveDate, GenerationError> {
    if earliest > latest {
        return Err(GenerationError::DateOutOfRange(format!(
            "empty window {earliest}..={latest}"
        )));
    }
    let span = (latest - earliest).num_days();
    shift(earliest, rng.random_range(0..=span))
}
