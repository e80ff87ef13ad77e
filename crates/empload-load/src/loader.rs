use std::collections::BTreeSet;
use std::time::{Duration, Instant};

use rand::{Rng, RngCore};
use serde::Serialize;
use tracing::{debug, warn};

use empload_core::{BatchRecords, Department, IntegrityKind, validate_batch};

use crate::error::{LoadError, StoreError};
use crate::store::Session;

/// A batch that made it into the store.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchCommit {
    pub index: usize,
    pub employees: usize,
    pub salaries: usize,
    pub assignments: usize,
    pub elapsed: Duration,
    pub statistics_refreshed: bool,
}

/// A batch that was rolled back and skipped.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchFailure {
    pub index: usize,
    pub kind: IntegrityKind,
    pub employees: usize,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum BatchOutcome {
    Committed(BatchCommit),
    Rejected(BatchFailure),
}

/// Commits whole batches and occasionally refreshes planner statistics.
pub struct BatchLoader {
    department_codes: BTreeSet<String>,
    min_working_age_years: u32,
    stats_refresh_probability: f64,
    rng: Box<dyn RngCore + Send>,
}

impl BatchLoader {
    pub fn new(
        departments: &[Department],
        min_working_age_years: u32,
        stats_refresh_probability: f64,
        rng: Box<dyn RngCore + Send>,
    ) -> Self {
        Self {
            department_codes: departments.iter().map(|dept| dept.code.clone()).collect(),
            min_working_age_years,
            stats_refresh_probability: stats_refresh_probability.clamp(0.0, 1.0),
            rng,
        }
    }

    /// Commit one batch atomically.
    ///
    /// Integrity failures, whether caught before sending or raised by the
    /// store, come back as [`BatchOutcome::Rejected`]. Transient failures are
    /// returned as errors so the caller can reconnect and retry the batch.
    pub async fn commit<S: Session>(
        &mut self,
        session: &mut S,
        index: usize,
        records: &BatchRecords,
    ) -> Result<BatchOutcome, LoadError> {
        let started = Instant::now();

        if let Err(err) = validate_batch(records, self.min_working_age_years, &self.department_codes)
        {
            warn!(batch = index, error = %err, "batch failed validation");
            return Ok(BatchOutcome::Rejected(BatchFailure {
                index,
                kind: IntegrityKind::Invalid,
                employees: records.len(),
                message: err.to_string(),
            }));
        }

        match session.insert_batch(records).await {
            Ok(()) => {}
            Err(StoreError::Integrity { kind, message }) => {
                warn!(batch = index, kind = %kind, error = %message, "batch rolled back");
                return Ok(BatchOutcome::Rejected(BatchFailure {
                    index,
                    kind,
                    employees: records.len(),
                    message,
                }));
            }
            Err(err) => return Err(err.into()),
        }

        let statistics_refreshed = if self.rng.random_bool(self.stats_refresh_probability) {
            match session.refresh_statistics().await {
                Ok(()) => {
                    debug!(batch = index, "statistics refreshed");
                    true
                }
                Err(err) => {
                    warn!(batch = index, error = %err, "statistics refresh failed");
                    false
                }
            }
        } else {
            false
        };

        Ok(BatchOutcome::Committed(BatchCommit {
            index,
            employees: records.employees.len(),
            salaries: records.salaries.len(),
            assignments: records.assignments.len(),
            elapsed: started.elapsed(),
            statistics_refreshed,
        }))
    }
}
