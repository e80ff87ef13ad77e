use std::collections::HashSet;

use rand::{Rng, RngCore};

use empload_core::EmployeeId;

use crate::errors::GenerationError;
use crate::model::Bounds;

/// Random draws attempted before falling back to a linear probe.
pub const MAX_RANDOM_PROBES: u32 = 64;

/// Reservation set guaranteeing each employee identifier is handed out once
/// per run.
///
/// Identifiers of batches that later fail to commit stay reserved; the
/// tracker never takes anything back short of [`reset`](Self::reset).
#[derive(Debug, Clone)]
pub struct IdentifierTracker {
    min: i64,
    max: i64,
    reserved: HashSet<i64>,
}

impl IdentifierTracker {
    pub fn new(range: Bounds<i64>) -> Result<Self, GenerationError> {
        if range.min > range.max {
            return Err(GenerationError::InvalidOptions(
                "identifier_range: min must not exceed max".to_string(),
            ));
        }
        if range.max.abs_diff(range.min) == u64::MAX {
            return Err(GenerationError::InvalidOptions(
                "identifier_range: span must be narrower than the full i64 range".to_string(),
            ));
        }
        Ok(Self {
            min: range.min,
            max: range.max,
            reserved: HashSet::new(),
        })
    }

    /// Number of distinct identifiers the range can produce.
    pub fn capacity(&self) -> u64 {
        self.max.abs_diff(self.min) + 1
    }

    pub fn len(&self) -> usize {
        self.reserved.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reserved.is_empty()
    }

    pub fn contains(&self, id: EmployeeId) -> bool {
        self.reserved.contains(&id.get())
    }

    /// Forget every reservation, e.g. between runs.
    pub fn reset(&mut self) {
        self.reserved.clear();
    }

    /// Claim an identifier that has not been handed out in this run.
    ///
    /// Draws uniformly from the range; once [`MAX_RANDOM_PROBES`] draws have
    /// collided, scans forward from a random offset instead, so a nearly full
    /// range still resolves in bounded time.
    pub fn reserve(&mut self, rng: &mut dyn RngCore) -> Result<EmployeeId, GenerationError> {
        let capacity = self.capacity();
        if self.reserved.len() as u64 >= capacity {
            return Err(self.exhausted());
        }

        for _ in 0..MAX_RANDOM_PROBES {
            let candidate = rng.random_range(self.min..=self.max);
            if self.reserved.insert(candidate) {
                return Ok(EmployeeId(candidate));
            }
        }

        let start = rng.random_range(0..capacity);
        for offset in 0..capacity {
            let step = match capacity - start {
                head if offset < head => start + offset,
                head => offset - head,
            };
            let candidate = self.min.saturating_add_unsigned(step);
            if self.reserved.insert(candidate) {
                return Ok(EmployeeId(candidate));
            }
        }

        Err(self.exhausted())
    }

    fn exhausted(&self) -> GenerationError {
        GenerationError::IdentifierSpaceExhausted {
            min: self.min,
            max: self.max,
            capacity: self.capacity(),
        }
    }
}
