use std::collections::{BTreeSet, HashSet};

use chrono::{Months, NaiveDate};

use crate::error::{Error, Result};
use crate::model::{BatchRecords, EmployeeId};

/// Earliest hire date allowed for someone born on `birth_date`.
pub fn earliest_hire_date(birth_date: NaiveDate, min_working_age_years: u32) -> Option<NaiveDate> {
    birth_date.checked_add_months(Months::new(min_working_age_years.saturating_mul(12)))
}

/// Validate the internal consistency of one batch.
///
/// This checks:
/// - employee identifiers are unique within the batch
/// - hire date is at least `min_working_age_years` after birth date
/// - every salary and assignment interval satisfies `valid_from < valid_to`
/// - every salary and assignment belongs to an employee of the batch
/// - every assignment references a known department
/// - every employee owns at least one salary and one assignment
pub fn validate_batch(
    records: &BatchRecords,
    min_working_age_years: u32,
    department_codes: &BTreeSet<String>,
) -> Result<()> {
    let mut ids: HashSet<EmployeeId> = HashSet::with_capacity(records.employees.len());

    for employee in &records.employees {
        if !ids.insert(employee.id) {
            return Err(Error::InvalidRecord(format!(
                "duplicate employee identifier {} in batch",
                employee.id
            )));
        }

        let earliest = earliest_hire_date(employee.birth_date, min_working_age_years)
            .ok_or_else(|| {
                Error::InvalidRecord(format!(
                    "employee {}: birth date {} out of range",
                    employee.id, employee.birth_date
                ))
            })?;
        if employee.hire_date < earliest {
            return Err(Error::InvalidRecord(format!(
                "employee {}: hired {} before minimum working age ({})",
                employee.id, employee.hire_date, earliest
            )));
        }
    }

    let mut with_salary = HashSet::new();
    for salary in &records.salaries {
        if !ids.contains(&salary.employee_id) {
            return Err(Error::InvalidRecord(format!(
                "salary references unknown employee {}",
                salary.employee_id
            )));
        }
        if salary.valid_from >= salary.valid_to {
            return Err(Error::InvalidRecord(format!(
                "employee {}: salary interval [{}, {}) is empty",
                salary.employee_id, salary.valid_from, salary.valid_to
            )));
        }
        if salary.amount <= 0 {
            return Err(Error::InvalidRecord(format!(
                "employee {}: non-positive salary {}",
                salary.employee_id, salary.amount
            )));
        }
        with_salary.insert(salary.employee_id);
    }

    let mut with_assignment = HashSet::new();
    for assignment in &records.assignments {
        if !ids.contains(&assignment.employee_id) {
            return Err(Error::InvalidRecord(format!(
                "assignment references unknown employee {}",
                assignment.employee_id
            )));
        }
        if !department_codes.contains(&assignment.department_code) {
            return Err(Error::InvalidRecord(format!(
                "employee {}: unknown department {}",
                assignment.employee_id, assignment.department_code
            )));
        }
        if assignment.valid_from >= assignment.valid_to {
            return Err(Error::InvalidRecord(format!(
                "employee {}: assignment interval [{}, {}) is empty",
                assignment.employee_id, assignment.valid_from, assignment.valid_to
            )));
        }
        with_assignment.insert(assignment.employee_id);
    }

    if let Some(employee) = records
        .employees
        .iter()
        .find(|employee| !with_salary.contains(&employee.id))
    {
        return Err(Error::InvalidRecord(format!(
            "employee {} has no salary history",
            employee.id
        )));
    }
    if let Some(employee) = records
        .employees
        .iter()
        .find(|employee| !with_assignment.contains(&employee.id))
    {
        return Err(Error::InvalidRecord(format!(
            "employee {} has no department assignment",
            employee.id
        )));
    }

    Ok(())
}
