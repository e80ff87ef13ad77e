use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// `valid_to` of a salary or assignment whose validity has no known end.
pub const OPEN_ENDED: NaiveDate = match NaiveDate::from_ymd_opt(9999, 1, 1) {
    Some(date) => date,
    None => NaiveDate::MAX,
};

/// Employee identifier, unique within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EmployeeId(pub i64);

impl EmployeeId {
    pub fn get(self) -> i64 {
        self.0
    }
}

impl fmt::Display for EmployeeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Gender {
    #[serde(rename = "M")]
    Male,
    #[serde(rename = "F")]
    Female,
}

impl Gender {
    /// Single-letter code stored in the `gender` column.
    pub fn code(self) -> &'static str {
        match self {
            Gender::Male => "M",
            Gender::Female => "F",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Department {
    pub code: String,
    pub name: String,
    pub budget: i64,
}

/// Opaque structured document attached to a record.
///
/// `schema` names the sub-schema the body follows (e.g. `profile/v1`); it is
/// versioned separately from the relational schema. The loader stores the
/// payload as-is and never looks inside `body`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
    pub body: Value,
}

impl Payload {
    pub fn new(schema: impl Into<String>, body: Value) -> Self {
        Self {
            schema: Some(schema.into()),
            body,
        }
    }

    pub fn untagged(body: Value) -> Self {
        Self { schema: None, body }
    }

    /// JSON document written to the store column.
    pub fn to_document(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Employee {
    pub id: EmployeeId,
    pub birth_date: NaiveDate,
    pub first_name: String,
    pub last_name: String,
    pub gender: Gender,
    pub hire_date: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile: Option<Payload>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SalaryRecord {
    pub employee_id: EmployeeId,
    pub amount: i64,
    pub valid_from: NaiveDate,
    pub valid_to: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Payload>,
}

impl SalaryRecord {
    pub fn is_open_ended(&self) -> bool {
        self.valid_to == OPEN_ENDED
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepartmentAssignment {
    pub employee_id: EmployeeId,
    pub department_code: String,
    pub valid_from: NaiveDate,
    pub valid_to: NaiveDate,
}

impl DepartmentAssignment {
    pub fn is_open_ended(&self) -> bool {
        self.valid_to == OPEN_ENDED
    }
}

/// The three record collections of one batch, committed as a unit.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchRecords {
    pub employees: Vec<Employee>,
    pub salaries: Vec<SalaryRecord>,
    pub assignments: Vec<DepartmentAssignment>,
}

impl BatchRecords {
    /// Number of employees in the batch.
    pub fn len(&self) -> usize {
        self.employees.len()
    }

    pub fn is_empty(&self) -> bool {
        self.employees.is_empty()
    }

    /// Total rows across all three tables.
    pub fn row_count(&self) -> usize {
        self.employees.len() + self.salaries.len() + self.assignments.len()
    }

    pub fn employee_ids(&self) -> impl Iterator<Item = EmployeeId> + '_ {
        self.employees.iter().map(|employee| employee.id)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn open_ended_sentinel_is_year_9999() {
        assert_eq!(OPEN_ENDED.format("%Y-%m-%d").to_string(), "9999-01-01");
    }

    #[test]
    fn payload_document_keeps_schema_tag() {
        let payload = Payload::new("profile/v1", json!({"city": "Lisbon"}));
        let document = payload.to_document();
        assert_eq!(document["schema"], "profile/v1");
        assert_eq!(document["body"]["city"], "Lisbon");

        let untagged = Payload::untagged(json!([1, 2])).to_document();
        assert!(untagged.get("schema").is_none());
    }

    #[test]
    fn gender_codes_match_column_values() {
        assert_eq!(Gender::Male.code(), "M");
        assert_eq!(Gender::Female.code(), "F");
        assert_eq!(serde_json::to_string(&Gender::Female).unwrap_or_default(), "\"F\"");
    }
}
