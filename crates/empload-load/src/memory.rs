//! In-memory store with injectable faults.
//!
//! Mirrors the relational schema closely enough to exercise the loader: key
//! uniqueness, references to employees and departments, per-session options,
//! and all-or-nothing batches.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use empload_core::{
    BatchRecords, Department, DepartmentAssignment, Employee, EmployeeId, IntegrityKind,
    SalaryRecord, SessionOption, SessionSetting,
};

use crate::error::StoreError;
use crate::store::{Connector, Session};

const ENGINE: &str = "memory";

/// Failures the store should produce, counted from the first call.
#[derive(Debug, Clone, Default)]
pub struct FaultPlan {
    /// Number of leading connection attempts that are refused.
    pub failing_connects: u32,
    /// `insert_batch` calls (1-based) that hit a constraint after the
    /// employees were written, so the rollback has something to undo.
    pub integrity_failures: BTreeSet<u32>,
    /// `insert_batch` calls (1-based) that lose the connection.
    pub transient_failures: BTreeSet<u32>,
    /// Options the store does not know about.
    pub unsupported_options: Vec<SessionOption>,
    /// Options whose change the store rejects outright.
    pub failing_options: Vec<SessionOption>,
    /// Number of leading `provision_schema` calls that lose the connection.
    pub failing_provisions: u32,
    /// A transient failure leaves the session dead: every later call on it,
    /// restores included, fails as well.
    pub transient_breaks_session: bool,
}

#[derive(Debug, Default)]
struct State {
    departments: BTreeMap<String, Department>,
    employees: BTreeMap<EmployeeId, Employee>,
    salaries: Vec<SalaryRecord>,
    assignments: Vec<DepartmentAssignment>,
    options: HashMap<SessionOption, String>,
    provisioned: bool,
    connect_attempts: u32,
    provision_calls: u32,
    insert_calls: u32,
    statistics_refreshes: u32,
    faults: FaultPlan,
}

impl State {
    fn option(&self, option: SessionOption) -> String {
        self.options
            .get(&option)
            .cloned()
            .unwrap_or_else(|| default_value(option).to_string())
    }

    fn referential_checks(&self) -> bool {
        self.option(SessionOption::ReferentialChecks) == "on"
    }
}

fn default_value(option: SessionOption) -> &'static str {
    match option {
        SessionOption::UniquenessChecks | SessionOption::ReferentialChecks => "on",
        SessionOption::Durability => "strict",
    }
}

/// Shared handle to an in-memory store. Clones see the same data.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<State>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_faults(faults: FaultPlan) -> Self {
        let store = Self::default();
        store.lock().faults = faults;
        store
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn employee_count(&self) -> usize {
        self.lock().employees.len()
    }

    pub fn salary_count(&self) -> usize {
        self.lock().salaries.len()
    }

    pub fn assignment_count(&self) -> usize {
        self.lock().assignments.len()
    }

    pub fn department_count(&self) -> usize {
        self.lock().departments.len()
    }

    pub fn employees(&self) -> Vec<Employee> {
        self.lock().employees.values().cloned().collect()
    }

    pub fn salaries(&self) -> Vec<SalaryRecord> {
        self.lock().salaries.clone()
    }

    pub fn assignments(&self) -> Vec<DepartmentAssignment> {
        self.lock().assignments.clone()
    }

    pub fn is_provisioned(&self) -> bool {
        self.lock().provisioned
    }

    pub fn connect_attempts(&self) -> u32 {
        self.lock().connect_attempts
    }

    pub fn provision_calls(&self) -> u32 {
        self.lock().provision_calls
    }

    pub fn insert_calls(&self) -> u32 {
        self.lock().insert_calls
    }

    pub fn statistics_refreshes(&self) -> u32 {
        self.lock().statistics_refreshes
    }

    /// Current value of a session option as the store would report it.
    pub fn option_value(&self, option: SessionOption) -> String {
        self.lock().option(option)
    }

    /// True when every option is back at its default.
    pub fn tuning_is_default(&self) -> bool {
        let state = self.lock();
        [
            SessionOption::UniquenessChecks,
            SessionOption::ReferentialChecks,
            SessionOption::Durability,
        ]
        .into_iter()
        .all(|option| state.option(option) == default_value(option))
    }

    /// Place an employee directly, bypassing batches.
    pub fn insert_employee(&self, employee: Employee) {
        self.lock().employees.insert(employee.id, employee);
    }
}

#[async_trait]
impl Connector for MemoryStore {
    type Session = MemorySession;

    fn engine(&self) -> &'static str {
        ENGINE
    }

    async fn connect(&self) -> Result<MemorySession, StoreError> {
        let mut state = self.lock();
        state.connect_attempts += 1;
        if state.connect_attempts <= state.faults.failing_connects {
            return Err(StoreError::Transient(format!(
                "connection refused (attempt {})",
                state.connect_attempts
            )));
        }
        Ok(MemorySession {
            store: self.clone(),
            broken: false,
        })
    }
}

pub struct MemorySession {
    store: MemoryStore,
    broken: bool,
}

impl MemorySession {
    /// Lock the store, failing if this session already lost its connection.
    fn live(&self) -> Result<MutexGuard<'_, State>, StoreError> {
        if self.broken {
            return Err(closed());
        }
        Ok(self.store.lock())
    }

    fn lose_connection(&mut self, state: &State, message: String) -> StoreError {
        if state.faults.transient_breaks_session {
            self.broken = true;
        }
        StoreError::Transient(message)
    }

    fn check_option(state: &State, option: SessionOption) -> Result<(), StoreError> {
        if state.faults.unsupported_options.contains(&option) {
            return Err(StoreError::Unsupported {
                engine: ENGINE,
                what: format!("no {option} switch"),
            });
        }
        Ok(())
    }
}

fn closed() -> StoreError {
    StoreError::Transient("session connection is closed".to_string())
}

fn integrity(kind: IntegrityKind, message: impl Into<String>) -> StoreError {
    StoreError::Integrity {
        kind,
        message: message.into(),
    }
}

#[async_trait]
impl Session for MemorySession {
    async fn read_option(&mut self, option: SessionOption) -> Result<String, StoreError> {
        let state = self.live()?;
        Self::check_option(&state, option)?;
        Ok(state.option(option))
    }

    async fn apply_setting(&mut self, setting: SessionSetting) -> Result<(), StoreError> {
        let mut state = self.live()?;
        let option = setting.option();
        Self::check_option(&state, option)?;
        if state.faults.failing_options.contains(&option) {
            return Err(StoreError::Other(format!("cannot change {option}")));
        }
        let value = match setting {
            SessionSetting::DisableUniquenessChecks(disable)
            | SessionSetting::DisableReferentialChecks(disable) => {
                if disable { "off" } else { "on" }
            }
            SessionSetting::DurabilityLevel(level) => level.as_str(),
        };
        state.options.insert(option, value.to_string());
        Ok(())
    }

    async fn restore_option(&mut self, option: SessionOption, raw: &str) -> Result<(), StoreError> {
        self.live()?.options.insert(option, raw.to_string());
        Ok(())
    }

    async fn provision_schema(&mut self) -> Result<(), StoreError> {
        let store = self.store.clone();
        let mut state = store.lock();
        if self.broken {
            return Err(closed());
        }
        state.provision_calls += 1;
        let call = state.provision_calls;
        if call <= state.faults.failing_provisions {
            let message = format!("connection reset during provisioning {call}");
            return Err(self.lose_connection(&state, message));
        }
        state.provisioned = true;
        Ok(())
    }

    async fn seed_departments(&mut self, departments: &[Department]) -> Result<(), StoreError> {
        let mut state = self.live()?;
        for department in departments {
            state
                .departments
                .entry(department.code.clone())
                .or_insert_with(|| department.clone());
        }
        Ok(())
    }

    async fn count_employees(&mut self) -> Result<u64, StoreError> {
        Ok(self.live()?.employees.len() as u64)
    }

    async fn insert_batch(&mut self, records: &BatchRecords) -> Result<(), StoreError> {
        let store = self.store.clone();
        let mut state = store.lock();
        if self.broken {
            return Err(closed());
        }
        state.insert_calls += 1;
        let call = state.insert_calls;

        if state.faults.transient_failures.contains(&call) {
            let message = format!("connection reset during insert {call}");
            return Err(self.lose_connection(&state, message));
        }

        // Work on copies; only a fully successful batch replaces the state.
        let mut employees = state.employees.clone();
        for employee in &records.employees {
            if employees.insert(employee.id, employee.clone()).is_some() {
                return Err(integrity(
                    IntegrityKind::Uniqueness,
                    format!("duplicate employee identifier {}", employee.id),
                ));
            }
        }

        if state.faults.integrity_failures.contains(&call) {
            return Err(integrity(
                IntegrityKind::Check,
                format!("constraint violated in insert {call}"),
            ));
        }

        let enforce_references = state.referential_checks();
        let mut salaries = state.salaries.clone();
        for salary in &records.salaries {
            if enforce_references && !employees.contains_key(&salary.employee_id) {
                return Err(integrity(
                    IntegrityKind::Referential,
                    format!("salary references unknown employee {}", salary.employee_id),
                ));
            }
            salaries.push(salary.clone());
        }

        let mut assignments = state.assignments.clone();
        let mut keys: BTreeSet<_> = assignments
            .iter()
            .map(|a| (a.employee_id, a.department_code.clone(), a.valid_from))
            .collect();
        for assignment in &records.assignments {
            if enforce_references
                && (!employees.contains_key(&assignment.employee_id)
                    || !state.departments.contains_key(&assignment.department_code))
            {
                return Err(integrity(
                    IntegrityKind::Referential,
                    format!(
                        "assignment {} -> {} references a missing row",
                        assignment.employee_id, assignment.department_code
                    ),
                ));
            }
            let key = (
                assignment.employee_id,
                assignment.department_code.clone(),
                assignment.valid_from,
            );
            if !keys.insert(key) {
                return Err(integrity(
                    IntegrityKind::Uniqueness,
                    format!(
                        "duplicate assignment {} -> {} from {}",
                        assignment.employee_id, assignment.department_code, assignment.valid_from
                    ),
                ));
            }
            assignments.push(assignment.clone());
        }

        state.employees = employees;
        state.salaries = salaries;
        state.assignments = assignments;
        Ok(())
    }

    async fn refresh_statistics(&mut self) -> Result<(), StoreError> {
        self.live()?.statistics_refreshes += 1;
        Ok(())
    }

    async fn close(self) -> Result<(), StoreError> {
        Ok(())
    }
}
