use std::fmt;
use std::time::Instant;

use rand::RngCore;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use empload_core::{Department, Error as CoreError};
use empload_generate::{PersonaProvider, RecordGenerator};

use crate::connection::{ConnectionManager, SessionHandle};
use crate::error::{LoadError, StoreError};
use crate::loader::{BatchFailure, BatchLoader, BatchOutcome};
use crate::store::{Connector, Session};

#[derive(Debug, Clone, PartialEq)]
pub struct RunOptions {
    pub total_employees: u64,
    pub batch_size: usize,
    pub skip_if_populated: bool,
    /// Create missing tables and seed departments before loading.
    pub provision_schema: bool,
    /// Reconnects allowed for a single batch before the run gives up.
    pub max_batch_reconnects: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Connecting,
    Generating,
    Loading,
    Done,
    Terminated,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunState::Idle => "idle",
            RunState::Connecting => "connecting",
            RunState::Generating => "generating",
            RunState::Loading => "loading",
            RunState::Done => "done",
            RunState::Terminated => "terminated",
        };
        f.write_str(name)
    }
}

/// Requested versus loaded counts, reported at the end of every run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunSummary {
    pub requested: u64,
    pub loaded: u64,
    pub batches_attempted: u64,
    pub batches_committed: u64,
    pub failures: Vec<BatchFailure>,
    pub statistics_refreshes: u64,
    pub reconnects: u64,
    /// Set when the run stopped early because the store already had employees.
    pub skipped_populated: bool,
    pub tuning_restored: bool,
    pub elapsed_ms: u64,
}

impl RunSummary {
    fn new(requested: u64) -> Self {
        Self {
            requested,
            tuning_restored: true,
            ..Self::default()
        }
    }

    /// Employees discarded with failed batches.
    pub fn discarded(&self) -> u64 {
        self.failures.iter().map(|failure| failure.employees as u64).sum()
    }

    pub fn shortfall(&self) -> u64 {
        self.requested.saturating_sub(self.loaded)
    }

    fn rows_per_second(&self) -> f64 {
        if self.elapsed_ms == 0 {
            return self.loaded as f64;
        }
        self.loaded as f64 * 1000.0 / self.elapsed_ms as f64
    }
}

/// Drives a run: connect, provision, then generate and commit batch by batch.
pub struct Orchestrator<C: Connector, P, R> {
    manager: ConnectionManager<C>,
    generator: RecordGenerator<P, R>,
    loader: BatchLoader,
    departments: Vec<Department>,
    options: RunOptions,
    state: RunState,
}

impl<C, P, R> Orchestrator<C, P, R>
where
    C: Connector,
    P: PersonaProvider,
    R: RngCore,
{
    pub fn new(
        manager: ConnectionManager<C>,
        generator: RecordGenerator<P, R>,
        loader: BatchLoader,
        departments: Vec<Department>,
        options: RunOptions,
    ) -> Self {
        Self {
            manager,
            generator,
            loader,
            departments,
            options,
            state: RunState::Idle,
        }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn manager(&self) -> &ConnectionManager<C> {
        &self.manager
    }

    pub async fn run(&mut self) -> Result<RunSummary, LoadError> {
        let started = Instant::now();
        let mut summary = RunSummary::new(self.options.total_employees);
        let engine = self.manager.engine();

        if self.options.batch_size == 0 {
            self.transition(RunState::Terminated);
            return Err(CoreError::Config("batch size must be positive".to_string()).into());
        }

        info!(
            event = "run_started",
            engine,
            total = self.options.total_employees,
            batch_size = self.options.batch_size,
            "load run started"
        );

        self.transition(RunState::Connecting);
        let handle = match self.manager.acquire().await {
            Ok(handle) => handle,
            Err(err) => {
                self.transition(RunState::Terminated);
                error!(event = "run_failed", engine, error = %err, loaded = 0, "could not connect");
                return Err(err);
            }
        };

        let mut slot = Some(handle);
        let result = self.drive(&mut slot, &mut summary).await;

        if let Some(handle) = slot.take() {
            if let Err(err) = self.manager.release(handle).await {
                warn!(event = "tuning_restore_failed", engine, error = %err, "session tuning may still be applied");
            }
        }
        summary.tuning_restored = self.manager.tuning_restored();
        summary.elapsed_ms = started.elapsed().as_millis() as u64;

        match result {
            Ok(()) => {
                self.transition(RunState::Done);
                info!(
                    event = "run_finished",
                    engine,
                    requested = summary.requested,
                    loaded = summary.loaded,
                    failed_batches = summary.failures.len(),
                    discarded = summary.discarded(),
                    reconnects = summary.reconnects,
                    elapsed_ms = summary.elapsed_ms,
                    rows_per_second = summary.rows_per_second(),
                    "load run finished"
                );
                self.transition(RunState::Terminated);
                Ok(summary)
            }
            Err(err) => {
                self.transition(RunState::Terminated);
                error!(
                    event = "run_failed",
                    engine,
                    error = %err,
                    requested = summary.requested,
                    loaded = summary.loaded,
                    "load run aborted"
                );
                Err(err)
            }
        }
    }

    async fn drive(
        &mut self,
        slot: &mut Option<SessionHandle<C::Session>>,
        summary: &mut RunSummary,
    ) -> Result<(), LoadError> {
        let mut reconnects = 0;
        let existing = loop {
            let session = live_session(slot)?;
            match self.prepare(session).await {
                Ok(existing) => break existing,
                Err(LoadError::Core(CoreError::Transient(message))) => {
                    self.recover(slot, summary, &mut reconnects, "preparation", message)
                        .await?;
                }
                Err(err) => return Err(err),
            }
        };
        if existing > 0 {
            info!(event = "run_skipped", existing, "store already populated");
            summary.skipped_populated = true;
            return Ok(());
        }

        let total = self.options.total_employees;
        let mut processed: u64 = 0;
        let mut index = 0;

        while processed < total {
            index += 1;
            let size = (total - processed).min(self.options.batch_size as u64) as usize;

            self.transition(RunState::Generating);
            let records = self.generator.generate(size, &self.departments)?;

            self.transition(RunState::Loading);
            summary.batches_attempted += 1;
            let mut reconnects = 0;
            let outcome = loop {
                let session = live_session(slot)?;
                match self.loader.commit(session, index, &records).await {
                    Ok(outcome) => break outcome,
                    Err(LoadError::Core(CoreError::Transient(message))) => {
                        let scope = format!("batch {index}");
                        self.recover(slot, summary, &mut reconnects, &scope, message)
                            .await?;
                        self.transition(RunState::Loading);
                    }
                    Err(err) => return Err(err),
                }
            };
            processed += size as u64;

            match outcome {
                BatchOutcome::Committed(commit) => {
                    summary.loaded += commit.employees as u64;
                    summary.batches_committed += 1;
                    if commit.statistics_refreshed {
                        summary.statistics_refreshes += 1;
                    }
                    info!(
                        event = "batch_committed",
                        batch = index,
                        employees = commit.employees,
                        salaries = commit.salaries,
                        assignments = commit.assignments,
                        elapsed_ms = commit.elapsed.as_millis() as u64,
                        loaded = summary.loaded,
                        total,
                        "batch committed"
                    );
                }
                BatchOutcome::Rejected(failure) => {
                    warn!(
                        event = "batch_skipped",
                        batch = index,
                        kind = %failure.kind,
                        employees = failure.employees,
                        "batch skipped"
                    );
                    summary.failures.push(failure);
                }
            }
        }
        Ok(())
    }

    /// Create the tables, seed departments and, when asked to, count the
    /// employees already present. Every step is idempotent, so a transient
    /// failure can rerun the whole sequence on a new session.
    async fn prepare(&self, session: &mut C::Session) -> Result<u64, LoadError> {
        if self.options.provision_schema {
            session.provision_schema().await?;
            session.seed_departments(&self.departments).await?;
            debug!(departments = self.departments.len(), "schema provisioned");
        }
        if self.options.skip_if_populated {
            return Ok(session.count_employees().await?);
        }
        Ok(0)
    }

    /// Replace a session lost to a transient failure. `reconnects` counts
    /// against `max_batch_reconnects` for the step named by `scope`.
    async fn recover(
        &mut self,
        slot: &mut Option<SessionHandle<C::Session>>,
        summary: &mut RunSummary,
        reconnects: &mut u32,
        scope: &str,
        message: String,
    ) -> Result<(), LoadError> {
        if *reconnects >= self.options.max_batch_reconnects {
            return Err(CoreError::Connection {
                attempts: *reconnects + 1,
                message: format!("{scope} kept failing: {message}"),
            }
            .into());
        }
        *reconnects += 1;
        summary.reconnects += 1;
        warn!(
            event = "session_reconnect",
            scope,
            reconnect = *reconnects,
            error = %message,
            "connection lost, retrying on a new session"
        );

        if let Some(broken) = slot.take() {
            if !self.manager.discard(broken).await {
                warn!(
                    event = "tuning_restore_failed",
                    scope,
                    "lost session kept its tuning; the next session restores it"
                );
            }
        }
        self.transition(RunState::Connecting);
        *slot = Some(self.manager.acquire().await?);
        Ok(())
    }

    fn transition(&mut self, next: RunState) {
        if self.state != next {
            debug!(from = %self.state, to = %next, "state transition");
        }
        self.state = next;
    }
}

fn live_session<S: Session>(slot: &mut Option<SessionHandle<S>>) -> Result<&mut S, LoadError> {
    slot.as_mut()
        .and_then(SessionHandle::session)
        .ok_or_else(|| LoadError::Store(StoreError::Other("no live session".to_string())))
}
