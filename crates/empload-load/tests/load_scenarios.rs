use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use empload_core::{
    BatchRecords, Department, Employee, EmployeeId, Error as CoreError, Gender, IntegrityKind,
    SessionOption, SessionSetting,
};
use empload_generate::{FakePersonaProvider, GenerateOptions, RecordGenerator, default_departments};
use empload_load::{
    BatchLoader, BatchOutcome, ConnectionManager, Connector, FaultPlan, LoadError, MemoryStore,
    Orchestrator, RetryPolicy, RunOptions, RunState, Sleeper,
};

#[derive(Default)]
struct RecordingSleeper {
    delays: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    fn delays(&self) -> Vec<Duration> {
        self.delays.lock().expect("sleeper lock").clone()
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        self.delays.lock().expect("sleeper lock").push(duration);
    }
}

struct Harness {
    total: u64,
    batch_size: usize,
    retry: RetryPolicy,
    tuning: Vec<SessionSetting>,
    skip_if_populated: bool,
    max_batch_reconnects: u32,
    stats_refresh_probability: f64,
    sleeper: Arc<RecordingSleeper>,
}

impl Default for Harness {
    fn default() -> Self {
        Self {
            total: 10,
            batch_size: 5,
            retry: RetryPolicy::fixed(3, Duration::from_secs(2)),
            tuning: SessionSetting::bulk_load_defaults(),
            skip_if_populated: false,
            max_batch_reconnects: 3,
            stats_refresh_probability: 0.0,
            sleeper: Arc::new(RecordingSleeper::default()),
        }
    }
}

fn departments() -> Vec<Department> {
    default_departments(&mut ChaCha8Rng::seed_from_u64(11))
}

impl Harness {
    fn build(
        &self,
        store: &MemoryStore,
    ) -> Orchestrator<MemoryStore, FakePersonaProvider, ChaCha8Rng> {
        let options = GenerateOptions {
            reference_date: NaiveDate::from_ymd_opt(2024, 1, 1),
            ..GenerateOptions::default()
        };
        let generator = RecordGenerator::seeded(options, 7).expect("generator");
        let departments = departments();
        let loader = BatchLoader::new(
            &departments,
            18,
            self.stats_refresh_probability,
            Box::new(ChaCha8Rng::seed_from_u64(3)),
        );
        let manager = ConnectionManager::new(store.clone(), self.retry, self.tuning.clone())
            .with_sleeper(self.sleeper.clone());
        Orchestrator::new(
            manager,
            generator,
            loader,
            departments,
            RunOptions {
                total_employees: self.total,
                batch_size: self.batch_size,
                skip_if_populated: self.skip_if_populated,
                provision_schema: true,
                max_batch_reconnects: self.max_batch_reconnects,
            },
        )
    }
}

#[tokio::test]
async fn loads_every_batch_when_nothing_fails() -> anyhow::Result<()> {
    let store = MemoryStore::new();
    let harness = Harness {
        total: 23,
        ..Harness::default()
    };
    let mut orchestrator = harness.build(&store);

    let summary = orchestrator.run().await?;

    assert_eq!(summary.requested, 23);
    assert_eq!(summary.loaded, 23);
    assert_eq!(summary.batches_attempted, 5);
    assert_eq!(summary.batches_committed, 5);
    assert!(summary.failures.is_empty());
    assert!(summary.tuning_restored);
    assert_eq!(orchestrator.state(), RunState::Terminated);

    assert!(store.is_provisioned());
    assert_eq!(store.department_count(), 10);
    assert_eq!(store.employee_count(), 23);
    assert!(store.salary_count() >= 46);
    assert!(store.assignment_count() >= 23);
    assert!(store.tuning_is_default());
    Ok(())
}

#[tokio::test]
async fn failed_batch_is_skipped_and_run_continues() -> anyhow::Result<()> {
    let store = MemoryStore::with_faults(FaultPlan {
        integrity_failures: [2].into(),
        ..FaultPlan::default()
    });
    let mut orchestrator = Harness::default().build(&store);

    let summary = orchestrator.run().await?;

    assert_eq!(store.employee_count(), 5);
    assert_eq!(summary.loaded, 5);
    assert_eq!(summary.shortfall(), 5);
    assert_eq!(summary.discarded(), 5);
    assert_eq!(summary.failures.len(), 1);
    assert_eq!(summary.failures[0].index, 2);
    assert_eq!(summary.failures[0].kind, IntegrityKind::Check);
    Ok(())
}

#[tokio::test]
async fn failure_mid_batch_leaves_nothing_behind() -> anyhow::Result<()> {
    let store = MemoryStore::with_faults(FaultPlan {
        integrity_failures: [1].into(),
        ..FaultPlan::default()
    });
    let mut orchestrator = Harness {
        total: 5,
        ..Harness::default()
    }
    .build(&store);

    let summary = orchestrator.run().await?;

    assert_eq!(summary.loaded, 0);
    assert_eq!(store.employee_count(), 0);
    assert_eq!(store.salary_count(), 0);
    assert_eq!(store.assignment_count(), 0);
    Ok(())
}

#[tokio::test]
async fn unreachable_store_fails_after_bounded_attempts() {
    let store = MemoryStore::with_faults(FaultPlan {
        failing_connects: 3,
        ..FaultPlan::default()
    });
    let harness = Harness::default();
    let mut orchestrator = harness.build(&store);

    let err = orchestrator.run().await.expect_err("connection must fail");

    assert!(matches!(
        err,
        LoadError::Core(CoreError::Connection { attempts: 3, .. })
    ));
    assert!(err.is_connection());
    assert_eq!(store.connect_attempts(), 3);
    assert_eq!(store.employee_count(), 0);
    assert!(store.tuning_is_default());
    assert_eq!(
        harness.sleeper.delays(),
        [Duration::from_secs(2), Duration::from_secs(2)]
    );
}

#[tokio::test]
async fn connection_recovers_within_retry_budget() -> anyhow::Result<()> {
    let store = MemoryStore::with_faults(FaultPlan {
        failing_connects: 2,
        ..FaultPlan::default()
    });
    let harness = Harness {
        retry: RetryPolicy::exponential(
            5,
            Duration::from_millis(100),
            2,
            Duration::from_secs(1),
        ),
        ..Harness::default()
    };
    let mut orchestrator = harness.build(&store);

    let summary = orchestrator.run().await?;

    assert_eq!(summary.loaded, 10);
    assert_eq!(store.connect_attempts(), 3);
    assert_eq!(
        harness.sleeper.delays(),
        [Duration::from_millis(100), Duration::from_millis(200)]
    );
    Ok(())
}

#[tokio::test]
async fn skip_if_populated_leaves_existing_data_alone() -> anyhow::Result<()> {
    let store = MemoryStore::new();
    store.insert_employee(Employee {
        id: EmployeeId(10_001),
        birth_date: NaiveDate::from_ymd_opt(1980, 5, 17).expect("date"),
        first_name: "Ada".to_string(),
        last_name: "Byron".to_string(),
        gender: Gender::Female,
        hire_date: NaiveDate::from_ymd_opt(2005, 3, 1).expect("date"),
        profile: None,
    });
    let mut orchestrator = Harness {
        skip_if_populated: true,
        ..Harness::default()
    }
    .build(&store);

    let summary = orchestrator.run().await?;

    assert!(summary.skipped_populated);
    assert_eq!(summary.loaded, 0);
    assert_eq!(store.insert_calls(), 0);
    assert_eq!(store.employee_count(), 1);
    assert!(store.tuning_is_default());
    Ok(())
}

#[tokio::test]
async fn transient_failure_reconnects_and_retries_the_batch() -> anyhow::Result<()> {
    let store = MemoryStore::with_faults(FaultPlan {
        transient_failures: [2].into(),
        ..FaultPlan::default()
    });
    let mut orchestrator = Harness {
        total: 15,
        ..Harness::default()
    }
    .build(&store);

    let summary = orchestrator.run().await?;

    assert_eq!(summary.loaded, 15);
    assert_eq!(summary.reconnects, 1);
    assert!(summary.failures.is_empty());
    assert_eq!(store.connect_attempts(), 2);
    assert_eq!(store.insert_calls(), 4);
    assert!(store.tuning_is_default());
    Ok(())
}

#[tokio::test]
async fn repeated_transient_failures_exhaust_reconnect_budget() {
    let store = MemoryStore::with_faults(FaultPlan {
        transient_failures: [1, 2, 3].into(),
        ..FaultPlan::default()
    });
    let mut orchestrator = Harness {
        max_batch_reconnects: 2,
        ..Harness::default()
    }
    .build(&store);

    let err = orchestrator.run().await.expect_err("reconnect budget exhausted");

    assert!(err.is_connection());
    assert_eq!(store.employee_count(), 0);
    assert_eq!(store.connect_attempts(), 3);
    assert!(store.tuning_is_default());
}

#[tokio::test]
async fn lost_session_does_not_leak_tuning_into_the_next_one() -> anyhow::Result<()> {
    let store = MemoryStore::with_faults(FaultPlan {
        transient_failures: [1].into(),
        transient_breaks_session: true,
        ..FaultPlan::default()
    });
    let mut orchestrator = Harness::default().build(&store);

    let summary = orchestrator.run().await?;

    assert_eq!(summary.loaded, 10);
    assert_eq!(summary.reconnects, 1);
    assert_eq!(store.connect_attempts(), 2);
    assert_eq!(store.insert_calls(), 3);
    assert!(summary.tuning_restored);
    assert_eq!(store.option_value(SessionOption::Durability), "strict");
    assert_eq!(store.option_value(SessionOption::ReferentialChecks), "on");
    assert!(store.tuning_is_default());
    Ok(())
}

#[tokio::test]
async fn tuning_on_a_lost_final_session_is_reported_as_applied() {
    let store = MemoryStore::with_faults(FaultPlan {
        transient_failures: [1, 2, 3].into(),
        transient_breaks_session: true,
        ..FaultPlan::default()
    });
    let mut orchestrator = Harness {
        max_batch_reconnects: 2,
        ..Harness::default()
    }
    .build(&store);

    let err = orchestrator.run().await.expect_err("reconnect budget exhausted");

    assert!(err.is_connection());
    assert!(!orchestrator.manager().tuning_restored());
    assert_eq!(store.option_value(SessionOption::Durability), "relaxed");
}

#[tokio::test]
async fn transient_failure_during_provisioning_reconnects() -> anyhow::Result<()> {
    let store = MemoryStore::with_faults(FaultPlan {
        failing_provisions: 2,
        ..FaultPlan::default()
    });
    let mut orchestrator = Harness::default().build(&store);

    let summary = orchestrator.run().await?;

    assert_eq!(summary.loaded, 10);
    assert_eq!(summary.reconnects, 2);
    assert_eq!(store.provision_calls(), 3);
    assert_eq!(store.connect_attempts(), 3);
    assert!(store.is_provisioned());
    assert_eq!(store.department_count(), 10);
    assert!(summary.tuning_restored);
    assert!(store.tuning_is_default());
    Ok(())
}

#[tokio::test]
async fn provisioning_gives_up_after_reconnect_budget() {
    let store = MemoryStore::with_faults(FaultPlan {
        failing_provisions: 5,
        ..FaultPlan::default()
    });
    let mut orchestrator = Harness {
        max_batch_reconnects: 1,
        ..Harness::default()
    }
    .build(&store);

    let err = orchestrator.run().await.expect_err("provisioning keeps failing");

    assert!(err.is_connection());
    assert_eq!(store.provision_calls(), 2);
    assert_eq!(store.insert_calls(), 0);
    assert_eq!(store.employee_count(), 0);
    assert!(store.tuning_is_default());
}

#[tokio::test]
async fn partial_tuning_is_reverted_when_an_option_fails() {
    let store = MemoryStore::with_faults(FaultPlan {
        failing_options: vec![SessionOption::Durability],
        ..FaultPlan::default()
    });
    let harness = Harness {
        retry: RetryPolicy::fixed(2, Duration::ZERO),
        ..Harness::default()
    };
    let mut orchestrator = harness.build(&store);

    let err = orchestrator.run().await.expect_err("tuning cannot complete");

    assert!(matches!(
        err,
        LoadError::Core(CoreError::Connection { attempts: 2, .. })
    ));
    assert!(store.tuning_is_default());
    assert_eq!(store.employee_count(), 0);
}

#[tokio::test]
async fn unsupported_option_is_skipped() -> anyhow::Result<()> {
    let store = MemoryStore::with_faults(FaultPlan {
        unsupported_options: vec![SessionOption::UniquenessChecks],
        ..FaultPlan::default()
    });
    let manager = ConnectionManager::new(
        store.clone(),
        RetryPolicy::fixed(1, Duration::ZERO),
        SessionSetting::bulk_load_defaults(),
    );

    let handle = manager.acquire().await?;
    let applied: Vec<_> = handle.applied_options().collect();
    assert_eq!(
        applied,
        [SessionOption::ReferentialChecks, SessionOption::Durability]
    );
    assert_eq!(store.option_value(SessionOption::ReferentialChecks), "off");
    assert_eq!(store.option_value(SessionOption::Durability), "relaxed");

    manager.release(handle).await?;
    assert!(store.tuning_is_default());
    Ok(())
}

#[tokio::test]
async fn statistics_refresh_follows_probability() -> anyhow::Result<()> {
    let store = MemoryStore::new();
    let mut orchestrator = Harness {
        total: 20,
        stats_refresh_probability: 1.0,
        ..Harness::default()
    }
    .build(&store);

    let summary = orchestrator.run().await?;

    assert_eq!(summary.statistics_refreshes, 4);
    assert_eq!(store.statistics_refreshes(), 4);
    Ok(())
}

#[tokio::test]
async fn invalid_batch_is_rejected_before_reaching_the_store() -> anyhow::Result<()> {
    let store = MemoryStore::new();
    let departments = departments();
    let mut loader = BatchLoader::new(&departments, 18, 0.0, Box::new(ChaCha8Rng::seed_from_u64(1)));
    let mut session = store.connect().await?;

    // Hired at age ten, and without any salary or assignment.
    let records = BatchRecords {
        employees: vec![Employee {
            id: EmployeeId(42),
            birth_date: NaiveDate::from_ymd_opt(2000, 1, 1).expect("date"),
            first_name: "Too".to_string(),
            last_name: "Young".to_string(),
            gender: Gender::Male,
            hire_date: NaiveDate::from_ymd_opt(2010, 1, 1).expect("date"),
            profile: None,
        }],
        ..BatchRecords::default()
    };

    let outcome = loader.commit(&mut session, 1, &records).await?;

    match outcome {
        BatchOutcome::Rejected(failure) => assert_eq!(failure.kind, IntegrityKind::Invalid),
        other => panic!("expected rejection, got {other:?}"),
    }
    assert_eq!(store.insert_calls(), 0);
    Ok(())
}

#[tokio::test]
async fn zero_batch_size_is_a_config_error() {
    let store = MemoryStore::new();
    let mut orchestrator = Harness {
        batch_size: 0,
        ..Harness::default()
    }
    .build(&store);

    let err = orchestrator.run().await.expect_err("config error");
    assert!(err.is_config());
    assert_eq!(store.connect_attempts(), 0);
}
