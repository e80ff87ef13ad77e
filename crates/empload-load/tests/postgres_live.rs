//! Runs against a real PostgreSQL when `TEST_DATABASE_URL` is set:
//! `cargo test -p empload-load -- --ignored`.

use std::str::FromStr;
use std::time::Duration;

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use sqlx::postgres::PgConnectOptions;

use empload_core::{SessionOption, SessionSetting};
use empload_generate::{GenerateOptions, RecordGenerator, default_departments};
use empload_load::{
    BatchLoader, ConnectionManager, Orchestrator, PostgresConnector, RetryPolicy, RunOptions,
    Session,
};

fn connector() -> Option<PostgresConnector> {
    let url = std::env::var("TEST_DATABASE_URL").ok()?;
    let options = PgConnectOptions::from_str(&url).ok()?;
    Some(PostgresConnector::from_options(options))
}

#[tokio::test]
#[ignore = "requires TEST_DATABASE_URL"]
async fn loads_into_postgres_and_restores_settings() -> anyhow::Result<()> {
    let Some(connector) = connector() else {
        return Ok(());
    };
    let manager = ConnectionManager::new(
        connector.clone(),
        RetryPolicy::fixed(2, Duration::from_millis(200)),
        SessionSetting::bulk_load_defaults(),
    );

    let departments = default_departments(&mut ChaCha8Rng::seed_from_u64(1));
    let generator = RecordGenerator::seeded(GenerateOptions::default(), 2024)?;
    let loader = BatchLoader::new(&departments, 18, 0.5, Box::new(ChaCha8Rng::seed_from_u64(9)));

    let inspector = ConnectionManager::new(
        connector,
        RetryPolicy::fixed(1, Duration::ZERO),
        Vec::new(),
    );
    let mut handle = inspector.acquire().await?;
    let before = match handle.session() {
        Some(session) => {
            session.provision_schema().await?;
            session.count_employees().await?
        }
        None => 0,
    };

    let mut orchestrator = Orchestrator::new(
        manager,
        generator,
        loader,
        departments,
        RunOptions {
            total_employees: 250,
            batch_size: 100,
            skip_if_populated: false,
            provision_schema: true,
            max_batch_reconnects: 1,
        },
    );
    let summary = orchestrator.run().await?;
    assert_eq!(summary.loaded + summary.discarded(), 250);

    if let Some(session) = handle.session() {
        assert_eq!(session.count_employees().await?, before + summary.loaded);
        assert_eq!(
            session.read_option(SessionOption::ReferentialChecks).await?,
            "origin"
        );
    }
    inspector.release(handle).await?;
    Ok(())
}
