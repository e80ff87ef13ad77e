mod registry;

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use registry::{RunContext, init_logging, start_run, write_summary};
use thiserror::Error;
use uuid::Uuid;

use empload_core::{Engine, Error as CoreError, LoadConfig};
use empload_generate::{GenerateOptions, GenerationError, RecordGenerator, default_departments};
use empload_load::{
    BatchLoader, ConnectionManager, Connector, LoadError, MySqlConnector, Orchestrator,
    PostgresConnector, RetryPolicy, RunOptions, RunSummary,
};

#[derive(Debug, Error)]
enum CliError {
    #[error("registry error: {0}")]
    Registry(#[from] registry::RegistryError),
    #[error(transparent)]
    Core(#[from] CoreError),
    #[error(transparent)]
    Load(#[from] LoadError),
    #[error(transparent)]
    Generation(#[from] GenerationError),
    #[error("invalid generator profile {path}: {message}")]
    Profile { path: PathBuf, message: String },
}

impl CliError {
    /// 2 for bad configuration, 3 for an unreachable store, 1 otherwise.
    fn exit_code(&self) -> u8 {
        match self {
            CliError::Core(CoreError::Config(_))
            | CliError::Profile { .. }
            | CliError::Generation(GenerationError::InvalidOptions(_))
            | CliError::Registry(registry::RegistryError::Filter { .. }) => 2,
            CliError::Load(err) if err.is_config() => 2,
            CliError::Core(CoreError::Connection { .. }) => 3,
            CliError::Load(err) if err.is_connection() => 3,
            _ => 1,
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "empload", version, about = "Synthetic employee data loader")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate employees and load them in batches.
    Load(LoadArgs),
    /// Print the resolved configuration with secrets redacted.
    Config(ConfigArgs),
}

#[derive(Args, Debug)]
struct LoadArgs {
    /// Dotenv file read before the process environment.
    #[arg(long, value_name = "PATH")]
    env_file: Option<PathBuf>,
    /// Employees per batch (overrides BATCH_SIZE).
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    batch_size: Option<u64>,
    /// Total employees to generate (overrides TOTAL_EMPLOYEES).
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    total: Option<u64>,
    /// RNG seed (overrides SEED).
    #[arg(long)]
    seed: Option<u64>,
    /// Do nothing when employees already exist.
    #[arg(long, default_value_t = false)]
    skip_if_populated: bool,
    /// Assume the tables and departments already exist.
    #[arg(long, default_value_t = false)]
    no_provision: bool,
    /// TOML file with generator options.
    #[arg(long, value_name = "PATH")]
    generator_profile: Option<PathBuf>,
    /// Output directory for runs.
    #[arg(long, default_value = "runs")]
    run_dir: PathBuf,
}

#[derive(Args, Debug)]
struct ConfigArgs {
    /// Dotenv file read before the process environment.
    #[arg(long, value_name = "PATH")]
    env_file: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Load(args) => run_load(args).await,
        Command::Config(args) => show_config(args),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(event = "exit", error = %err);
            eprintln!("empload: {err}");
            ExitCode::from(err.exit_code())
        }
    }
}

async fn run_load(args: LoadArgs) -> Result<(), CliError> {
    let mut config = LoadConfig::from_env(args.env_file.as_deref())?;
    if let Some(batch_size) = args.batch_size {
        config.batch_size = usize::try_from(batch_size)
            .map_err(|_| CoreError::Config(format!("batch size {batch_size} is too large")))?;
    }
    if let Some(total) = args.total {
        config.total_employees = total;
    }
    if args.seed.is_some() {
        config.seed = args.seed;
    }
    config.skip_if_populated |= args.skip_if_populated;

    let generate_options = match &args.generator_profile {
        Some(path) => load_profile(path)?,
        None => GenerateOptions::default(),
    };
    generate_options.validate()?;

    let seed = config.seed.unwrap_or_else(rand::random);
    let ctx = RunContext {
        run_id: Uuid::new_v4().to_string(),
        started_at: chrono::Utc::now(),
        run_dir: args.run_dir,
        seed,
        config: config.redacted(),
        generator: generate_options.clone(),
    };

    let paths = start_run(&ctx)?;
    init_logging(&config.log_level, Some(&paths.logs_path))?;

    tracing::info!(
        event = "run_registered",
        run_id = %ctx.run_id,
        path = %paths.root.display(),
        connection = %ctx.config.connection.redacted,
        seed
    );

    let mut master = ChaCha8Rng::seed_from_u64(seed);
    let departments = default_departments(&mut master);
    let loader = BatchLoader::new(
        &departments,
        generate_options.min_working_age_years,
        config.stats_refresh_probability,
        Box::new(ChaCha8Rng::from_rng(&mut master)),
    );
    let generator =
        RecordGenerator::with_rng(generate_options, ChaCha8Rng::from_rng(&mut master))?;
    let options = RunOptions {
        total_employees: config.total_employees,
        batch_size: config.batch_size,
        skip_if_populated: config.skip_if_populated,
        provision_schema: !args.no_provision,
        max_batch_reconnects: config.max_batch_reconnects,
    };

    let summary = match config.connection.engine {
        Engine::Postgres => {
            let connector = PostgresConnector::new(&config.connection);
            execute(connector, &config, generator, loader, departments, options).await?
        }
        Engine::Mysql => {
            let connector = MySqlConnector::new(&config.connection);
            execute(connector, &config, generator, loader, departments, options).await?
        }
    };

    write_summary(&paths, &summary)?;
    tracing::info!(
        event = "summary_written",
        path = %paths.summary_path.display(),
        requested = summary.requested,
        loaded = summary.loaded,
        failed_batches = summary.failures.len()
    );
    Ok(())
}

async fn execute<C: Connector>(
    connector: C,
    config: &LoadConfig,
    generator: RecordGenerator,
    loader: BatchLoader,
    departments: Vec<empload_core::Department>,
    options: RunOptions,
) -> Result<RunSummary, LoadError> {
    let retry = RetryPolicy::fixed(config.max_connection_retries, config.retry_delay);
    let manager = ConnectionManager::new(connector, retry, config.session_tuning.clone());
    Orchestrator::new(manager, generator, loader, departments, options)
        .run()
        .await
}

fn load_profile(path: &Path) -> Result<GenerateOptions, CliError> {
    let profile = |message: String| CliError::Profile {
        path: path.to_path_buf(),
        message,
    };
    let content = std::fs::read_to_string(path).map_err(|err| profile(err.to_string()))?;
    toml::from_str(&content).map_err(|err| profile(err.to_string()))
}

fn show_config(args: ConfigArgs) -> Result<(), CliError> {
    let config = LoadConfig::from_env(args.env_file.as_deref())?;
    let rendered = serde_json::to_string_pretty(&config.redacted())
        .map_err(registry::RegistryError::from)?;
    println!("{rendered}");
    Ok(())
}
