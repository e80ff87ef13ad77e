use std::fs::{OpenOptions, create_dir_all};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;

use empload_core::config::RedactedConfig;
use empload_generate::GenerateOptions;
use empload_load::RunSummary;

use super::{RegistryError, RegistryResult};

/// Metadata captured at run start.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub run_dir: PathBuf,
    pub seed: u64,
    pub config: RedactedConfig,
    pub generator: GenerateOptions,
}

/// JSON config written to each run directory.
#[derive(Debug, Serialize)]
struct RunConfig<'a> {
    run_id: &'a str,
    started_at: String,
    engine: &'a str,
    seed: u64,
    config: &'a RedactedConfig,
    generator: &'a GenerateOptions,
}

/// Paths for run artifacts.
#[derive(Debug, Clone)]
pub struct RunPaths {
    pub root: PathBuf,
    pub logs_path: PathBuf,
    pub summary_path: PathBuf,
}

pub fn start_run(ctx: &RunContext) -> RegistryResult<RunPaths> {
    let timestamp = ctx.started_at.format("%Y-%m-%dT%H-%M-%SZ").to_string();
    let root = ctx.run_dir.join(format!("{timestamp}__run_{}", ctx.run_id));

    create_dir_all(&root)?;

    let config_path = root.join("config.json");
    let logs_path = root.join("logs.ndjson");
    let summary_path = root.join("summary.json");

    let config = RunConfig {
        run_id: &ctx.run_id,
        started_at: ctx.started_at.to_rfc3339(),
        engine: &ctx.config.connection.engine,
        seed: ctx.seed,
        config: &ctx.config,
        generator: &ctx.generator,
    };
    write_json(&config_path, &config)?;

    OpenOptions::new()
        .create(true)
        .append(true)
        .open(&logs_path)?;

    Ok(RunPaths {
        root,
        logs_path,
        summary_path,
    })
}

pub fn write_summary(paths: &RunPaths, summary: &RunSummary) -> RegistryResult<()> {
    write_json(&paths.summary_path, summary)
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> RegistryResult<()> {
    let file = OpenOptions::new()
        .create(true)
        .truncate(true)
        .write(true)
        .open(path)?;
    serde_json::to_writer_pretty(file, value).map_err(RegistryError::from)
}
