use std::fs::{OpenOptions, create_dir_all};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;

use modsmith_core::SCHEMA_VERSION;

use crate::config::ModsmithConfig;

use super::{RegistryError, RegistryResult};

/// Metadata captured at run start.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub command: String,
    pub run_dir: PathBuf,
}

/// JSON config written to each run directory.
#[derive(Debug, Serialize)]
struct RunConfig<'a> {
    run_id: &'a str,
    started_at: String,
    command: &'a str,
    schema_version: &'a str,
    config: &'a ModsmithConfig,
    inputs: &'a serde_json::Value,
}

/// Paths for run artifacts.
#[derive(Debug, Clone)]
pub struct RunPaths {
    pub root: PathBuf,
    pub config_path: PathBuf,
    pub logs_path: PathBuf,
}

impl RunPaths {
    pub fn artifact(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }
}

pub fn start_run(
    ctx: &RunContext,
    config: &ModsmithConfig,
    inputs: &serde_json::Value,
) -> RegistryResult<RunPaths> {
    let timestamp = ctx.started_at.format("%Y-%m-%dT%H-%M-%SZ").to_string();
    let root = ctx.run_dir.join(format!("{timestamp}__run_{}", ctx.run_id));

    create_dir_all(&root)?;

    let config_path = root.join("config.json");
    let logs_path = root.join("logs.ndjson");

    let run_config = RunConfig {
        run_id: &ctx.run_id,
        started_at: ctx.started_at.to_rfc3339(),
        command: &ctx.command,
        schema_version: SCHEMA_VERSION,
        config,
        inputs,
    };
    write_json(&config_path, &run_config)?;

    OpenOptions::new()
        .create(true)
        .append(true)
        .open(&logs_path)?;

    Ok(RunPaths {
        root,
        config_path,
        logs_path,
    })
}

/// Write `value` as `name` in the run directory, and to `out` when given.
pub fn write_artifact<T: Serialize>(
    paths: &RunPaths,
    name: &str,
    value: &T,
    out: Option<&Path>,
) -> RegistryResult<PathBuf> {
    let path = paths.artifact(name);
    write_json(&path, value)?;
    if let Some(out) = out {
        ensure_parent(out)?;
        write_json(out, value)?;
    }
    Ok(path)
}

/// Text counterpart of [`write_artifact`].
pub fn write_text(
    paths: &RunPaths,
    name: &str,
    text: &str,
    out: Option<&Path>,
) -> RegistryResult<PathBuf> {
    let path = paths.artifact(name);
    write_bytes(&path, text.as_bytes())?;
    if let Some(out) = out {
        ensure_parent(out)?;
        write_bytes(out, text.as_bytes())?;
    }
    Ok(path)
}

fn ensure_parent(path: &Path) -> RegistryResult<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            create_dir_all(parent)?;
        }
    }
    Ok(())
}

fn write_bytes(path: &Path, data: &[u8]) -> RegistryResult<()> {
    let mut file = OpenOptions::new().create(true).truncate(true).write(true).open(path)?;
    file.write_all(data)?;
    Ok(())
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> RegistryResult<()> {
    let file = OpenOptions::new().create(true).truncate(true).write(true).open(path)?;
    serde_json::to_writer_pretty(file, value).map_err(RegistryError::from)
}
