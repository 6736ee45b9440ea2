mod config;
mod registry;

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::time::Instant;

use clap::{Args, Parser, Subcommand};
use modsmith_apply::{
    ApplyError, Batch, Done, StatusSender, ValidationReport, Validator, ValidatorOptions,
    ScratchDatabase, done_channel, status_channel,
};
use modsmith_compile::{
    CompileContext, CompileError, compile_sources, merged_report, render_batch, resolve_sources,
};
use modsmith_core::{DiagnosticReport, Error as CoreError, SchemaHandle, SchemaSnapshot, Severity};
use modsmith_introspect::{CacheError, SnapshotCache, latest_modified, probe_databases};
use thiserror::Error;
use tokio::sync::oneshot;
use uuid::Uuid;

use config::{ConfigError, ModsmithConfig, load_or_create_config};
use registry::{RunContext, RunPaths, init_run_logging, start_run, write_artifact, write_text};

#[derive(Debug, Error)]
enum CliError {
    #[error("registry error: {0}")]
    Registry(#[from] registry::RegistryError),
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("core error: {0}")]
    Core(#[from] CoreError),
    #[error("compile error: {0}")]
    Compile(#[from] CompileError),
    #[error("schema cache error: {0}")]
    Cache(#[from] CacheError),
    #[error("apply error: {0}")]
    Apply(#[from] ApplyError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("worker failed: {0}")]
    Worker(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

#[derive(Parser, Debug)]
#[command(name = "modsmith", version, about = "Compile, probe and validate game mod content")]
struct Cli {
    /// Configuration file; created with defaults when missing.
    #[arg(long, global = true, default_value = "modsmith.toml")]
    config: PathBuf,
    /// Output directory for runs.
    #[arg(long, global = true, default_value = "runs")]
    run_dir: PathBuf,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Infer the schema of reference databases.
    Probe(ProbeArgs),
    /// Compile mod files to SQL.
    Compile(CompileArgs),
    /// List content files in load order.
    Mods(ModsArgs),
    /// Apply base and mod content to a scratch copy and report failures.
    Apply(ApplyArgs),
}

#[derive(Args, Debug)]
struct ProbeArgs {
    /// Reference database(s) to probe.
    #[arg(long = "db", value_name = "PATH", required = true, num_args = 1..)]
    db: Vec<PathBuf>,
    /// Game installation used to compute the cache watermark.
    #[arg(long)]
    game_dir: Option<PathBuf>,
    /// Snapshot cache file.
    #[arg(long)]
    cache: Option<PathBuf>,
    /// Probe even when the cache is current.
    #[arg(long, default_value_t = false)]
    force: bool,
}

#[derive(Args, Debug)]
struct CompileArgs {
    /// XML or SQL files, compiled in order.
    #[arg(value_name = "FILE", required = true)]
    files: Vec<PathBuf>,
    /// Snapshot cache used to flag unknown tables and columns.
    #[arg(long)]
    schema: Option<PathBuf>,
    /// Optional output path for the rendered SQL.
    #[arg(long)]
    out: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct ModsArgs {
    /// Base content root(s).
    #[arg(long, value_name = "DIR", num_args = 1..)]
    base: Vec<PathBuf>,
    /// Mod root(s).
    #[arg(long, value_name = "DIR", num_args = 1..)]
    mods: Vec<PathBuf>,
}

#[derive(Args, Debug)]
struct ApplyArgs {
    /// Reference database; never modified.
    #[arg(long)]
    db: PathBuf,
    /// Scratch copy that receives the statements.
    #[arg(long)]
    scratch: PathBuf,
    /// Base content root(s).
    #[arg(long, value_name = "DIR", num_args = 1..)]
    base: Vec<PathBuf>,
    /// Mod root(s).
    #[arg(long, value_name = "DIR", num_args = 1..)]
    mods: Vec<PathBuf>,
    /// Extra files appended to the mod batch.
    #[arg(long, value_name = "PATH", num_args = 1..)]
    file: Vec<PathBuf>,
    /// Snapshot cache used by the compiler and validator.
    #[arg(long)]
    schema: Option<PathBuf>,
    /// Trace foreign-key violations back to source statements.
    #[arg(long, default_value_t = false)]
    deep: bool,
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    let cli = Cli::parse();
    let config = load_or_create_config(&cli.config)?;

    match cli.command {
        Command::Probe(args) => run_probe(args, &cli.run_dir, config).await,
        Command::Compile(args) => run_compile(args, &cli.run_dir, config),
        Command::Mods(args) => run_mods(args, &cli.run_dir, config),
        Command::Apply(args) => run_apply(args, &cli.run_dir, config).await,
    }
}

fn begin_run(
    command: &str,
    run_dir: &Path,
    config: &ModsmithConfig,
    inputs: serde_json::Value,
) -> Result<RunPaths, CliError> {
    let run_id = Uuid::new_v4().to_string();
    let ctx = RunContext {
        run_id: run_id.clone(),
        started_at: chrono::Utc::now(),
        command: command.to_string(),
        run_dir: run_dir.to_path_buf(),
    };
    let paths = start_run(&ctx, config, &inputs)?;
    init_run_logging(&paths.logs_path)?;
    tracing::info!(event = "run_started", run_id = %run_id, command = %command);
    Ok(paths)
}

fn finish_run(timer: Instant) {
    let duration_ms = timer.elapsed().as_millis();
    tracing::info!(event = "run_finished", status = "success", duration_ms = duration_ms);
}

fn log_diagnostics(report: &DiagnosticReport, status: Option<&StatusSender>) {
    for diagnostic in report.iter() {
        match diagnostic.severity {
            Severity::Error => tracing::error!(
                event = "diagnostic",
                code = %diagnostic.code,
                source = %diagnostic.source,
                message = %diagnostic.message
            ),
            Severity::Warning => tracing::warn!(
                event = "diagnostic",
                code = %diagnostic.code,
                source = %diagnostic.source,
                message = %diagnostic.message
            ),
        }
        if let Some(status) = status {
            status.send(diagnostic.to_string());
        }
    }
}

/// Load a cached snapshot into a fresh handle.
fn load_schema(path: Option<&Path>) -> Result<Option<SchemaHandle>, CliError> {
    let Some(path) = path else {
        return Ok(None);
    };
    let handle = SchemaHandle::default();
    match SnapshotCache::new(path, handle.clone()).load()? {
        Some(_) => Ok(Some(handle)),
        None => Err(CliError::InvalidInput(format!(
            "schema cache {} does not exist",
            path.display()
        ))),
    }
}

async fn run_probe(args: ProbeArgs, run_dir: &Path, config: ModsmithConfig) -> Result<(), CliError> {
    let inputs = serde_json::json!({
        "db": args.db,
        "game_dir": args.game_dir,
        "cache": args.cache,
        "force": args.force,
    });
    let run = begin_run("probe", run_dir, &config, inputs)?;
    let timer = Instant::now();

    let handle = SchemaHandle::default();
    let cache = args
        .cache
        .as_ref()
        .map(|path| SnapshotCache::new(path, handle.clone()));

    if let Some(cache) = &cache {
        if !args.force && !cache.needs_rebuild(args.game_dir.as_deref())? {
            if let Some(snapshot) = cache.load()? {
                tracing::info!(event = "schema_cache_current", path = %cache.path().display());
                write_artifact(&run, "schema.json", &snapshot, None)?;
                println!("schema cache is current ({} tables)", snapshot.table_count());
                finish_run(timer);
                return Ok(());
            }
        }
    }

    let watermark = match &args.game_dir {
        Some(dir) => latest_modified(dir)?,
        None => None,
    };
    tracing::info!(event = "probe_started", databases = args.db.len());
    let snapshot = probe_databases(&args.db, &config.probe, watermark).await?;

    if let Some(cache) = &cache {
        cache.store(snapshot.clone())?;
    }
    let path = write_artifact(&run, "schema.json", &snapshot, None)?;
    tracing::info!(event = "schema_written", path = %path.display());
    println!(
        "probed {} table(s) from {} database(s)",
        snapshot.table_count(),
        snapshot.databases.len()
    );

    finish_run(timer);
    Ok(())
}

fn run_compile(args: CompileArgs, run_dir: &Path, config: ModsmithConfig) -> Result<(), CliError> {
    let inputs = serde_json::json!({
        "files": args.files,
        "schema": args.schema,
        "out": args.out,
    });
    let run = begin_run("compile", run_dir, &config, inputs)?;
    let timer = Instant::now();

    let handle = load_schema(args.schema.as_deref())?;
    let snapshot = handle.as_ref().map(SchemaHandle::load);
    let problems: BTreeSet<String> = config.compile.problem_modifiers.iter().cloned().collect();
    let ctx = CompileContext {
        schema: snapshot.as_deref(),
        problem_modifiers: Some(&problems),
    };

    let files = compile_sources(&args.files, &ctx, &AtomicBool::new(false));
    let diagnostics = merged_report(&files);
    log_diagnostics(&diagnostics, None);

    let statements = render_batch(&files)?;
    let mut sql = String::new();
    for statement in &statements {
        sql.push_str(&statement.sql);
        sql.push('\n');
    }
    let path = write_text(&run, "compiled.sql", &sql, args.out.as_deref())?;
    write_artifact(&run, "diagnostics.json", &diagnostics, None)?;
    tracing::info!(
        event = "compile_finished",
        files = files.len(),
        statements = statements.len(),
        errors = diagnostics.errors.len(),
        warnings = diagnostics.warnings.len(),
        path = %path.display()
    );

    if args.out.is_none() {
        print!("{sql}");
    }
    finish_run(timer);
    Ok(())
}

fn run_mods(args: ModsArgs, run_dir: &Path, config: ModsmithConfig) -> Result<(), CliError> {
    if args.base.is_empty() && args.mods.is_empty() {
        return Err(CliError::InvalidInput(
            "at least one --base or --mods root is required".to_string(),
        ));
    }
    let inputs = serde_json::json!({ "base": args.base, "mods": args.mods });
    let run = begin_run("mods", run_dir, &config, inputs)?;
    let timer = Instant::now();

    let resolved = resolve_sources(&args.base, &args.mods, &config.compile.priority_packages);
    log_diagnostics(&resolved.report, None);
    write_artifact(&run, "sources.json", &resolved, None)?;

    for file in &resolved.files {
        println!("{}\t{}", file.package_id, file.path.display());
    }
    finish_run(timer);
    Ok(())
}

struct ApplyJob {
    reference: PathBuf,
    scratch: PathBuf,
    base_files: Vec<PathBuf>,
    mod_files: Vec<PathBuf>,
    schema: Option<SchemaHandle>,
    problems: BTreeSet<String>,
    options: ValidatorOptions,
}

async fn run_apply(args: ApplyArgs, run_dir: &Path, config: ModsmithConfig) -> Result<(), CliError> {
    let inputs = serde_json::json!({
        "db": args.db,
        "scratch": args.scratch,
        "base": args.base,
        "mods": args.mods,
        "file": args.file,
        "schema": args.schema,
        "deep": args.deep,
    });
    let run = begin_run("apply", run_dir, &config, inputs)?;
    let timer = Instant::now();

    let resolved = resolve_sources(&args.base, &args.mods, &config.compile.priority_packages);
    log_diagnostics(&resolved.report, None);
    let (base_files, mod_files): (Vec<_>, Vec<_>) =
        resolved.files.into_iter().partition(|file| file.is_base);
    let base_files = base_files.into_iter().map(|file| file.path).collect();
    let mut mod_paths: Vec<PathBuf> = mod_files.into_iter().map(|file| file.path).collect();
    mod_paths.extend(args.file.iter().cloned());

    let mut options = config.apply.clone();
    options.deep_fk_diagnosis |= args.deep;
    let job = ApplyJob {
        reference: args.db,
        scratch: args.scratch,
        base_files,
        mod_files: mod_paths,
        schema: load_schema(args.schema.as_deref())?,
        problems: config.compile.problem_modifiers.iter().cloned().collect(),
        options,
    };

    let (status, mut messages) = status_channel(
        config.status.capacity,
        config.status.fallback_log.as_deref(),
    )?;
    let (done_tx, done_rx) = done_channel();

    let consumer = tokio::spawn(async move {
        let mut received = 0usize;
        while let Some(message) = messages.recv().await {
            eprintln!("{message}");
            received += 1;
        }
        received
    });
    let worker = tokio::spawn(apply_worker(job, status, done_tx));

    let done = done_rx
        .await
        .map_err(|_| CliError::Worker("worker exited without signalling completion".to_string()))?;
    let report = worker
        .await
        .map_err(|err| CliError::Worker(err.to_string()))??;
    let streamed = consumer
        .await
        .map_err(|err| CliError::Worker(err.to_string()))?;

    let path = write_artifact(&run, "report.json", &report, None)?;
    for line in report.render_lines() {
        println!("{line}");
    }
    tracing::info!(
        event = "apply_finished",
        clean = done.ok,
        summary = %done.summary,
        status_messages = streamed,
        path = %path.display()
    );
    finish_run(timer);
    Ok(())
}

async fn apply_worker(
    job: ApplyJob,
    status: StatusSender,
    done: oneshot::Sender<Done>,
) -> Result<ValidationReport, CliError> {
    let result = apply_job(job, &status).await;
    let signal = match &result {
        Ok(report) => Done {
            ok: report.is_clean(),
            summary: format!(
                "{} failure(s), {} healed, {} foreign-key violation(s)",
                report.failure_count(),
                report.healed.len(),
                report.fk_violation_count()
            ),
        },
        Err(err) => Done {
            ok: false,
            summary: err.to_string(),
        },
    };
    if done.send(signal).is_err() {
        tracing::debug!(event = "done_unobserved");
    }
    result
}

async fn apply_job(job: ApplyJob, status: &StatusSender) -> Result<ValidationReport, CliError> {
    let cancel = AtomicBool::new(false);
    let handle = job.schema.clone().unwrap_or_default();
    let batches = {
        let snapshot: Option<Arc<SchemaSnapshot>> = job.schema.as_ref().map(SchemaHandle::load);
        let ctx = CompileContext {
            schema: snapshot.as_deref(),
            problem_modifiers: Some(&job.problems),
        };
        let mut batches = Vec::new();
        for (name, files) in [("base", &job.base_files), ("mods", &job.mod_files)] {
            if files.is_empty() {
                continue;
            }
            status.send(format!("compiling {} {name} file(s)", files.len()));
            let compiled = compile_sources(files, &ctx, &cancel);
            log_diagnostics(&merged_report(&compiled), Some(status));
            batches.push(Batch::new(name, render_batch(&compiled)?));
        }
        batches
    };

    let scratch = ScratchDatabase::create(&job.reference, &job.scratch)?;
    let validator = Validator::new(handle, job.options).with_status(status.clone());
    let report = validator.apply_batches(&scratch, &batches, &cancel).await?;
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn apply_arguments_parse() {
        let cli = Cli::try_parse_from([
            "modsmith",
            "apply",
            "--db",
            "ref.sqlite",
            "--scratch",
            "tmp/scratch.sqlite",
            "--mods",
            "mods/a",
            "mods/b",
            "--file",
            "extra.sql",
            "--deep",
        ])
        .unwrap();
        assert_eq!(cli.run_dir, PathBuf::from("runs"));
        let Command::Apply(args) = cli.command else {
            panic!("expected apply");
        };
        assert!(args.base.is_empty());
        assert_eq!(args.mods.len(), 2);
        assert_eq!(args.file, vec![PathBuf::from("extra.sql")]);
        assert!(args.deep);
    }

    #[test]
    fn probe_requires_a_database() {
        assert!(Cli::try_parse_from(["modsmith", "probe"]).is_err());
        let cli = Cli::try_parse_from(["modsmith", "probe", "--db", "a.sqlite", "b.sqlite", "--force"])
            .unwrap();
        let Command::Probe(args) = cli.command else {
            panic!("expected probe");
        };
        assert_eq!(args.db.len(), 2);
        assert!(args.force);
    }

    #[test]
    fn missing_schema_cache_is_invalid_input() {
        let dir = tempfile::tempdir().unwrap();
        let result = load_schema(Some(&dir.path().join("absent.json")));
        assert!(matches!(result, Err(CliError::InvalidInput(_))));
        assert!(load_schema(None).unwrap().is_none());
    }
}
