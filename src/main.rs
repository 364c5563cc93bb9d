use anyhow::{Context, Result};
use data_pipeline::cli::commands::{HistoryCommand, ListCommand, RunCommand, ValidateCommand};
use data_pipeline::cli::output::*;
use data_pipeline::cli::{Cli, Command};
use data_pipeline::core::{ExecutionStatus, PipelineConfig};
use data_pipeline::execution::{ExecutionEngine, ExecutionEvent, Freshness, RunOptions};
#[cfg(feature = "sqlite")]
use data_pipeline::persistence::SqliteRunStore;
use data_pipeline::persistence::{create_summary, HistoryBackend, InMemoryHistory, RunSummary};
use data_pipeline::storage::{ArtifactStore, LocalArtifactStore};
use data_pipeline::{Catalog, FunctionRegistry};
use indicatif::ProgressBar;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{error, Level};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::from_args();

    // Initialize logging
    let log_level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder().with_max_level(log_level).finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set logging subscriber")?;

    // Execute command
    match &cli.command {
        Command::Run(cmd) => run_pipeline(cmd, &cli.pipelines).await?,
        Command::Validate(cmd) => validate_pipelines(cmd, &cli.pipelines)?,
        Command::List(cmd) => list_pipelines(cmd, &cli.pipelines).await?,
        Command::History(cmd) => show_history(cmd).await?,
    }

    Ok(())
}

/// Open the run history; without the sqlite feature history lives in memory
async fn history_backend(ephemeral: bool) -> Result<Arc<dyn HistoryBackend>> {
    #[cfg(feature = "sqlite")]
    if !ephemeral {
        return Ok(Arc::new(SqliteRunStore::with_default_path().await?));
    }
    #[cfg(not(feature = "sqlite"))]
    let _ = ephemeral;
    Ok(Arc::new(InMemoryHistory::new()))
}

fn load_catalog(dir: &str, overrides: &[(String, String)]) -> Result<Catalog> {
    let mut configs = PipelineConfig::load_dir(dir)?;
    for config in &mut configs {
        for (key, value) in overrides {
            config.variables.insert(key.clone(), value.clone());
        }
    }
    Catalog::from_configs(configs, &FunctionRegistry::with_builtins())
}

async fn run_pipeline(cmd: &RunCommand, dir: &str) -> Result<()> {
    let mut catalog = load_catalog(dir, &cmd.variables).context("Failed to load pipelines")?;
    let target = catalog.pipeline(&cmd.pipeline)?;

    println!(
        "{} Loaded pipeline: {} ({} tasks)",
        INFO,
        style(&target.name).bold(),
        style(target.tasks().len()).cyan()
    );
    for (key, value) in &cmd.variables {
        println!(
            "{} Variable override: {} = {}",
            INFO,
            style(key).cyan(),
            style(value).dim()
        );
    }

    let history = history_backend(cmd.no_history).await?;

    let mut options = RunOptions::default().force(cmd.force.iter().cloned());
    if cmd.force_all {
        options = options.overwrite();
    }
    if !cmd.only.is_empty() {
        options = options.only(cmd.only.iter().cloned());
    }
    if cmd.fresh {
        options = options.with_freshness(Freshness::InputsNewer);
    }

    // Create execution engine
    let engine = ExecutionEngine::new(Arc::new(LocalArtifactStore::new()), cmd.scheduling_strategy());

    // Progress bar per pipeline; event lines are printed above it
    let progress: Arc<Mutex<Option<ProgressBar>>> = Arc::new(Mutex::new(None));
    let bar = progress.clone();
    engine
        .add_event_handler(move |event| {
            let mut bar = bar.lock().unwrap_or_else(PoisonError::into_inner);
            if let ExecutionEvent::PipelineStarted { total_tasks, .. } = &event {
                *bar = Some(create_progress_bar(*total_tasks));
            }

            let line = format_execution_event(&event);
            match bar.as_ref() {
                Some(progress) => progress.println(line),
                None => println!("{}", line),
            }

            match &event {
                ExecutionEvent::TaskCached { .. }
                | ExecutionEvent::TaskSucceeded { .. }
                | ExecutionEvent::TaskFailed { .. } => {
                    if let Some(progress) = bar.as_ref() {
                        progress.inc(1);
                    }
                }
                ExecutionEvent::PipelineCompleted { .. } => {
                    if let Some(progress) = bar.take() {
                        progress.finish_and_clear();
                    }
                }
                _ => {}
            }
        })
        .await;

    // Execute pipeline and everything upstream of it
    println!();
    let result = catalog.run(&cmd.pipeline, &engine, &options).await;

    // Save every pipeline that ran to history
    if !cmd.no_history {
        for name in catalog.run_order(&cmd.pipeline)? {
            let pipeline = catalog.pipeline(&name)?;
            if pipeline.state.started_at.is_none() {
                continue;
            }
            let summary = create_summary(pipeline);
            history.save_run(&summary).await?;
            println!(
                "{} Run of {} saved to history (ID: {})",
                INFO,
                style(&name).bold(),
                style(&summary.execution_id.to_string()[..8]).dim()
            );
        }
    }

    // Print final status
    let pipeline = catalog.pipeline(&cmd.pipeline)?;
    println!();
    for task in pipeline.tasks() {
        println!("  {} {}", format_task_status(&task.status), task.name);
    }

    match result {
        Ok(()) => {
            println!(
                "\n{} {} completed {} ({} run, {} cached)",
                CHECK,
                style(&pipeline.name).bold(),
                style("successfully").green(),
                pipeline.state.executed_tasks,
                pipeline.state.cached_tasks
            );
            Ok(())
        }
        Err(e) => {
            println!(
                "\n{} {} {}",
                CROSS,
                style(&cmd.pipeline).bold(),
                style("failed").red()
            );
            error!("{}", e);
            std::process::exit(1);
        }
    }
}

fn validate_pipelines(cmd: &ValidateCommand, dir: &str) -> Result<()> {
    println!("{} Validating pipelines...", INFO);

    let result = match &cmd.file {
        Some(file) => PipelineConfig::from_file(file).map(|config| vec![config]),
        None => PipelineConfig::load_dir(dir).and_then(|configs| {
            // Cross-pipeline wiring is only checked by building the catalog
            Catalog::from_configs(configs.clone(), &FunctionRegistry::with_builtins())?;
            Ok(configs)
        }),
    };

    match result {
        Ok(configs) => {
            println!("{} Pipeline configuration is valid!", CHECK);
            for config in &configs {
                println!(
                    "  {}: {} tasks, {} outputs, {} variables",
                    style(&config.name).bold(),
                    style(config.tasks.len()).cyan(),
                    style(config.outputs.len()).cyan(),
                    style(config.variables.len()).cyan()
                );
            }

            if cmd.json {
                let json = serde_json::to_string_pretty(&configs)?;
                println!("\n{}", json);
            }
            Ok(())
        }
        Err(e) => {
            println!("{} Validation failed:", CROSS);
            println!("  {}", style(format!("{:#}", e)).red());
            std::process::exit(1);
        }
    }
}

async fn list_pipelines(cmd: &ListCommand, dir: &str) -> Result<()> {
    let catalog = load_catalog(dir, &[]).context("Failed to load pipelines")?;

    if catalog.is_empty() {
        println!("{} No pipelines defined in {}", INFO, dir);
        return Ok(());
    }

    let store = LocalArtifactStore::new();
    let mut listing = Vec::new();

    for pipeline in catalog.pipelines() {
        let mut tasks = Vec::new();
        for task in pipeline.tasks() {
            let locator = pipeline.output_locator(task);
            let exists = store.exists(&locator).await.ok();
            tasks.push((task.name.clone(), locator, exists));
        }
        listing.push((pipeline, tasks));
    }

    if cmd.json {
        let data: Vec<_> = listing
            .iter()
            .map(|(pipeline, tasks)| {
                serde_json::json!({
                    "name": pipeline.name,
                    "upstream": catalog.upstream(&pipeline.name).unwrap_or_default(),
                    "outputs": pipeline.outputs(),
                    "tasks": tasks.iter().map(|(name, locator, exists)| serde_json::json!({
                        "name": name,
                        "locator": locator,
                        "cached": exists,
                    })).collect::<Vec<_>>(),
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&serde_json::json!({ "pipelines": data }))?);
        return Ok(());
    }

    println!("{} Pipelines in {}:", INFO, dir);
    for (pipeline, tasks) in &listing {
        let cached = tasks.iter().filter(|(_, _, exists)| *exists == Some(true)).count();
        println!(
            "  {} ({} tasks, {} cached)",
            style(&pipeline.name).bold(),
            style(tasks.len()).cyan(),
            style(cached).green()
        );

        let upstream = catalog.upstream(&pipeline.name)?;
        if !upstream.is_empty() {
            println!("    consumes: {}", style(upstream.join(", ")).dim());
        }
        for (output, task) in pipeline.outputs() {
            println!("    output {} → {}", style(output).cyan(), task);
        }

        if cmd.tasks {
            for (name, locator, exists) in tasks {
                println!(
                    "    - {} {} [{}]",
                    style(name).bold(),
                    style(locator).dim(),
                    format_cache_state(*exists)
                );
            }
        }
    }

    Ok(())
}

async fn show_history(cmd: &HistoryCommand) -> Result<()> {
    let store = history_backend(false).await?;

    // If specific execution ID is requested
    if let Some(exec_id_str) = &cmd.execution_id {
        let exec_id = uuid::Uuid::parse_str(exec_id_str).context("Invalid execution ID format")?;
        match store.load_run(exec_id).await? {
            Some(summary) => print_run_details(&summary, cmd.details)?,
            None => println!("{} Run not found", WARN),
        }
        return Ok(());
    }

    // List runs for one pipeline or all
    let mut runs = match &cmd.pipeline {
        Some(pipeline_name) => store.list_runs(pipeline_name).await?,
        None => {
            let mut all_runs = Vec::new();
            for pipeline in store.list_pipelines().await? {
                all_runs.extend(store.list_runs(&pipeline).await?);
            }
            all_runs.sort_by(|a, b| b.started_at.cmp(&a.started_at));
            all_runs
        }
    };
    runs.truncate(cmd.limit);

    if runs.is_empty() {
        println!("{} No runs found", INFO);
        return Ok(());
    }

    if cmd.json {
        let data = serde_json::json!({ "runs": runs });
        println!("{}", serde_json::to_string_pretty(&data)?);
    } else {
        println!("{} Run history (showing latest {}):", INFO, cmd.limit);
        for summary in &runs {
            println!("  {}", format_run_summary(summary));
        }
    }

    Ok(())
}

fn print_run_details(summary: &RunSummary, details: bool) -> Result<()> {
    println!("{} Run Details", INFO);
    println!("  ID: {}", style(summary.execution_id).cyan());
    println!("  Pipeline: {}", style(&summary.pipeline_name).bold());
    println!("  Status: {}", format_status(summary.status));
    println!("  Started: {}", style(summary.started_at.to_rfc3339()).dim());
    if let Some(completed) = summary.completed_at {
        println!("  Completed: {}", style(completed.to_rfc3339()).dim());
        if let Ok(duration) = completed.signed_duration_since(summary.started_at).to_std() {
            println!("  Duration: {}", style(format_duration(duration)).dim());
        }
    }
    println!(
        "  Tasks: {} run, {} cached, {} failed of {}",
        style(summary.executed_tasks).green(),
        style(summary.cached_tasks).cyan(),
        style(summary.failed_tasks).red(),
        summary.total_tasks
    );
    if summary.status == ExecutionStatus::Failed {
        println!("  {} Re-running resumes from the cached artifacts", WARN);
    }

    if details {
        println!("\n  {}", style("Full details:").bold());
        let json = serde_json::to_string_pretty(summary)?;
        for line in json.lines() {
            println!("    {}", line);
        }
    }

    Ok(())
}
