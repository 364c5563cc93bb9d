//! CLI command definitions

use crate::execution::SchedulingStrategy;
use clap::Args;

/// Run a pipeline, after any upstream pipeline it consumes
#[derive(Debug, Args, Clone)]
pub struct RunCommand {
    /// Name of the pipeline to run
    pub pipeline: String,

    /// Recompute these tasks even if their artifacts exist
    #[arg(long, num_args = 1..)]
    pub force: Vec<String>,

    /// Recompute every task of the pipeline
    #[arg(long)]
    pub force_all: bool,

    /// Run only these tasks; other artifacts are loaded from storage
    #[arg(long, num_args = 1..)]
    pub only: Vec<String>,

    /// Recompute cached tasks whose inputs changed after their artifact
    #[arg(long)]
    pub fresh: bool,

    /// Variable overrides (key=value), applied to every pipeline definition
    #[arg(long = "var", value_parser = parse_key_value)]
    pub variables: Vec<(String, String)>,

    /// Scheduling strategy
    #[arg(long, value_enum, default_value_t = SchedulingStrategyArg::Sequential)]
    pub strategy: SchedulingStrategyArg,

    /// Maximum concurrent tasks for the parallel-limited strategy
    #[arg(long, default_value_t = 4)]
    pub jobs: usize,

    /// Don't save runs to history
    #[arg(long)]
    pub no_history: bool,
}

impl RunCommand {
    pub fn scheduling_strategy(&self) -> SchedulingStrategy {
        match self.strategy {
            SchedulingStrategyArg::Sequential => SchedulingStrategy::Sequential,
            SchedulingStrategyArg::Parallel => SchedulingStrategy::Parallel,
            SchedulingStrategyArg::ParallelLimited => SchedulingStrategy::LimitedParallel(self.jobs),
        }
    }
}

/// Validate pipeline definitions
#[derive(Debug, Args, Clone)]
pub struct ValidateCommand {
    /// Validate a single YAML file instead of the whole pipeline directory
    #[arg(short, long)]
    pub file: Option<String>,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

/// List pipelines, their tasks and public outputs
#[derive(Debug, Args, Clone)]
pub struct ListCommand {
    /// Show tasks with their artifact locations and cache state
    #[arg(long)]
    pub tasks: bool,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

/// Show run history
#[derive(Debug, Args, Clone)]
pub struct HistoryCommand {
    /// Pipeline name to filter by
    #[arg(short, long)]
    pub pipeline: Option<String>,

    /// Number of recent runs to show
    #[arg(short, long, default_value_t = 10)]
    pub limit: usize,

    /// Show full details
    #[arg(long)]
    pub details: bool,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,

    /// Show a specific run
    #[arg(long)]
    pub execution_id: Option<String>,
}

/// Scheduling strategy argument
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum SchedulingStrategyArg {
    Sequential,
    Parallel,
    #[clap(name = "parallel-limited")]
    ParallelLimited,
}

/// Parse key=value pairs
pub fn parse_key_value(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("Invalid key=value pair: {}", s)),
    }
}
