//! Command-line interface

pub mod commands;
pub mod output;

use clap::{Parser, Subcommand};
use commands::{HistoryCommand, ListCommand, RunCommand, ValidateCommand};
use std::ffi::OsString;

/// Task-graph runner with resumable, location-keyed artifact caching
#[derive(Debug, Parser, Clone)]
#[command(name = "data-pipeline")]
#[command(version = "0.1.0")]
#[command(about = "Run data pipelines, reusing artifacts that already exist", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Directory of pipeline YAML definitions
    #[arg(long, global = true, default_value = "pipelines")]
    pub pipelines: String,
}

/// Available commands
#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run a pipeline
    Run(RunCommand),

    /// Validate pipeline definitions
    Validate(ValidateCommand),

    /// List defined pipelines
    List(ListCommand),

    /// Show run history
    History(HistoryCommand),
}

impl Cli {
    /// Parse CLI arguments from environment
    pub fn from_args() -> Self {
        Self::parse()
    }

    /// Parse CLI arguments from a slice
    pub fn try_parse_from<I, T>(itr: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        <Self as Parser>::try_parse_from(itr)
    }
}
