//! SQLite-based run history store

use crate::core::ExecutionStatus;
use crate::persistence::{HistoryBackend, RunSummary};
use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, NaiveDateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use uuid::Uuid;

const COLUMNS: &str = "id, pipeline_name, status, started_at, completed_at, \
                       total_tasks, executed_tasks, cached_tasks, failed_tasks, progress";

/// SQLite run store
pub struct SqliteRunStore {
    pool: SqlitePool,
}

impl SqliteRunStore {
    /// Create a new SQLite store
    pub async fn new(db_path: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", db_path))
            .context("Invalid database path")?
            .create_if_missing(true);
        let pool = SqlitePool::connect_with(options)
            .await
            .context("Failed to connect to database")?;

        let store = Self { pool };
        store.init().await?;

        Ok(store)
    }

    /// Create store with default path
    pub async fn with_default_path() -> Result<Self> {
        let data_dir = dirs::data_local_dir().unwrap_or_else(|| std::path::PathBuf::from("."));
        let db_dir = data_dir.join("data-pipeline");
        std::fs::create_dir_all(&db_dir)
            .with_context(|| format!("Failed to create {}", db_dir.display()))?;

        let db_path = db_dir.join("runs.db");
        let db_path = db_path
            .to_str()
            .ok_or_else(|| anyhow!("Database path is not valid UTF-8: {}", db_path.display()))?;
        Self::new(db_path).await
    }

    /// Initialize database schema
    async fn init(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS runs (
                id TEXT PRIMARY KEY,
                pipeline_name TEXT NOT NULL,
                status TEXT NOT NULL,
                started_at TEXT NOT NULL,
                completed_at TEXT,
                total_tasks INTEGER NOT NULL DEFAULT 0,
                executed_tasks INTEGER NOT NULL DEFAULT 0,
                cached_tasks INTEGER NOT NULL DEFAULT 0,
                failed_tasks INTEGER NOT NULL DEFAULT 0,
                progress REAL NOT NULL DEFAULT 0.0,
                created_at TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE INDEX IF NOT EXISTS idx_runs_pipeline_name ON runs(pipeline_name);
            CREATE INDEX IF NOT EXISTS idx_runs_started_at ON runs(started_at);
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    fn status_label(status: ExecutionStatus) -> &'static str {
        match status {
            ExecutionStatus::Pending => "Pending",
            ExecutionStatus::Running => "Running",
            ExecutionStatus::Completed => "Completed",
            ExecutionStatus::Failed => "Failed",
        }
    }

    fn parse_status(label: &str) -> ExecutionStatus {
        match label {
            "Running" => ExecutionStatus::Running,
            "Completed" => ExecutionStatus::Completed,
            "Failed" => ExecutionStatus::Failed,
            _ => ExecutionStatus::Pending,
        }
    }

    fn from_naive(dt: NaiveDateTime) -> DateTime<Utc> {
        DateTime::from_naive_utc_and_offset(dt, Utc)
    }

    fn from_row(row: &SqliteRow) -> Result<RunSummary> {
        Ok(RunSummary {
            execution_id: Uuid::parse_str(&row.get::<String, _>("id"))?,
            pipeline_name: row.get("pipeline_name"),
            status: Self::parse_status(&row.get::<String, _>("status")),
            started_at: Self::from_naive(row.get("started_at")),
            completed_at: row
                .get::<Option<NaiveDateTime>, _>("completed_at")
                .map(Self::from_naive),
            total_tasks: row.get::<i64, _>("total_tasks") as usize,
            executed_tasks: row.get::<i64, _>("executed_tasks") as usize,
            cached_tasks: row.get::<i64, _>("cached_tasks") as usize,
            failed_tasks: row.get::<i64, _>("failed_tasks") as usize,
            progress: row.get("progress"),
        })
    }
}

#[async_trait::async_trait]
impl HistoryBackend for SqliteRunStore {
    async fn save_run(&self, run: &RunSummary) -> Result<()> {
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO runs
            (id, pipeline_name, status, started_at, completed_at,
             total_tasks, executed_tasks, cached_tasks, failed_tasks, progress)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
        )
        .bind(run.execution_id.to_string())
        .bind(&run.pipeline_name)
        .bind(Self::status_label(run.status))
        .bind(run.started_at.naive_utc())
        .bind(run.completed_at.map(|dt| dt.naive_utc()))
        .bind(run.total_tasks as i64)
        .bind(run.executed_tasks as i64)
        .bind(run.cached_tasks as i64)
        .bind(run.failed_tasks as i64)
        .bind(run.progress)
        .execute(&self.pool)
        .await
        .context("Failed to save run")?;

        Ok(())
    }

    async fn load_run(&self, execution_id: Uuid) -> Result<Option<RunSummary>> {
        let row = sqlx::query(&format!("SELECT {COLUMNS} FROM runs WHERE id = ?1"))
            .bind(execution_id.to_string())
            .fetch_optional(&self.pool)
            .await
            .context("Failed to load run")?;

        row.as_ref().map(Self::from_row).transpose()
    }

    async fn list_runs(&self, pipeline_name: &str) -> Result<Vec<RunSummary>> {
        let rows = sqlx::query(&format!(
            "SELECT {COLUMNS} FROM runs WHERE pipeline_name = ?1 ORDER BY started_at DESC"
        ))
        .bind(pipeline_name)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list runs")?;

        rows.iter().map(Self::from_row).collect()
    }

    async fn latest_run(&self, pipeline_name: &str) -> Result<Option<RunSummary>> {
        let row = sqlx::query(&format!(
            "SELECT {COLUMNS} FROM runs WHERE pipeline_name = ?1 ORDER BY started_at DESC LIMIT 1"
        ))
        .bind(pipeline_name)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to get latest run")?;

        row.as_ref().map(Self::from_row).transpose()
    }

    async fn list_pipelines(&self) -> Result<Vec<String>> {
        let rows = sqlx::query("SELECT DISTINCT pipeline_name FROM runs ORDER BY pipeline_name ASC")
            .fetch_all(&self.pool)
            .await
            .context("Failed to list pipelines")?;

        Ok(rows.iter().map(|row| row.get("pipeline_name")).collect())
    }
}
