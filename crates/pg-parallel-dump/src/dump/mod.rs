//! Table dump dispatcher.
//!
//! A run moves through `Idle -> Listing -> Dispatching <-> Draining -> Done`,
//! ending in `Aborted` instead of `Done` on a fatal error, a table failure
//! under [`OnTableError::Abort`], or cancellation.
//!
//! The filtered table list is cut into groups of at most `parallelism`
//! tables. Each group's jobs run concurrently; the next group starts only
//! once every job of the current one has finished, so the number of open
//! sessions never exceeds `parallelism`. Bodies are appended in completion
//! order, which makes table order in the output nondeterministic unless
//! `parallelism` is 1.

mod assembler;
mod job;
mod sink;

#[cfg(test)]
pub(crate) mod testing;

pub use assembler::{
    render_footer, render_header, render_template, DumpInfo, COMPLETED_AT_FORMAT,
    FOOTER_TEMPLATE, HEADER_TEMPLATE,
};
pub use job::{dump_table, DumpJob, OutputMode, RenderedTable};
pub use sink::{CsvDirSink, DumpSink, SqlSink};

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::{DumpConfig, OnTableError};
use crate::core::{Snapshot, SnapshotSource, TableFilter, TableRef};
use crate::error::{DumpError, Result};
use crate::version::{resolve_version, PackageVersion, VersionProvider};

/// Parallelism used when none (or a non-positive value) is configured.
pub const DEFAULT_PARALLELISM: usize = 50;

/// Resolve a configured parallelism to the effective worker count.
pub fn resolve_parallelism(requested: Option<i64>) -> usize {
    match requested {
        Some(n) if n > 0 => n as usize,
        _ => DEFAULT_PARALLELISM,
    }
}

/// Run state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DumpPhase {
    Idle,
    Listing,
    Dispatching,
    Draining,
    Done,
    Aborted,
}

impl fmt::Display for DumpPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DumpPhase::Idle => "idle",
            DumpPhase::Listing => "listing",
            DumpPhase::Dispatching => "dispatching",
            DumpPhase::Draining => "draining",
            DumpPhase::Done => "done",
            DumpPhase::Aborted => "aborted",
        };
        f.write_str(s)
    }
}

/// Which tables a run covers and how it reacts to failures.
#[derive(Debug, Clone)]
pub struct DumpOptions {
    pub filter: TableFilter,

    /// Tables skipped at listing, as `name` or `schema.name`.
    pub ignore_tables: Vec<String>,

    pub parallelism: usize,
    pub on_table_error: OnTableError,
}

impl Default for DumpOptions {
    fn default() -> Self {
        Self {
            filter: TableFilter::default(),
            ignore_tables: Vec::new(),
            parallelism: DEFAULT_PARALLELISM,
            on_table_error: OnTableError::default(),
        }
    }
}

impl DumpOptions {
    pub fn from_config(config: &DumpConfig) -> Self {
        Self {
            filter: config.filter(),
            ignore_tables: config.ignore_tables.clone(),
            parallelism: config.effective_parallelism(),
            on_table_error: config.on_table_error,
        }
    }

    pub fn with_filter(mut self, filter: TableFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_ignored(mut self, tables: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.ignore_tables = tables.into_iter().map(Into::into).collect();
        self
    }

    /// Set parallelism; zero falls back to the default.
    pub fn with_parallelism(mut self, parallelism: usize) -> Self {
        self.parallelism = if parallelism == 0 {
            DEFAULT_PARALLELISM
        } else {
            parallelism
        };
        self
    }

    pub fn with_on_table_error(mut self, policy: OnTableError) -> Self {
        self.on_table_error = policy;
        self
    }

    fn is_ignored(&self, table: &TableRef) -> bool {
        self.ignore_tables
            .iter()
            .any(|name| *name == table.name || *name == table.full_name())
    }
}

/// A table that failed under [`OnTableError::Continue`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedTable {
    pub table: String,
    pub error: String,
}

/// Result of a completed run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DumpReport {
    /// Unique run identifier.
    pub run_id: String,

    /// Final phase.
    pub phase: DumpPhase,

    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub duration_seconds: f64,

    pub tool_version: String,
    pub server_version: String,
    pub parallelism: usize,

    /// Tables selected after filtering and ignoring.
    pub tables_total: usize,
    pub tables_dumped: usize,
    pub tables_failed: usize,
    pub rows_dumped: u64,

    /// Dumped tables, in output order.
    pub dumped_tables: Vec<String>,
    pub failed_tables: Vec<FailedTable>,

    /// Files written (CSV output only).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<PathBuf>,
}

impl DumpReport {
    /// Convert to JSON string.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn is_complete(&self) -> bool {
        self.failed_tables.is_empty()
    }
}

/// Tracks and logs phase transitions for one run.
struct PhaseTracker {
    run_id: String,
    phase: DumpPhase,
}

impl PhaseTracker {
    fn new(run_id: &str) -> Self {
        Self {
            run_id: run_id.to_string(),
            phase: DumpPhase::Idle,
        }
    }

    fn enter(&mut self, next: DumpPhase) {
        info!(run_id = %self.run_id, from = %self.phase, to = %next, "Dump phase");
        self.phase = next;
    }
}

/// Mutable per-run tallies.
#[derive(Default)]
struct Progress {
    dumped: Vec<String>,
    rows: u64,
    failures: Vec<(TableRef, DumpError)>,
}

/// Runs dumps against a snapshot source.
pub struct Dumper {
    source: Arc<dyn SnapshotSource>,
    options: DumpOptions,
    version: Arc<dyn VersionProvider>,
}

impl Dumper {
    pub fn new(source: Arc<dyn SnapshotSource>, options: DumpOptions) -> Self {
        Self {
            source,
            options,
            version: Arc::new(PackageVersion),
        }
    }

    /// Replace the provider of the version printed in the header.
    pub fn with_version_provider(mut self, provider: Arc<dyn VersionProvider>) -> Self {
        self.version = provider;
        self
    }

    pub fn options(&self) -> &DumpOptions {
        &self.options
    }

    /// List the tables a run would dump, inside a snapshot of their own.
    pub async fn list_tables(&self) -> Result<Vec<TableRef>> {
        let snapshot = self.source.begin().await?;
        let tables = self.select_tables(snapshot.as_ref()).await;
        if let Err(e) = snapshot.end().await {
            warn!("Failed to release snapshot: {}", e);
        }
        tables
    }

    /// Dump every selected table into `sink`.
    ///
    /// Nothing is written if the snapshot cannot be opened or the table list
    /// cannot be read. On any error the snapshot is still released.
    pub async fn run(
        &self,
        sink: &mut dyn DumpSink,
        cancel: Option<CancellationToken>,
    ) -> Result<DumpReport> {
        let run_id = uuid::Uuid::new_v4().to_string();
        let started_at = Utc::now();
        let start_time = Instant::now();
        let cancel = cancel.unwrap_or_default();
        let mut phase = PhaseTracker::new(&run_id);

        info!("Starting dump run: {}", run_id);

        let snapshot = match self.source.begin().await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                phase.enter(DumpPhase::Aborted);
                return Err(e);
            }
        };

        let result = self
            .run_in_snapshot(snapshot.clone(), sink, &cancel, &mut phase)
            .await;

        if let Err(e) = snapshot.end().await {
            warn!("Failed to release snapshot {}: {}", snapshot.id(), e);
        }

        let (info, tables_total, progress) = match result {
            Ok(done) => done,
            Err(e) => {
                phase.enter(DumpPhase::Aborted);
                return Err(e);
            }
        };

        phase.enter(DumpPhase::Done);

        let duration = start_time.elapsed();
        let report = DumpReport {
            run_id,
            phase: phase.phase,
            started_at,
            completed_at: Utc::now(),
            duration_seconds: duration.as_secs_f64(),
            tool_version: info.tool_version,
            server_version: info.server_version,
            parallelism: info.parallelism,
            tables_total,
            tables_dumped: progress.dumped.len(),
            tables_failed: progress.failures.len(),
            rows_dumped: progress.rows,
            dumped_tables: progress.dumped,
            failed_tables: progress
                .failures
                .iter()
                .map(|(table, e)| FailedTable {
                    table: table.full_name(),
                    error: e.to_string(),
                })
                .collect(),
            files: sink.written_paths(),
        };

        info!(
            "Dump complete: {}/{} tables, {} rows in {:.1}s",
            report.tables_dumped, report.tables_total, report.rows_dumped, report.duration_seconds
        );
        if !report.failed_tables.is_empty() {
            warn!(
                "{} table(s) were left out: {}",
                report.tables_failed,
                report
                    .failed_tables
                    .iter()
                    .map(|f| f.table.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            );
        }

        Ok(report)
    }

    /// Everything between opening and releasing the snapshot.
    async fn run_in_snapshot(
        &self,
        snapshot: Arc<dyn Snapshot>,
        sink: &mut dyn DumpSink,
        cancel: &CancellationToken,
        phase: &mut PhaseTracker,
    ) -> Result<(DumpInfo, usize, Progress)> {
        phase.enter(DumpPhase::Listing);
        let tables = self.select_tables(snapshot.as_ref()).await?;
        let parallelism = self.options.parallelism.max(1);
        let mode = sink.mode();

        let tool_version = resolve_version(self.version.as_ref()).await;
        let mut info = DumpInfo::new(tool_version, snapshot.server_version(), parallelism);

        if mode.has_preamble() {
            sink.write_header(&render_header(&info)?).await?;
        }

        info!(
            "Dumping {} tables with parallelism {}",
            tables.len(),
            parallelism
        );

        let mut progress = Progress::default();
        for group in tables.chunks(parallelism) {
            if cancel.is_cancelled() {
                info!("Cancellation requested, stopping before next group");
                return Err(DumpError::Cancelled);
            }

            phase.enter(DumpPhase::Dispatching);
            let mut jobs = JoinSet::new();
            let mut names = HashMap::with_capacity(group.len());
            for table in group {
                let handle = jobs.spawn(dump_table(snapshot.clone(), table.clone(), mode));
                names.insert(handle.id(), table.clone());
            }

            phase.enter(DumpPhase::Draining);
            while let Some(joined) = jobs.join_next().await {
                let job = match joined {
                    Ok(job) => job,
                    Err(e) => {
                        let table = names
                            .get(&e.id())
                            .cloned()
                            .unwrap_or_else(|| TableRef::public("<unknown>"));
                        error!("{}: task panicked - {}", table, e);
                        let failure =
                            DumpError::render(table.full_name(), format!("task panicked: {}", e));
                        DumpJob {
                            table,
                            body: Err(failure),
                        }
                    }
                };
                self.collect(job, sink, &mut progress).await?;
            }

            if !progress.failures.is_empty() && self.options.on_table_error == OnTableError::Abort {
                info!("Table failure under abort policy, starting no further groups");
                break;
            }
        }

        if self.options.on_table_error == OnTableError::Abort && !progress.failures.is_empty() {
            let count = progress.failures.len();
            let tables = progress
                .failures
                .iter()
                .map(|(t, _)| t.full_name())
                .collect::<Vec<_>>()
                .join(", ");
            let (_, first) = progress.failures.remove(0);
            return Err(DumpError::Aborted {
                count,
                tables,
                source: Box::new(first),
            });
        }

        info.complete(Local::now().fixed_offset());
        if mode.has_preamble() {
            sink.write_footer(&render_footer(&info)?).await?;
        }
        sink.finish().await?;

        Ok((info, tables.len(), progress))
    }

    /// Append a finished job, or record its failure.
    async fn collect(
        &self,
        job: DumpJob,
        sink: &mut dyn DumpSink,
        progress: &mut Progress,
    ) -> Result<()> {
        match job.body {
            Ok(rendered) => {
                sink.write_table(&job.table, &rendered.body).await?;
                info!("{}: dumped ({} rows)", job.table, rendered.rows);
                progress.rows += rendered.rows as u64;
                progress.dumped.push(job.table.full_name());
                Ok(())
            }
            Err(e) if e.is_fatal() => {
                error!("{}: failed - {}", job.table, e);
                Err(e)
            }
            Err(e) => {
                match self.options.on_table_error {
                    OnTableError::Continue => warn!("{}: skipped - {}", job.table, e),
                    OnTableError::Abort => error!("{}: failed - {}", job.table, e),
                }
                progress.failures.push((job.table, e));
                Ok(())
            }
        }
    }

    /// List through the snapshot's own transaction and drop ignored tables.
    async fn select_tables(&self, snapshot: &dyn Snapshot) -> Result<Vec<TableRef>> {
        let listed = snapshot.catalog().list_tables(&self.options.filter).await?;
        let total = listed.len();
        let tables: Vec<TableRef> = listed
            .into_iter()
            .filter(|t| !self.options.is_ignored(t))
            .collect();

        info!(
            "Found {} tables in schema '{}' ({} ignored)",
            tables.len(),
            self.options.filter.schema,
            total - tables.len()
        );
        Ok(tables)
    }
}
