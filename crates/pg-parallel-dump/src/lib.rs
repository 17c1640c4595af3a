//! # pg-parallel-dump
//!
//! Consistent, concurrent logical dumps of PostgreSQL databases.
//!
//! Every table of a run is read inside one exported snapshot, so the dump
//! reflects a single point in time even though tables are fetched by many
//! workers at once. Features:
//!
//! - **Snapshot-consistent reads** via `pg_export_snapshot` / `SET TRANSACTION SNAPSHOT`
//! - **Bounded parallelism**, one session per in-flight table
//! - **SQL output** with COPY or INSERT data blocks, or **CSV** per table
//! - **Failure policy** per run: skip failed tables or abort
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use pg_parallel_dump::{Config, DumpOptions, Dumper, PgSnapshotSource, SqlSink};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::load("config.yaml")?;
//!     let options = DumpOptions::from_config(&config.dump);
//!     let source = PgSnapshotSource::new(&config.source, options.parallelism + 1).await?;
//!
//!     let file = tokio::fs::File::create("dump.sql").await?;
//!     let mut sink = SqlSink::new(file, config.dump.data_format);
//!     let report = Dumper::new(Arc::new(source), options).run(&mut sink, None).await?;
//!     println!("Dumped {} tables", report.tables_dumped);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod core;
pub mod dump;
pub mod error;
pub mod render;
pub mod source;
pub mod version;

// Re-exports for convenient access
pub use config::{Config, DataFormat, DumpConfig, OnTableError, SourceConfig, SslMode};
pub use crate::core::{SqlValue, TableFilter, TableRef};
pub use dump::{
    CsvDirSink, DumpOptions, DumpPhase, DumpReport, DumpSink, Dumper, FailedTable, SqlSink,
};
pub use error::{DumpError, Result};
pub use source::PgSnapshotSource;
pub use version::{PackageVersion, VersionProvider};
