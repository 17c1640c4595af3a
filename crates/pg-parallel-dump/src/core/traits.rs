//! Core traits for the dump engine.
//!
//! - [`SnapshotSource`]: opens one consistent-read snapshot per run
//! - [`Snapshot`]: the open snapshot; lists tables and hands out sessions
//! - [`CatalogReader`]: metadata and row queries, always bound to a snapshot
//!
//! The dispatcher only ever talks to these traits, so every query a run
//! issues is provably routed through the snapshot it opened.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;

use super::schema::{ColumnDef, PrimaryKeyDef, SequenceDef, TableFilter, TableRef};
use super::value::RowRecord;

/// Metadata and data queries against one snapshot.
#[async_trait]
pub trait CatalogReader: Send + Sync {
    /// List tables matching the filter, in catalog enumeration order.
    async fn list_tables(&self, filter: &TableFilter) -> Result<Vec<TableRef>>;

    /// Column definitions ordered by catalog column position.
    async fn columns_of(&self, table: &TableRef) -> Result<Vec<ColumnDef>>;

    /// Sequences backing a column default on the table.
    async fn sequences_of(&self, table: &TableRef) -> Result<Vec<SequenceDef>>;

    /// Primary key constraint, if the table has one.
    async fn primary_key_of(&self, table: &TableRef) -> Result<Option<PrimaryKeyDef>>;

    /// All rows of the table, each value in its text form, columns in the
    /// order given.
    async fn rows_of(&self, table: &TableRef, columns: &[ColumnDef]) -> Result<Vec<RowRecord>>;

    /// Give the session back. Called once, after the last query.
    async fn release(&self) -> Result<()> {
        Ok(())
    }
}

/// An open read-only, repeatable-read snapshot.
///
/// Everything read through [`Snapshot::catalog`] or through a session from
/// [`Snapshot::attach`] observes the same point in time.
#[async_trait]
pub trait Snapshot: Send + Sync {
    /// Identifier sessions use to join the snapshot.
    fn id(&self) -> &str;

    /// Server version string, as reported inside the snapshot.
    fn server_version(&self) -> &str;

    /// Reader running on the snapshot's own transaction.
    fn catalog(&self) -> &dyn CatalogReader;

    /// Open a session bound to this snapshot for one table job.
    async fn attach(&self) -> Result<Box<dyn CatalogReader>>;

    /// Release the snapshot. Rolls back, since nothing was written.
    async fn end(&self) -> Result<()>;
}

/// Opens snapshots.
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    /// Begin a snapshot. Fails with a connection error if none can be opened.
    async fn begin(&self) -> Result<Arc<dyn Snapshot>>;
}
