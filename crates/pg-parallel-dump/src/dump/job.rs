//! Table dump job: the unit of concurrent work.
//!
//! A job attaches its own session to the run's snapshot, reads the table's
//! metadata and rows, renders them for the run's output mode and hands the
//! result back to the dispatcher. Exactly one worker owns a job from start to
//! finish; the dispatcher only sees the finished [`DumpJob`].

use std::sync::Arc;

use tracing::{debug, warn};

use crate::config::DataFormat;
use crate::core::{CatalogReader, Snapshot, TableRef};
use crate::error::Result;
use crate::render::{encode_csv, render_csv_rows, render_table_body, TableSnapshot};

/// What a run produces for each table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// SQL statements (DDL plus a data block) into one stream.
    Sql(DataFormat),

    /// One CSV file per table.
    Csv,
}

impl OutputMode {
    /// Whether the output carries the shared header and footer.
    pub fn has_preamble(&self) -> bool {
        matches!(self, OutputMode::Sql(_))
    }
}

/// A rendered table, ready for the sink.
#[derive(Debug, Clone)]
pub struct RenderedTable {
    pub body: Vec<u8>,
    pub rows: usize,
}

/// Result of one table job.
#[derive(Debug)]
pub struct DumpJob {
    pub table: TableRef,
    pub body: Result<RenderedTable>,
}

/// Dump one table through a fresh session on `snapshot`.
///
/// The session is released whether or not the table succeeded.
pub async fn dump_table(
    snapshot: Arc<dyn Snapshot>,
    table: TableRef,
    mode: OutputMode,
) -> DumpJob {
    let session = match snapshot.attach().await {
        Ok(session) => session,
        Err(e) => return DumpJob { table, body: Err(e) },
    };

    let body = read_table(session.as_ref(), &table, mode)
        .await
        .map(|data| render(&table, &data, mode));

    if let Err(e) = session.release().await {
        warn!("{}: failed to release session: {}", table, e);
    }

    DumpJob { table, body }
}

async fn read_table(
    catalog: &dyn CatalogReader,
    table: &TableRef,
    mode: OutputMode,
) -> Result<TableSnapshot> {
    let columns = catalog.columns_of(table).await?;

    // CSV output carries data only.
    let (sequences, primary_key) = match mode {
        OutputMode::Sql(_) => (
            catalog.sequences_of(table).await?,
            catalog.primary_key_of(table).await?,
        ),
        OutputMode::Csv => (Vec::new(), None),
    };

    let rows = catalog.rows_of(table, &columns).await?;
    debug!(
        "{}: read {} columns, {} sequences, {} rows",
        table,
        columns.len(),
        sequences.len(),
        rows.len()
    );

    Ok(TableSnapshot {
        columns,
        sequences,
        primary_key,
        rows,
    })
}

fn render(table: &TableRef, data: &TableSnapshot, mode: OutputMode) -> RenderedTable {
    let body = match mode {
        OutputMode::Sql(format) => render_table_body(table, data, format).into_bytes(),
        OutputMode::Csv => encode_csv(&render_csv_rows(&data.columns, &data.rows)),
    };
    RenderedTable {
        body,
        rows: data.rows.len(),
    }
}
