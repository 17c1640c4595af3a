//! Core abstractions for the dump engine.
//!
//! - [`schema`]: table, column, sequence and primary key metadata
//! - [`value`]: NULL-or-text row values
//! - [`traits`]: the snapshot and catalog seams the dispatcher runs against
//! - [`identifier`]: identifier quoting for generated SQL

pub mod identifier;
pub mod schema;
pub mod traits;
pub mod value;

pub use schema::{
    ColumnDef, PrimaryKeyDef, SequenceDef, SequenceOwner, TableFilter, TableRef, DEFAULT_SCHEMA,
};
pub use traits::{CatalogReader, Snapshot, SnapshotSource};
pub use value::{RowRecord, SqlValue};
