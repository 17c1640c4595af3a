//! In-memory snapshot for dispatcher tests.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::core::{
    CatalogReader, ColumnDef, PrimaryKeyDef, RowRecord, SequenceDef, Snapshot, SnapshotSource,
    SqlValue, TableFilter, TableRef,
};
use crate::error::{DumpError, Result};

/// Injected failure for one table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Failure {
    /// Metadata query fails; scoped to the table.
    Catalog,
    /// Sequence metadata has a NULL field; scoped to the table.
    Render,
    /// Connection drops while reading rows; fatal.
    Connection,
}

#[derive(Debug, Clone)]
pub struct MockTable {
    pub table: TableRef,
    pub columns: Vec<ColumnDef>,
    pub primary_key: Option<PrimaryKeyDef>,
    pub sequences: Vec<SequenceDef>,
    pub rows: Vec<RowRecord>,
    pub delay: Duration,
    pub failure: Option<Failure>,
}

impl MockTable {
    /// Two-column table with one row per id.
    pub fn new(name: &str, ids: &[i64]) -> Self {
        Self {
            table: TableRef::public(name),
            columns: vec![
                ColumnDef::new("id", "integer"),
                ColumnDef::new("name", "text"),
            ],
            primary_key: Some(PrimaryKeyDef {
                constraint_name: format!("{}_pkey", name),
                definition: "PRIMARY KEY (id)".into(),
            }),
            sequences: Vec::new(),
            rows: ids
                .iter()
                .map(|id| vec![SqlValue::from(id.to_string()), SqlValue::from(format!("{}-{}", name, id))])
                .collect(),
            delay: Duration::ZERO,
            failure: None,
        }
    }

    pub fn in_schema(mut self, schema: &str) -> Self {
        self.table = TableRef::new(schema, self.table.name.clone());
        self
    }

    pub fn delayed(mut self, millis: u64) -> Self {
        self.delay = Duration::from_millis(millis);
        self
    }

    pub fn failing(mut self, failure: Failure) -> Self {
        self.failure = Some(failure);
        self
    }
}

/// Counters shared by a mock source and every snapshot/session it creates.
#[derive(Debug, Default)]
pub struct Stats {
    pub begun: AtomicUsize,
    pub ended: AtomicUsize,
    pub attached: AtomicUsize,
    pub released: AtomicUsize,
    pub active: AtomicUsize,
    pub peak: AtomicUsize,
    /// Tables whose row read started, in start order.
    pub started: Mutex<Vec<String>>,
}

impl Stats {
    pub fn get(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }

    pub fn started(&self) -> Vec<String> {
        self.started.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

pub struct MockSource {
    tables: Arc<Vec<MockTable>>,
    pub stats: Arc<Stats>,
    fail_begin: bool,
}

impl MockSource {
    pub fn new(tables: Vec<MockTable>) -> Self {
        Self {
            tables: Arc::new(tables),
            stats: Arc::new(Stats::default()),
            fail_begin: false,
        }
    }

    pub fn unreachable() -> Self {
        Self {
            fail_begin: true,
            ..Self::new(Vec::new())
        }
    }
}

#[async_trait]
impl SnapshotSource for MockSource {
    async fn begin(&self) -> Result<Arc<dyn Snapshot>> {
        if self.fail_begin {
            return Err(DumpError::Connection("connection refused".into()));
        }
        self.stats.begun.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(MockSnapshot {
            leader: MockSession {
                tables: self.tables.clone(),
                stats: self.stats.clone(),
                counted: false,
            },
        }))
    }
}

struct MockSnapshot {
    leader: MockSession,
}

#[async_trait]
impl Snapshot for MockSnapshot {
    fn id(&self) -> &str {
        "00000003-00000002-1"
    }

    fn server_version(&self) -> &str {
        "16.2"
    }

    fn catalog(&self) -> &dyn CatalogReader {
        &self.leader
    }

    async fn attach(&self) -> Result<Box<dyn CatalogReader>> {
        let stats = &self.leader.stats;
        stats.attached.fetch_add(1, Ordering::SeqCst);
        let active = stats.active.fetch_add(1, Ordering::SeqCst) + 1;
        stats.peak.fetch_max(active, Ordering::SeqCst);
        Ok(Box::new(MockSession {
            tables: self.leader.tables.clone(),
            stats: stats.clone(),
            counted: true,
        }))
    }

    async fn end(&self) -> Result<()> {
        self.leader.stats.ended.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct MockSession {
    tables: Arc<Vec<MockTable>>,
    stats: Arc<Stats>,
    counted: bool,
}

impl MockSession {
    fn find(&self, table: &TableRef) -> Result<&MockTable> {
        self.tables
            .iter()
            .find(|t| &t.table == table)
            .ok_or_else(|| DumpError::catalog(table.full_name(), "relation does not exist"))
    }
}

#[async_trait]
impl CatalogReader for MockSession {
    async fn list_tables(&self, filter: &TableFilter) -> Result<Vec<TableRef>> {
        Ok(self
            .tables
            .iter()
            .map(|t| t.table.clone())
            .filter(|t| filter.matches(t))
            .collect())
    }

    async fn columns_of(&self, table: &TableRef) -> Result<Vec<ColumnDef>> {
        let t = self.find(table)?;
        if t.failure == Some(Failure::Catalog) {
            return Err(DumpError::catalog(table.full_name(), "permission denied"));
        }
        Ok(t.columns.clone())
    }

    async fn sequences_of(&self, table: &TableRef) -> Result<Vec<SequenceDef>> {
        let t = self.find(table)?;
        if t.failure == Some(Failure::Render) {
            return Err(DumpError::render(table.full_name(), "sequence increment_by is NULL"));
        }
        Ok(t.sequences.clone())
    }

    async fn primary_key_of(&self, table: &TableRef) -> Result<Option<PrimaryKeyDef>> {
        Ok(self.find(table)?.primary_key.clone())
    }

    async fn rows_of(&self, table: &TableRef, _columns: &[ColumnDef]) -> Result<Vec<RowRecord>> {
        let t = self.find(table)?;
        if let Ok(mut started) = self.stats.started.lock() {
            started.push(table.name.clone());
        }
        if !t.delay.is_zero() {
            tokio::time::sleep(t.delay).await;
        }
        if t.failure == Some(Failure::Connection) {
            return Err(DumpError::Connection("server closed the connection".into()));
        }
        Ok(t.rows.clone())
    }

    async fn release(&self) -> Result<()> {
        if self.counted {
            self.stats.released.fetch_add(1, Ordering::SeqCst);
            self.stats.active.fetch_sub(1, Ordering::SeqCst);
        }
        Ok(())
    }
}

/// Split a SQL dump into per-table bodies keyed by table name.
pub fn bodies_by_table(dump: &str) -> BTreeMap<String, String> {
    let mut bodies = BTreeMap::new();
    for chunk in dump.split("--\n-- Name: ").skip(1) {
        if let Some((name, _)) = chunk.split_once(';') {
            bodies.insert(name.to_string(), chunk.to_string());
        }
    }
    bodies
}

/// Table names in the order their bodies appear in a SQL dump.
pub fn body_order(dump: &str) -> Vec<String> {
    dump.split("--\n-- Name: ")
        .skip(1)
        .filter_map(|chunk| chunk.split_once(';').map(|(name, _)| name.to_string()))
        .collect()
}
