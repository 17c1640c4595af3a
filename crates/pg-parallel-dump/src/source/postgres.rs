//! PostgreSQL snapshot coordinator and catalog reader.
//!
//! One *leader* transaction exports its snapshot with `pg_export_snapshot()`.
//! Each table job then checks out a pooled connection and imports that
//! snapshot with `SET TRANSACTION SNAPSHOT`, so every session reads the
//! database exactly as the leader sees it. The leader must stay open for the
//! whole run: an exported snapshot can only be imported while the exporting
//! transaction is alive.

use std::sync::Arc;

use async_trait::async_trait;
use deadpool_postgres::{Manager, ManagerConfig, Object, Pool, RecyclingMethod};
use tracing::{debug, info, warn};

use crate::config::SourceConfig;
use crate::core::identifier::quote_literal;
use crate::core::{
    CatalogReader, ColumnDef, PrimaryKeyDef, RowRecord, SequenceDef, SequenceOwner, Snapshot,
    SnapshotSource, SqlValue, TableFilter, TableRef,
};
use crate::error::{DumpError, Result};

use super::tls::make_tls_connect;

const BEGIN_SNAPSHOT: &str = "BEGIN ISOLATION LEVEL REPEATABLE READ READ ONLY";

const LIST_TABLES: &str = r#"
    SELECT schemaname::text, tablename::text
    FROM pg_catalog.pg_tables
    WHERE schemaname = $1
    ORDER BY tablename
"#;

const COLUMNS_OF: &str = r#"
    SELECT
        column_name::text,
        (CASE WHEN data_type IN ('ARRAY', 'USER-DEFINED')
              THEN quote_ident(udt_schema) || '.' || quote_ident(udt_name)
              ELSE data_type
         END)::text,
        character_maximum_length::int4
    FROM information_schema.columns
    WHERE table_schema = $1 AND table_name = $2
    ORDER BY ordinal_position
"#;

// deptype 'a' links a serial sequence to its column, 'i' an identity sequence.
const SEQUENCES_OF: &str = r#"
    SELECT
        sn.nspname::text,
        seq.relname::text,
        s.start_value,
        s.increment_by,
        s.min_value,
        s.max_value,
        s.cache_size,
        s.cycle,
        a.attname::text
    FROM pg_catalog.pg_class seq
    JOIN pg_catalog.pg_namespace sn ON sn.oid = seq.relnamespace
    JOIN pg_catalog.pg_depend d
      ON d.objid = seq.oid
     AND d.classid = 'pg_catalog.pg_class'::regclass
     AND d.refclassid = 'pg_catalog.pg_class'::regclass
     AND d.deptype IN ('a', 'i')
    JOIN pg_catalog.pg_class tbl ON tbl.oid = d.refobjid
    JOIN pg_catalog.pg_namespace tn ON tn.oid = tbl.relnamespace
    JOIN pg_catalog.pg_attribute a ON a.attrelid = tbl.oid AND a.attnum = d.refobjsubid
    LEFT JOIN pg_catalog.pg_sequences s
      ON s.schemaname = sn.nspname AND s.sequencename = seq.relname
    WHERE seq.relkind = 'S'
      AND tn.nspname = $1
      AND tbl.relname = $2
    ORDER BY seq.relname
"#;

const PRIMARY_KEY_OF: &str = r#"
    SELECT con.conname::text, pg_catalog.pg_get_constraintdef(con.oid)
    FROM pg_catalog.pg_constraint con
    JOIN pg_catalog.pg_class rel ON rel.oid = con.conrelid
    JOIN pg_catalog.pg_namespace nsp ON nsp.oid = rel.relnamespace
    WHERE con.contype = 'p'
      AND nsp.nspname = $1
      AND rel.relname = $2
"#;

/// Opens snapshots against a PostgreSQL server.
pub struct PgSnapshotSource {
    pool: Pool,
}

impl PgSnapshotSource {
    /// Create the pool and check that the server is reachable.
    ///
    /// `max_conns` must cover the leader plus one session per concurrent job.
    pub async fn new(config: &SourceConfig, max_conns: usize) -> Result<Self> {
        let pg_config = config.pg_config()?;

        // A failed job can hand its connection back mid-transaction.
        let mgr_config = ManagerConfig {
            recycling_method: RecyclingMethod::Custom("ROLLBACK".to_string()),
        };

        let pool = match make_tls_connect(config.ssl_mode)? {
            None => {
                warn!("PostgreSQL TLS is disabled. Credentials will be transmitted in plaintext.");
                let mgr = Manager::from_config(pg_config, tokio_postgres::NoTls, mgr_config);
                Pool::builder(mgr)
                    .max_size(max_conns)
                    .build()
                    .map_err(|e| DumpError::pool(e, "creating PostgreSQL source pool"))?
            }
            Some(tls) => {
                let mgr = Manager::from_config(pg_config, tls, mgr_config);
                Pool::builder(mgr)
                    .max_size(max_conns)
                    .build()
                    .map_err(|e| DumpError::pool(e, "creating PostgreSQL source pool"))?
            }
        };

        let client = pool.get().await.map_err(|e| {
            DumpError::Connection(format!("cannot connect to {}: {}", config.describe(), e))
        })?;
        client
            .simple_query("SELECT 1")
            .await
            .map_err(|e| DumpError::Connection(format!("connection check failed: {}", e)))?;

        info!(
            "Connected to PostgreSQL source: {} (pool size {})",
            config.describe(),
            max_conns
        );

        Ok(Self { pool })
    }
}

#[async_trait]
impl SnapshotSource for PgSnapshotSource {
    async fn begin(&self) -> Result<Arc<dyn Snapshot>> {
        let client = self
            .pool
            .get()
            .await
            .map_err(|e| DumpError::Connection(format!("checking out snapshot leader: {}", e)))?;

        // Read before BEGIN so a failure here cannot poison the transaction.
        let server_version = match client.query_one("SHOW server_version", &[]).await {
            Ok(row) => row.try_get::<_, String>(0).unwrap_or_else(|e| {
                warn!("Could not decode server version: {}", e);
                "unknown".to_string()
            }),
            Err(e) => {
                warn!("Could not read server version: {}", e);
                "unknown".to_string()
            }
        };

        client
            .batch_execute(BEGIN_SNAPSHOT)
            .await
            .map_err(|e| DumpError::Connection(format!("beginning snapshot: {}", e)))?;

        let id: String = client
            .query_one("SELECT pg_catalog.pg_export_snapshot()", &[])
            .await
            .and_then(|row| row.try_get(0))
            .map_err(|e| DumpError::Connection(format!("exporting snapshot: {}", e)))?;

        info!(snapshot = %id, server_version = %server_version, "Snapshot opened");

        Ok(Arc::new(PgSnapshot {
            id,
            server_version,
            leader: PgSession::new(client, "leader"),
            pool: self.pool.clone(),
        }))
    }
}

/// An exported snapshot held open by its leader transaction.
pub struct PgSnapshot {
    id: String,
    server_version: String,
    leader: PgSession,
    pool: Pool,
}

#[async_trait]
impl Snapshot for PgSnapshot {
    fn id(&self) -> &str {
        &self.id
    }

    fn server_version(&self) -> &str {
        &self.server_version
    }

    fn catalog(&self) -> &dyn CatalogReader {
        &self.leader
    }

    async fn attach(&self) -> Result<Box<dyn CatalogReader>> {
        let client = self
            .pool
            .get()
            .await
            .map_err(|e| DumpError::Connection(format!("attaching session: {}", e)))?;

        client
            .batch_execute(&import_snapshot_sql(&self.id))
            .await
            .map_err(|e| {
                DumpError::Connection(format!("importing snapshot {}: {}", self.id, e))
            })?;

        Ok(Box::new(PgSession::new(client, "session")))
    }

    async fn end(&self) -> Result<()> {
        self.leader.rollback().await?;
        debug!(snapshot = %self.id, "Snapshot released");
        Ok(())
    }
}

/// A pooled connection inside a snapshot transaction.
pub struct PgSession {
    client: Object,
    role: &'static str,
}

impl PgSession {
    fn new(client: Object, role: &'static str) -> Self {
        Self { client, role }
    }

    async fn rollback(&self) -> Result<()> {
        self.client
            .batch_execute("ROLLBACK")
            .await
            .map_err(|e| DumpError::Connection(format!("rolling back {}: {}", self.role, e)))
    }
}

#[async_trait]
impl CatalogReader for PgSession {
    async fn list_tables(&self, filter: &TableFilter) -> Result<Vec<TableRef>> {
        let rows = self
            .client
            .query(LIST_TABLES, &[&filter.schema])
            .await
            .map_err(|e| DumpError::from_query(&filter.schema, e))?;

        let mut tables = Vec::with_capacity(rows.len());
        for row in rows {
            let table = TableRef::new(
                row.try_get::<_, String>(0)
                    .map_err(|e| DumpError::catalog(&filter.schema, e))?,
                row.try_get::<_, String>(1)
                    .map_err(|e| DumpError::catalog(&filter.schema, e))?,
            );
            if filter.matches(&table) {
                tables.push(table);
            }
        }

        debug!("Listed {} tables in schema '{}'", tables.len(), filter.schema);
        Ok(tables)
    }

    async fn columns_of(&self, table: &TableRef) -> Result<Vec<ColumnDef>> {
        let scope = table.full_name();
        let rows = self
            .client
            .query(COLUMNS_OF, &[&table.schema, &table.name])
            .await
            .map_err(|e| DumpError::from_query(&scope, e))?;

        let mut columns = Vec::with_capacity(rows.len());
        for row in rows {
            let mut column = ColumnDef::new(
                row.try_get::<_, String>(0)
                    .map_err(|e| DumpError::catalog(&scope, e))?,
                row.try_get::<_, String>(1)
                    .map_err(|e| DumpError::catalog(&scope, e))?,
            );
            column.max_length = row
                .try_get::<_, Option<i32>>(2)
                .map_err(|e| DumpError::catalog(&scope, e))?;
            columns.push(column);
        }

        debug!("Loaded {} columns for {}", columns.len(), scope);
        Ok(columns)
    }

    async fn sequences_of(&self, table: &TableRef) -> Result<Vec<SequenceDef>> {
        let scope = table.full_name();
        let rows = self
            .client
            .query(SEQUENCES_OF, &[&table.schema, &table.name])
            .await
            .map_err(|e| DumpError::from_query(&scope, e))?;

        let mut sequences = Vec::with_capacity(rows.len());
        for row in rows {
            let get_i64 = |idx: usize, field: &str| -> Result<i64> {
                row.try_get::<_, Option<i64>>(idx)
                    .map_err(|e| DumpError::catalog(&scope, e))?
                    .ok_or_else(|| DumpError::render(&scope, format!("sequence {} is NULL", field)))
            };

            let name: String = row.try_get(1).map_err(|e| DumpError::catalog(&scope, e))?;
            let cycles = row
                .try_get::<_, Option<bool>>(7)
                .map_err(|e| DumpError::catalog(&scope, e))?
                .ok_or_else(|| DumpError::render(&scope, format!("sequence {} has NULL cycle", name)))?;

            sequences.push(SequenceDef {
                schema: row.try_get(0).map_err(|e| DumpError::catalog(&scope, e))?,
                start_value: get_i64(2, "start_value")?,
                increment_by: get_i64(3, "increment_by")?,
                min_value: get_i64(4, "min_value")?,
                max_value: get_i64(5, "max_value")?,
                cache_size: get_i64(6, "cache_size")?,
                cycles,
                owner: Some(SequenceOwner {
                    table: table.clone(),
                    column: row.try_get(8).map_err(|e| DumpError::catalog(&scope, e))?,
                }),
                name,
            });
        }

        debug!("Loaded {} sequences for {}", sequences.len(), scope);
        Ok(sequences)
    }

    async fn primary_key_of(&self, table: &TableRef) -> Result<Option<PrimaryKeyDef>> {
        let scope = table.full_name();
        let row = self
            .client
            .query_opt(PRIMARY_KEY_OF, &[&table.schema, &table.name])
            .await
            .map_err(|e| DumpError::from_query(&scope, e))?;

        let pk = match row {
            Some(row) => Some(PrimaryKeyDef {
                constraint_name: row.try_get(0).map_err(|e| DumpError::catalog(&scope, e))?,
                definition: row.try_get(1).map_err(|e| DumpError::catalog(&scope, e))?,
            }),
            None => None,
        };

        debug!("Primary key for {}: {:?}", scope, pk.as_ref().map(|p| &p.definition));
        Ok(pk)
    }

    async fn rows_of(&self, table: &TableRef, columns: &[ColumnDef]) -> Result<Vec<RowRecord>> {
        if columns.is_empty() {
            return Ok(Vec::new());
        }

        let scope = table.full_name();
        let rows = self
            .client
            .query(rows_query(table, columns).as_str(), &[])
            .await
            .map_err(|e| DumpError::from_query(&scope, e))?;

        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            let mut record = Vec::with_capacity(columns.len());
            for idx in 0..columns.len() {
                let value: Option<String> =
                    row.try_get(idx).map_err(|e| DumpError::catalog(&scope, e))?;
                record.push(SqlValue::from(value));
            }
            records.push(record);
        }

        debug!("Read {} rows from {}", records.len(), scope);
        Ok(records)
    }

    async fn release(&self) -> Result<()> {
        self.rollback().await
    }
}

/// Statements that join a session to an exported snapshot.
fn import_snapshot_sql(snapshot_id: &str) -> String {
    format!(
        "{}; SET TRANSACTION SNAPSHOT {}",
        BEGIN_SNAPSHOT,
        quote_literal(snapshot_id)
    )
}

/// Data query reading every column as text.
fn rows_query(table: &TableRef, columns: &[ColumnDef]) -> String {
    let select: Vec<String> = columns
        .iter()
        .map(|c| format!("\"{}\"::text", c.name.replace('"', "\"\"")))
        .collect();
    format!("SELECT {} FROM {}", select.join(", "), table.query_name())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_import_snapshot_sql() {
        assert_eq!(
            import_snapshot_sql("00000003-0000001B-1"),
            "BEGIN ISOLATION LEVEL REPEATABLE READ READ ONLY; \
             SET TRANSACTION SNAPSHOT '00000003-0000001B-1'"
        );
    }

    #[test]
    fn test_rows_query_casts_and_quotes() {
        let columns = vec![
            ColumnDef::new("id", "integer"),
            ColumnDef::new("Display \"Name\"", "text"),
        ];
        assert_eq!(
            rows_query(&TableRef::new("sales", "orders"), &columns),
            "SELECT \"id\"::text, \"Display \"\"Name\"\"\"::text FROM \"sales\".\"orders\""
        );
    }

    #[test]
    fn test_catalog_queries_are_parameterized() {
        for sql in [LIST_TABLES, COLUMNS_OF, SEQUENCES_OF, PRIMARY_KEY_OF] {
            assert!(sql.contains("$1"));
        }
        assert!(LIST_TABLES.contains("ORDER BY tablename"));
        assert!(COLUMNS_OF.contains("ORDER BY ordinal_position"));
    }
}
