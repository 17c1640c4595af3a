//! Statement rendering.
//!
//! Pure functions from catalog metadata and row data to dump text. Nothing in
//! this module performs I/O, so identical inputs always produce byte-identical
//! output.
//!
//! - DDL: [`render_create_table`], [`render_sequence`], [`render_primary_key`]
//! - data: [`copy`] (bulk-load block), [`insert`] (statement list), [`csv`]

pub mod copy;
pub mod csv;
pub mod insert;

pub use copy::{parse_copy_block, render_copy_block, CopyBlock};
pub use csv::{encode_csv, render_csv_rows};
pub use insert::render_insert_statements;

use crate::config::DataFormat;
use crate::core::identifier::{quote_ident, quote_literal};
use crate::core::{ColumnDef, PrimaryKeyDef, RowRecord, SequenceDef, TableRef};

/// Render the CREATE TABLE statement, one column per line in input order.
pub fn render_create_table(table: &TableRef, columns: &[ColumnDef]) -> String {
    let defs: Vec<String> = columns
        .iter()
        .map(|col| {
            let mut def = format!("    {} {}", quote_ident(&col.name), col.data_type);
            if let Some(len) = col.max_length {
                def.push_str(&format!("({})", len));
            }
            def
        })
        .collect();

    if defs.is_empty() {
        format!("CREATE TABLE {} (\n);\n", table.sql_name())
    } else {
        format!(
            "CREATE TABLE {} (\n{}\n);\n",
            table.sql_name(),
            defs.join(",\n")
        )
    }
}

/// Render a CREATE SEQUENCE statement, followed by its ownership and the
/// column default when the sequence has an owning column.
pub fn render_sequence(seq: &SequenceDef) -> String {
    let name = seq.sql_name();
    let mut out = format!(
        "CREATE SEQUENCE {}\n    START WITH {}\n    INCREMENT BY {}\n    MINVALUE {}\n    MAXVALUE {}\n    CACHE {}",
        name, seq.start_value, seq.increment_by, seq.min_value, seq.max_value, seq.cache_size
    );
    if seq.cycles {
        out.push_str("\n    CYCLE");
    }
    out.push_str(";\n");

    if let Some(owner) = &seq.owner {
        let table = owner.table.sql_name();
        let column = quote_ident(&owner.column);
        out.push_str(&format!(
            "\nALTER SEQUENCE {} OWNED BY {}.{};\n",
            name, table, column
        ));
        out.push_str(&format!(
            "\nALTER TABLE {} ALTER COLUMN {} SET DEFAULT nextval({}::regclass);\n",
            table,
            column,
            quote_literal(&name)
        ));
    }

    out
}

/// Render the primary key as an ALTER TABLE statement. The definition is
/// passed through untouched.
pub fn render_primary_key(table: &TableRef, pk: &PrimaryKeyDef) -> String {
    format!(
        "ALTER TABLE {} ADD CONSTRAINT {} {};\n",
        table.sql_name(),
        quote_ident(&pk.constraint_name),
        pk.definition
    )
}

/// Everything read for one table.
#[derive(Debug, Clone, Default)]
pub struct TableSnapshot {
    pub columns: Vec<ColumnDef>,
    pub sequences: Vec<SequenceDef>,
    pub primary_key: Option<PrimaryKeyDef>,
    pub rows: Vec<RowRecord>,
}

/// Render the full SQL body for one table: banner, CREATE TABLE, sequences,
/// primary key and data, separated by blank lines. Empty sections are left out.
pub fn render_table_body(table: &TableRef, data: &TableSnapshot, format: DataFormat) -> String {
    let mut sections = vec![
        format!(
            "--\n-- Name: {}; Type: TABLE; Schema: {}\n--\n",
            table.name, table.schema
        ),
        render_create_table(table, &data.columns),
    ];

    sections.extend(data.sequences.iter().map(render_sequence));

    if let Some(pk) = &data.primary_key {
        sections.push(render_primary_key(table, pk));
    }

    if !data.columns.is_empty() {
        let block = match format {
            DataFormat::Copy => render_copy_block(table, &data.columns, &data.rows),
            DataFormat::Insert => render_insert_statements(table, &data.columns, &data.rows),
        };
        if !block.is_empty() {
            sections.push(block);
        }
    }

    let mut body = sections.join("\n");
    body.push('\n');
    body
}

/// Join column names for a column list, quoting where needed.
fn column_list(columns: &[ColumnDef]) -> String {
    columns
        .iter()
        .map(|c| quote_ident(&c.name))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{SequenceOwner, SqlValue};

    fn sample_columns() -> Vec<ColumnDef> {
        vec![
            ColumnDef::new("id", "integer"),
            ColumnDef::new("name", "character varying").with_max_length(10),
        ]
    }

    fn serial_sequence() -> SequenceDef {
        SequenceDef {
            schema: "public".into(),
            name: "t_id_seq".into(),
            increment_by: 1,
            min_value: 1,
            max_value: 2147483647,
            start_value: 1,
            cache_size: 1,
            cycles: false,
            owner: Some(SequenceOwner {
                table: TableRef::public("t"),
                column: "id".into(),
            }),
        }
    }

    #[test]
    fn test_create_table() {
        let sql = render_create_table(&TableRef::public("t"), &sample_columns());
        assert_eq!(
            sql,
            "CREATE TABLE t (\n    id integer,\n    name character varying(10)\n);\n"
        );
    }

    #[test]
    fn test_create_table_qualifies_other_schema() {
        let sql = render_create_table(&TableRef::new("audit", "log"), &sample_columns());
        assert!(sql.starts_with("CREATE TABLE audit.log (\n"));
    }

    #[test]
    fn test_keyword_names_are_quoted() {
        let table = TableRef::public("join");
        let columns = vec![
            ColumnDef::new("left", "integer"),
            ColumnDef::new("is", "text"),
        ];
        assert_eq!(
            render_create_table(&table, &columns),
            "CREATE TABLE \"join\" (\n    \"left\" integer,\n    \"is\" text\n);\n"
        );
        assert_eq!(
            copy::copy_header(&table, &columns),
            "COPY \"join\" (\"left\", \"is\") FROM stdin;"
        );
        let rows = vec![vec![SqlValue::from("1".to_string()), SqlValue::Null]];
        assert_eq!(
            render_insert_statements(&table, &columns, &rows),
            "INSERT INTO \"join\" (\"left\", \"is\") VALUES ('1', NULL);\n"
        );
    }

    #[test]
    fn test_create_table_no_columns() {
        let sql = render_create_table(&TableRef::public("empty"), &[]);
        assert_eq!(sql, "CREATE TABLE empty (\n);\n");
    }

    #[test]
    fn test_sequence_with_owner() {
        let sql = render_sequence(&serial_sequence());
        assert_eq!(
            sql,
            "CREATE SEQUENCE t_id_seq\n    START WITH 1\n    INCREMENT BY 1\n    MINVALUE 1\n    \
             MAXVALUE 2147483647\n    CACHE 1;\n\n\
             ALTER SEQUENCE t_id_seq OWNED BY t.id;\n\n\
             ALTER TABLE t ALTER COLUMN id SET DEFAULT nextval('t_id_seq'::regclass);\n"
        );
    }

    #[test]
    fn test_sequence_cycle_without_owner() {
        let mut seq = serial_sequence();
        seq.owner = None;
        seq.cycles = true;
        seq.increment_by = -5;
        seq.min_value = i64::MIN;
        let sql = render_sequence(&seq);
        assert!(sql.contains("INCREMENT BY -5"));
        assert!(sql.contains(&format!("MINVALUE {}", i64::MIN)));
        assert!(sql.ends_with("CACHE 1\n    CYCLE;\n"));
        assert!(!sql.contains("OWNED BY"));
    }

    #[test]
    fn test_primary_key_passthrough() {
        let pk = PrimaryKeyDef {
            constraint_name: "t_pkey".into(),
            definition: "PRIMARY KEY (id, \"Tenant\")".into(),
        };
        assert_eq!(
            render_primary_key(&TableRef::public("t"), &pk),
            "ALTER TABLE t ADD CONSTRAINT t_pkey PRIMARY KEY (id, \"Tenant\");\n"
        );
    }

    #[test]
    fn test_table_body_sections() {
        let data = TableSnapshot {
            columns: sample_columns(),
            sequences: vec![serial_sequence()],
            primary_key: Some(PrimaryKeyDef {
                constraint_name: "t_pkey".into(),
                definition: "PRIMARY KEY (id)".into(),
            }),
            rows: vec![vec![SqlValue::from("1"), SqlValue::from("a")]],
        };
        let body = render_table_body(&TableRef::public("t"), &data, DataFormat::Copy);

        let create = body.find("CREATE TABLE t").expect("create");
        let seq = body.find("CREATE SEQUENCE").expect("sequence");
        let pk = body.find("ADD CONSTRAINT").expect("pk");
        let copy = body.find("COPY t (id, name) FROM stdin;").expect("copy");
        assert!(create < seq && seq < pk && pk < copy);
        assert!(body.contains("\\.\n"));
    }

    #[test]
    fn test_table_body_is_idempotent() {
        let data = TableSnapshot {
            columns: sample_columns(),
            rows: vec![vec![SqlValue::from("2"), SqlValue::Null]],
            ..Default::default()
        };
        let table = TableRef::public("t");
        assert_eq!(
            render_table_body(&table, &data, DataFormat::Insert),
            render_table_body(&table, &data, DataFormat::Insert)
        );
    }

    #[test]
    fn test_table_body_without_columns_has_no_data_block() {
        let data = TableSnapshot::default();
        let body = render_table_body(&TableRef::public("empty"), &data, DataFormat::Copy);
        assert!(!body.contains("COPY"));
    }
}
