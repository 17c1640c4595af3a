//! INSERT statement rendering.

use crate::core::identifier::quote_literal;
use crate::core::{ColumnDef, RowRecord, SqlValue, TableRef};

use super::column_list;

/// Render one INSERT statement per row, newline-separated.
///
/// Every non-NULL value is written as a quoted literal with embedded single
/// quotes doubled; the server casts it to the column type on restore. NULL is
/// written bare.
pub fn render_insert_statements(
    table: &TableRef,
    columns: &[ColumnDef],
    rows: &[RowRecord],
) -> String {
    if rows.is_empty() {
        return String::new();
    }

    let prefix = format!(
        "INSERT INTO {} ({}) VALUES (",
        table.sql_name(),
        column_list(columns)
    );

    let mut out = String::new();
    for row in rows {
        out.push_str(&prefix);
        let values: Vec<String> = row
            .iter()
            .map(|v| match v {
                SqlValue::Null => "NULL".to_string(),
                SqlValue::Text(s) => quote_literal(s),
            })
            .collect();
        out.push_str(&values.join(", "));
        out.push_str(");\n");
    }
    out
}
