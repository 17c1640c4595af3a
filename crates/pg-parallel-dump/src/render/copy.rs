//! COPY block rendering and parsing.
//!
//! A COPY block is consumed by the bulk loader, not by the SQL parser, so
//! values are never quoted. Instead backslash, tab, newline and carriage
//! return are escaped the way the loader expects, and NULL is `\N`.

use crate::core::{ColumnDef, RowRecord, SqlValue, TableRef};
use crate::error::{DumpError, Result};

use super::column_list;

/// NULL marker inside a COPY block.
pub const COPY_NULL: &str = "\\N";

/// Line that ends a COPY block.
pub const COPY_TERMINATOR: &str = "\\.";

/// Render rows as a COPY ... FROM stdin block.
pub fn render_copy_block(table: &TableRef, columns: &[ColumnDef], rows: &[RowRecord]) -> String {
    let mut out = copy_header(table, columns);
    out.push('\n');

    for row in rows {
        let mut first = true;
        for value in row {
            if !first {
                out.push('\t');
            }
            first = false;
            match value {
                SqlValue::Null => out.push_str(COPY_NULL),
                SqlValue::Text(s) => escape_copy_text(s, &mut out),
            }
        }
        out.push('\n');
    }

    out.push_str(COPY_TERMINATOR);
    out.push('\n');
    out
}

/// Escape text for the COPY text format.
fn escape_copy_text(s: &str, out: &mut String) {
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\t' => out.push_str("\\t"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            _ => out.push(c),
        }
    }
}

/// Reverse [`escape_copy_text`] for one field.
fn unescape_copy_field(field: &str) -> SqlValue<'static> {
    if field == COPY_NULL {
        return SqlValue::Null;
    }

    let mut out = String::with_capacity(field.len());
    let mut chars = field.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('t') => out.push('\t'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('b') => out.push('\u{8}'),
            Some('f') => out.push('\u{c}'),
            Some('v') => out.push('\u{b}'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    SqlValue::text_owned(out)
}

/// A COPY block read back into memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyBlock {
    /// Table name as written in the header.
    pub table: String,
    /// Column names, unquoted.
    pub columns: Vec<String>,
    pub rows: Vec<RowRecord>,
}

/// Parse a block produced by [`render_copy_block`].
pub fn parse_copy_block(text: &str) -> Result<CopyBlock> {
    let mut lines = text.lines();
    let header = lines
        .next()
        .ok_or_else(|| DumpError::render("", "empty COPY block"))?;

    let rest = header
        .strip_prefix("COPY ")
        .and_then(|h| h.strip_suffix(") FROM stdin;"))
        .ok_or_else(|| DumpError::render("", format!("malformed COPY header: {}", header)))?;
    let (table, cols) = rest
        .split_once(" (")
        .ok_or_else(|| DumpError::render("", format!("missing column list: {}", header)))?;
    let columns = split_identifiers(cols);

    let mut rows = Vec::new();
    let mut terminated = false;
    for line in lines {
        if line == COPY_TERMINATOR {
            terminated = true;
            break;
        }
        let row: RowRecord = line.split('\t').map(unescape_copy_field).collect();
        if row.len() != columns.len() {
            return Err(DumpError::render(
                table,
                format!("expected {} fields, found {}", columns.len(), row.len()),
            ));
        }
        rows.push(row);
    }

    if !terminated {
        return Err(DumpError::render(table, "COPY block is not terminated"));
    }

    Ok(CopyBlock {
        table: table.to_string(),
        columns,
        rows,
    })
}

/// Split a `, `-separated identifier list, honouring double quotes.
fn split_identifiers(list: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();
    let mut quoted = false;
    let mut chars = list.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if quoted && chars.peek() == Some(&'"') => {
                chars.next();
                current.push('"');
            }
            '"' => quoted = !quoted,
            ',' if !quoted => {
                out.push(std::mem::take(&mut current));
                if chars.peek() == Some(&' ') {
                    chars.next();
                }
            }
            _ => current.push(c),
        }
    }
    if !current.is_empty() || !out.is_empty() {
        out.push(current);
    }
    out
}

/// Header line for a table, for callers that stream rows themselves.
pub fn copy_header(table: &TableRef, columns: &[ColumnDef]) -> String {
    format!(
        "COPY {} ({}) FROM stdin;",
        table.sql_name(),
        column_list(columns)
    )
}
