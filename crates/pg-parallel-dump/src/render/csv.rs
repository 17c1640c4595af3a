//! Delimited (CSV) rendering.
//!
//! Unlike the COPY and INSERT renderers this output is lossy: NULL is spelled
//! as the text `NULL`, so a NULL and the string "NULL" look the same in the
//! file. Consumers that need the distinction should use the SQL dump.

use csv_core::{Writer, WriteResult};

use crate::core::{ColumnDef, RowRecord, SqlValue};

/// Spelling of NULL in CSV output.
pub const CSV_NULL: &str = "NULL";

/// Scratch buffer size for the CSV writer.
const WRITE_BUFFER: usize = 4096;

/// Header record of column names, then one record per row.
pub fn render_csv_rows(columns: &[ColumnDef], rows: &[RowRecord]) -> Vec<Vec<String>> {
    let mut records = Vec::with_capacity(rows.len() + 1);
    records.push(columns.iter().map(|c| c.name.clone()).collect());
    for row in rows {
        records.push(
            row.iter()
                .map(|v| match v {
                    SqlValue::Null => CSV_NULL.to_string(),
                    SqlValue::Text(s) => s.to_string(),
                })
                .collect(),
        );
    }
    records
}

/// Encode records as RFC 4180 CSV, quoting fields only when needed.
pub fn encode_csv(records: &[Vec<String>]) -> Vec<u8> {
    let mut writer = Writer::new();
    let mut buf = [0u8; WRITE_BUFFER];
    let mut out = Vec::new();

    for record in records {
        for (i, field) in record.iter().enumerate() {
            if i > 0 {
                loop {
                    let (res, n) = writer.delimiter(&mut buf);
                    out.extend_from_slice(&buf[..n]);
                    if let WriteResult::InputEmpty = res {
                        break;
                    }
                }
            }

            let mut input = field.as_bytes();
            loop {
                let (res, nin, nout) = writer.field(input, &mut buf);
                input = &input[nin..];
                out.extend_from_slice(&buf[..nout]);
                if let WriteResult::InputEmpty = res {
                    break;
                }
            }
        }

        loop {
            let (res, n) = writer.terminator(&mut buf);
            out.extend_from_slice(&buf[..n]);
            if let WriteResult::InputEmpty = res {
                break;
            }
        }
    }

    loop {
        let (res, n) = writer.finish(&mut buf);
        out.extend_from_slice(&buf[..n]);
        if let WriteResult::InputEmpty = res {
            break;
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn columns() -> Vec<ColumnDef> {
        vec![ColumnDef::new("id", "integer"), ColumnDef::new("name", "text")]
    }

    #[test]
    fn test_csv_header_then_rows() {
        let rows = vec![
            vec![SqlValue::from("1"), SqlValue::from("a")],
            vec![SqlValue::from("2"), SqlValue::Null],
        ];
        let records = render_csv_rows(&columns(), &rows);
        assert_eq!(
            records,
            vec![
                vec!["id".to_string(), "name".to_string()],
                vec!["1".to_string(), "a".to_string()],
                vec!["2".to_string(), "NULL".to_string()],
            ]
        );
    }

    #[test]
    fn test_csv_no_rows_is_header_only() {
        let records = render_csv_rows(&columns(), &[]);
        assert_eq!(records.len(), 1);
        assert_eq!(encode_csv(&records), b"id,name\n");
    }

    #[test]
    fn test_encode_plain() {
        let rows = vec![vec![SqlValue::from("1"), SqlValue::from("a")]];
        let bytes = encode_csv(&render_csv_rows(&columns(), &rows));
        assert_eq!(String::from_utf8(bytes).unwrap(), "id,name\n1,a\n");
    }

    #[test]
    fn test_encode_quotes_when_needed() {
        let rows = vec![
            vec![SqlValue::from("1"), SqlValue::from("a,b")],
            vec![SqlValue::from("2"), SqlValue::from("say \"hi\"")],
            vec![SqlValue::from("3"), SqlValue::from("two\nlines")],
        ];
        let text = String::from_utf8(encode_csv(&render_csv_rows(&columns(), &rows))).unwrap();
        assert_eq!(
            text,
            "id,name\n1,\"a,b\"\n2,\"say \"\"hi\"\"\"\n3,\"two\nlines\"\n"
        );
    }

    #[test]
    fn test_encode_long_field() {
        let long = "x".repeat(WRITE_BUFFER * 3);
        let rows = vec![vec![SqlValue::from("1"), SqlValue::from(long.clone())]];
        let text = String::from_utf8(encode_csv(&render_csv_rows(&columns(), &rows))).unwrap();
        assert!(text.ends_with(&format!("1,{}\n", long)));
    }
}
