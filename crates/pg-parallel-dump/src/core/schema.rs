//! Catalog metadata types.
//!
//! These are the structured shapes the catalog reader produces and the
//! statement renderer consumes. All of them are read once per table dump and
//! never mutated afterwards.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::identifier::quote_ident;

/// Schema used when a filter does not name one.
pub const DEFAULT_SCHEMA: &str = "public";

/// A table visible to the dump connection.
///
/// Identity is `(schema, name)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TableRef {
    /// Schema name.
    pub schema: String,

    /// Table name.
    pub name: String,
}

impl TableRef {
    pub fn new(schema: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            name: name.into(),
        }
    }

    /// Table in the default schema.
    pub fn public(name: impl Into<String>) -> Self {
        Self::new(DEFAULT_SCHEMA, name)
    }

    /// Get the fully qualified table name, unquoted.
    pub fn full_name(&self) -> String {
        format!("{}.{}", self.schema, self.name)
    }

    /// Whether the table lives in the default schema.
    pub fn in_default_schema(&self) -> bool {
        self.schema == DEFAULT_SCHEMA
    }

    /// Name as written into dump output: bare in the default schema,
    /// `schema.table` elsewhere, quoting each part only when needed.
    pub fn sql_name(&self) -> String {
        if self.in_default_schema() {
            quote_ident(&self.name)
        } else {
            format!("{}.{}", quote_ident(&self.schema), quote_ident(&self.name))
        }
    }

    /// Always schema-qualified and always quoted. Used for queries issued
    /// against the source, never for dump output.
    pub fn query_name(&self) -> String {
        format!(
            "\"{}\".\"{}\"",
            self.schema.replace('"', "\"\""),
            self.name.replace('"', "\"\"")
        )
    }

    /// File stem for per-table CSV output.
    ///
    /// Path separators in names are percent-escaped, so the stem is always a
    /// single path component.
    pub fn file_stem(&self) -> String {
        if self.in_default_schema() {
            escape_path_component(&self.name)
        } else {
            format!(
                "{}.{}",
                escape_path_component(&self.schema),
                escape_path_component(&self.name)
            )
        }
    }
}

fn escape_path_component(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for c in name.chars() {
        match c {
            '%' => out.push_str("%25"),
            '/' => out.push_str("%2F"),
            '\\' => out.push_str("%5C"),
            '\0' => out.push_str("%00"),
            c => out.push(c),
        }
    }
    out
}

impl fmt::Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.schema, self.name)
    }
}

/// Column metadata, in catalog order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDef {
    /// Column name.
    pub name: String,

    /// Data type as reported by the catalog (e.g. "integer", "character varying").
    pub data_type: String,

    /// Maximum length for character types.
    pub max_length: Option<i32>,
}

impl ColumnDef {
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            max_length: None,
        }
    }

    /// Set the character length limit.
    pub fn with_max_length(mut self, len: i32) -> Self {
        self.max_length = Some(len);
        self
    }
}

/// Column a sequence feeds through its default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequenceOwner {
    pub table: TableRef,
    pub column: String,
}

/// Sequence metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequenceDef {
    pub schema: String,
    pub name: String,
    pub increment_by: i64,
    pub min_value: i64,
    pub max_value: i64,
    pub start_value: i64,
    pub cache_size: i64,
    pub cycles: bool,

    /// Owning column. A sequence backs at most one column's default.
    pub owner: Option<SequenceOwner>,
}

impl SequenceDef {
    /// Sequence name as written into dump output.
    pub fn sql_name(&self) -> String {
        TableRef::new(&self.schema, &self.name).sql_name()
    }
}

/// Primary key constraint, with its definition taken verbatim from the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrimaryKeyDef {
    /// Constraint name.
    pub constraint_name: String,

    /// Constraint clause, e.g. `PRIMARY KEY (id)`.
    pub definition: String,
}

/// Which tables of the catalog a run covers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableFilter {
    /// Schema to list (default: "public").
    #[serde(default = "default_schema")]
    pub schema: String,

    /// Only tables whose name starts with this.
    #[serde(default)]
    pub name_prefix: String,

    /// Only tables whose name ends with this.
    #[serde(default)]
    pub name_suffix: String,
}

impl Default for TableFilter {
    fn default() -> Self {
        Self {
            schema: default_schema(),
            name_prefix: String::new(),
            name_suffix: String::new(),
        }
    }
}

impl TableFilter {
    /// Filter for a schema with no name constraints.
    pub fn schema(schema: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            ..Self::default()
        }
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.name_prefix = prefix.into();
        self
    }

    pub fn with_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.name_suffix = suffix.into();
        self
    }

    /// Check whether a table passes the filter.
    ///
    /// Prefix and suffix are literal; `_` and `%` carry no wildcard meaning.
    pub fn matches(&self, table: &TableRef) -> bool {
        table.schema == self.schema
            && table.name.starts_with(&self.name_prefix)
            && table.name.ends_with(&self.name_suffix)
    }
}

fn default_schema() -> String {
    DEFAULT_SCHEMA.to_string()
}
