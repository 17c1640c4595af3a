//! Error types for the dump library.

use thiserror::Error;

/// Boxed cause carried by table-scoped errors.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Main error type for dump operations.
#[derive(Error, Debug)]
pub enum DumpError {
    /// Configuration error (invalid YAML, missing fields, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// The snapshot or a session bound to it could not be opened, or the
    /// connection dropped mid-run.
    #[error("Connection error: {0}")]
    Connection(String),

    /// Connection pool error with context
    #[error("Pool error: {message}\n  Context: {context}")]
    Pool { message: String, context: String },

    /// A catalog or data query failed for one table.
    #[error("Catalog query failed for table {table}")]
    Catalog {
        table: String,
        #[source]
        source: BoxError,
    },

    /// Catalog data could not be turned into statements for one table.
    #[error("Cannot render table {table}: {message}")]
    Render { table: String, message: String },

    /// IO error (sink writes, CSV files)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Header/footer template could not be rendered.
    #[error("Template error: {0}")]
    Template(String),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The run stopped because one or more tables failed under the abort policy.
    #[error("Dump aborted: {count} table(s) failed: {tables}")]
    Aborted {
        count: usize,
        tables: String,
        #[source]
        source: Box<DumpError>,
    },

    /// Dump was cancelled (SIGINT, etc.)
    #[error("Dump cancelled")]
    Cancelled,
}

impl DumpError {
    /// Create a Pool error with context about where it occurred
    pub fn pool(message: impl ToString, context: impl Into<String>) -> Self {
        DumpError::Pool {
            message: message.to_string(),
            context: context.into(),
        }
    }

    /// Create a Catalog error for a table.
    pub fn catalog(table: impl Into<String>, source: impl Into<BoxError>) -> Self {
        DumpError::Catalog {
            table: table.into(),
            source: source.into(),
        }
    }

    /// Create a Render error for a table.
    pub fn render(table: impl Into<String>, message: impl Into<String>) -> Self {
        DumpError::Render {
            table: table.into(),
            message: message.into(),
        }
    }

    /// Classify a driver error raised while working on `table`.
    ///
    /// A closed connection means the snapshot is gone, which no table can
    /// recover from; anything else stays scoped to the table.
    pub fn from_query(table: impl Into<String>, err: tokio_postgres::Error) -> Self {
        if err.is_closed() {
            DumpError::Connection(format!("connection closed while reading: {}", err))
        } else {
            DumpError::catalog(table, err)
        }
    }

    /// Whether this error must end the whole run regardless of table policy.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            DumpError::Connection(_)
                | DumpError::Pool { .. }
                | DumpError::Io(_)
                | DumpError::Template(_)
                | DumpError::Cancelled
        )
    }

    /// The table this error is scoped to, if any.
    pub fn table(&self) -> Option<&str> {
        match self {
            DumpError::Catalog { table, .. } | DumpError::Render { table, .. } => Some(table),
            _ => None,
        }
    }

    /// Process exit code for the CLI.
    pub fn exit_code(&self) -> u8 {
        match self {
            DumpError::Config(_) | DumpError::Yaml(_) => 2,
            DumpError::Connection(_) | DumpError::Pool { .. } => 3,
            DumpError::Catalog { .. } | DumpError::Render { .. } | DumpError::Aborted { .. } => 4,
            DumpError::Io(_) => 5,
            DumpError::Cancelled => 130,
            DumpError::Template(_) | DumpError::Json(_) => 1,
        }
    }

    /// Format error with full details including error chain
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }
}

/// Result type alias for dump operations.
pub type Result<T> = std::result::Result<T, DumpError>;
