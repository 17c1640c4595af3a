//! Row value representation.
//!
//! The dump never needs typed values: every column is read as its text form,
//! so a value is either NULL or text. Keeping NULL as its own variant is what
//! lets each output format pick its own NULL spelling without confusing it
//! with an empty string or the literal text `NULL`.

use std::borrow::Cow;

/// A single column value.
///
/// Uses `Cow` so renderers and tests can build rows from borrowed strings
/// without allocating.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SqlValue<'a> {
    /// SQL NULL.
    Null,

    /// The value's text form, exactly as the server prints it.
    Text(Cow<'a, str>),
}

impl<'a> SqlValue<'a> {
    /// Convert to a fully owned value with `'static` lifetime.
    #[must_use]
    pub fn into_owned(self) -> SqlValue<'static> {
        match self {
            SqlValue::Null => SqlValue::Null,
            SqlValue::Text(v) => SqlValue::Text(Cow::Owned(v.into_owned())),
        }
    }

    /// Check if this value is NULL.
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }

    /// Text form, or `None` for NULL.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            SqlValue::Null => None,
            SqlValue::Text(s) => Some(s),
        }
    }

    /// Create a text value from a borrowed string slice.
    #[must_use]
    pub fn text_borrowed(s: &'a str) -> Self {
        SqlValue::Text(Cow::Borrowed(s))
    }

    /// Create a text value from an owned String.
    #[must_use]
    pub fn text_owned(s: String) -> SqlValue<'static> {
        SqlValue::Text(Cow::Owned(s))
    }
}

impl From<String> for SqlValue<'static> {
    fn from(v: String) -> Self {
        SqlValue::Text(Cow::Owned(v))
    }
}

impl<'a> From<&'a str> for SqlValue<'a> {
    fn from(v: &'a str) -> Self {
        SqlValue::Text(Cow::Borrowed(v))
    }
}

impl<'a, T> From<Option<T>> for SqlValue<'a>
where
    T: Into<SqlValue<'a>>,
{
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(SqlValue::Null)
    }
}

/// One data row, values in column order.
pub type RowRecord = Vec<SqlValue<'static>>;
