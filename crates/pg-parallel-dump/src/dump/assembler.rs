//! Dump header and footer.
//!
//! Both are rendered from a [`DumpInfo`] through small `{{ field }}`
//! templates. A template naming a field that does not exist, or a field that
//! has no value yet, is a [`DumpError::Template`].

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

use crate::error::{DumpError, Result};

/// Timestamp format of the footer line.
pub const COMPLETED_AT_FORMAT: &str = "%Y-%m-%d %H:%M:%S %z";

/// Preamble written before any table body.
///
/// Field order is fixed: tool version, server version, thread count, then the
/// session settings a restore needs.
pub const HEADER_TEMPLATE: &str = "\
--
-- PostgreSQL parallel dump v{{ tool_version }}
--
-- Server version:
--\t {{ server_version }}
-- Threads Used:
--   {{ parallelism }}
--

SET statement_timeout = 0;
SET lock_timeout = 0;
SET idle_in_transaction_session_timeout = 0;
SET client_encoding = 'UTF8';
SET standard_conforming_strings = on;
SELECT pg_catalog.set_config('search_path', 'public', false);
SET check_function_bodies = false;
SET xmloption = content;
SET client_min_messages = warning;
SET row_security = off;

SET default_tablespace = '';

SET default_table_access_method = heap;

";

/// Closing line, written once every job has drained.
pub const FOOTER_TEMPLATE: &str = "\
--
-- Dump completed on {{ completed_at }}
--
";

/// Run-level metadata for the header and footer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DumpInfo {
    pub tool_version: String,
    pub server_version: String,
    pub parallelism: usize,

    /// Set once, when the last group has drained.
    pub completed_at: Option<DateTime<FixedOffset>>,
}

impl DumpInfo {
    pub fn new(
        tool_version: impl Into<String>,
        server_version: impl Into<String>,
        parallelism: usize,
    ) -> Self {
        Self {
            tool_version: tool_version.into(),
            server_version: server_version.into(),
            parallelism,
            completed_at: None,
        }
    }

    /// Record the completion time.
    pub fn complete(&mut self, at: DateTime<FixedOffset>) {
        self.completed_at = Some(at);
    }

    fn field(&self, name: &str) -> Result<String> {
        match name {
            "tool_version" => Ok(self.tool_version.clone()),
            "server_version" => Ok(self.server_version.clone()),
            "parallelism" => Ok(self.parallelism.to_string()),
            "completed_at" => self
                .completed_at
                .map(|t| t.format(COMPLETED_AT_FORMAT).to_string())
                .ok_or_else(|| DumpError::Template("completed_at is not set".into())),
            other => Err(DumpError::Template(format!("unknown field '{}'", other))),
        }
    }
}

/// Substitute every `{{ field }}` in `template` from `info`.
pub fn render_template(template: &str, info: &DumpInfo) -> Result<String> {
    let mut out = String::with_capacity(template.len() + 64);
    let mut rest = template;

    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let end = after
            .find("}}")
            .ok_or_else(|| DumpError::Template("unterminated placeholder".into()))?;
        out.push_str(&info.field(after[..end].trim())?);
        rest = &after[end + 2..];
    }
    out.push_str(rest);

    Ok(out)
}

pub fn render_header(info: &DumpInfo) -> Result<String> {
    render_template(HEADER_TEMPLATE, info)
}

pub fn render_footer(info: &DumpInfo) -> Result<String> {
    render_template(FOOTER_TEMPLATE, info)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn info() -> DumpInfo {
        DumpInfo::new("0.3.0", "16.2 (Debian 16.2-1.pgdg120+2)", 8)
    }

    #[test]
    fn test_header_field_order() {
        let header = render_header(&info()).unwrap();
        let tool = header.find("dump v0.3.0").unwrap();
        let server = header.find("16.2 (Debian").unwrap();
        let threads = header.find("Threads Used:\n--   8").unwrap();
        let settings = header.find("SET statement_timeout = 0;").unwrap();
        assert!(tool < server && server < threads && threads < settings);
        assert!(header.contains("SELECT pg_catalog.set_config('search_path', 'public', false);"));
        assert!(!header.contains("{{"));
    }

    #[test]
    fn test_footer_needs_completion() {
        let mut info = info();
        assert!(matches!(render_footer(&info), Err(DumpError::Template(_))));

        let offset = FixedOffset::east_opt(2 * 3600).unwrap();
        info.complete(offset.with_ymd_and_hms(2024, 3, 1, 12, 30, 5).unwrap());
        assert_eq!(
            render_footer(&info).unwrap(),
            "--\n-- Dump completed on 2024-03-01 12:30:05 +0200\n--\n"
        );
    }

    #[test]
    fn test_unknown_field_is_template_error() {
        let err = render_template("v{{ nope }}", &info()).unwrap_err();
        assert!(err.to_string().contains("unknown field 'nope'"));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_unterminated_placeholder() {
        assert!(render_template("v{{ tool_version", &info()).is_err());
    }

    #[test]
    fn test_text_without_placeholders() {
        assert_eq!(render_template("plain", &info()).unwrap(), "plain");
    }
}
