//! Output sinks.
//!
//! The dispatcher is the only writer: it appends finished table bodies one
//! at a time, so sinks need no internal locking.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::debug;

use crate::config::DataFormat;
use crate::core::TableRef;
use crate::error::Result;

use super::job::OutputMode;

/// Destination of a dump run.
#[async_trait]
pub trait DumpSink: Send {
    /// Output mode this sink expects table bodies in.
    fn mode(&self) -> OutputMode;

    async fn write_header(&mut self, header: &str) -> Result<()>;

    /// Append one finished table.
    async fn write_table(&mut self, table: &TableRef, body: &[u8]) -> Result<()>;

    async fn write_footer(&mut self, footer: &str) -> Result<()>;

    /// Flush everything written so far.
    async fn finish(&mut self) -> Result<()>;

    /// Files created by this sink, in write order.
    fn written_paths(&self) -> Vec<PathBuf> {
        Vec::new()
    }
}

/// Single SQL stream: header, table bodies, footer.
pub struct SqlSink<W> {
    writer: W,
    format: DataFormat,
    bytes_written: u64,
}

impl<W: AsyncWrite + Unpin + Send> SqlSink<W> {
    pub fn new(writer: W, format: DataFormat) -> Self {
        Self {
            writer,
            format,
            bytes_written: 0,
        }
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    pub fn into_inner(self) -> W {
        self.writer
    }

    async fn write(&mut self, bytes: &[u8]) -> Result<()> {
        self.writer.write_all(bytes).await?;
        self.bytes_written += bytes.len() as u64;
        Ok(())
    }
}

#[async_trait]
impl<W: AsyncWrite + Unpin + Send> DumpSink for SqlSink<W> {
    fn mode(&self) -> OutputMode {
        OutputMode::Sql(self.format)
    }

    async fn write_header(&mut self, header: &str) -> Result<()> {
        self.write(header.as_bytes()).await
    }

    async fn write_table(&mut self, table: &TableRef, body: &[u8]) -> Result<()> {
        self.write(body).await?;
        debug!("{}: appended {} bytes", table, body.len());
        Ok(())
    }

    async fn write_footer(&mut self, footer: &str) -> Result<()> {
        self.write(footer.as_bytes()).await
    }

    async fn finish(&mut self) -> Result<()> {
        self.writer.flush().await?;
        Ok(())
    }
}

/// One `<table>.csv` per table in a directory. No header or footer.
pub struct CsvDirSink {
    dir: PathBuf,
    written: Vec<PathBuf>,
}

impl CsvDirSink {
    /// Create the directory if needed.
    pub async fn create(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Self {
            dir,
            written: Vec::new(),
        })
    }

    /// Path a table's file is written to.
    pub fn path_for(&self, table: &TableRef) -> PathBuf {
        self.dir.join(format!("{}.csv", table.file_stem()))
    }
}

#[async_trait]
impl DumpSink for CsvDirSink {
    fn mode(&self) -> OutputMode {
        OutputMode::Csv
    }

    async fn write_header(&mut self, _header: &str) -> Result<()> {
        Ok(())
    }

    async fn write_table(&mut self, table: &TableRef, body: &[u8]) -> Result<()> {
        let path = self.path_for(table);
        tokio::fs::write(&path, body).await?;
        debug!("{}: wrote {}", table, path.display());
        self.written.push(path);
        Ok(())
    }

    async fn write_footer(&mut self, _footer: &str) -> Result<()> {
        Ok(())
    }

    async fn finish(&mut self) -> Result<()> {
        Ok(())
    }

    fn written_paths(&self) -> Vec<PathBuf> {
        self.written.clone()
    }
}
