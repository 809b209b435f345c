//! Audit sinks.

use crate::record::AuditRecord;
use async_trait::async_trait;
use std::io::Write;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

#[derive(Debug, thiserror::Error)]
pub enum AuditError {
    #[error("cannot serialize audit record: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("cannot append audit record: {0}")]
    Io(#[from] std::io::Error),
}

/// A line-oriented audit destination.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn append(&self, record: AuditRecord) -> Result<(), AuditError>;
}

/// Append one JSON line per record to a file.
///
/// Writers are serialized through a mutex so concurrent queries cannot
/// interleave partial lines.
pub struct FileSink {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileSink {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            lock: Mutex::new(()),
        }
    }
}

#[async_trait]
impl AuditSink for FileSink {
    async fn append(&self, record: AuditRecord) -> Result<(), AuditError> {
        let line = serde_json::to_string(&record)?;
        let _guard = self.lock.lock().await;
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{line}")?;
        Ok(())
    }
}

/// Print records to stdout, one JSON line each.
pub struct StdoutSink {
    lock: Mutex<()>,
}

impl StdoutSink {
    pub fn new() -> Self {
        Self {
            lock: Mutex::new(()),
        }
    }
}

impl Default for StdoutSink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AuditSink for StdoutSink {
    async fn append(&self, record: AuditRecord) -> Result<(), AuditError> {
        let line = serde_json::to_string(&record)?;
        let _guard = self.lock.lock().await;
        println!("{line}");
        Ok(())
    }
}

/// Build the sink for an optional audit log path.
pub fn sink_for(path: Option<&str>) -> Box<dyn AuditSink> {
    match path {
        Some(path) => Box::new(FileSink::new(path)),
        None => Box::new(StdoutSink::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::AuditRecordKind;

    #[tokio::test]
    async fn file_sink_appends_one_line_per_record() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.log");
        let sink = FileSink::new(&path);

        sink.append(AuditRecord::login("alice@example.com")).await.unwrap();
        sink.append(
            AuditRecord::sql("alice@example.com", "prod", "app", "SELECT 1").succeeded(5, 1),
        )
        .await
        .unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);

        let first: AuditRecord = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first.kind, AuditRecordKind::Login);
        let second: AuditRecord = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(second.kind, AuditRecordKind::Sql);
        assert_eq!(second.row_count, Some(1));
    }

    #[tokio::test]
    async fn stdout_sink_never_fails_on_normal_records() {
        let sink = StdoutSink::new();
        sink.append(AuditRecord::logout("alice@example.com")).await.unwrap();
    }
}
