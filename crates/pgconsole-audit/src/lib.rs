//! Audit logging.
//!
//! Append-only, line-oriented, structured: one JSON record per line for
//! logins, logouts, SQL executions and exports. There is no read path here;
//! retrieval is an external concern.

pub mod record;
pub mod sink;

pub use record::{AuditRecord, AuditRecordKind};
pub use sink::{sink_for, AuditError, AuditSink, FileSink, StdoutSink};
