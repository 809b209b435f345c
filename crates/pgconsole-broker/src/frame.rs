//! Result frames.

use serde::Serialize;

/// Metadata for one result column. Table-level facts are present only when
/// the column maps back to a real table column.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ColumnMeta {
    pub name: String,

    /// PostgreSQL type name, e.g. `int4`. Empty when the type could not be
    /// resolved.
    #[serde(rename = "type")]
    pub type_name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub table: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,

    pub is_primary_key: bool,
    pub nullable: bool,
    pub has_default: bool,
}

impl ColumnMeta {
    /// Metadata when only the name is known.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            nullable: true,
            ..Self::default()
        }
    }
}

/// One message of an `ExecuteSQL` stream.
///
/// The first frame of every stream carries only the backend pid; the final
/// frame carries either data or an error text, never both.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Frame {
    pub columns: Vec<ColumnMeta>,

    /// Row values in PostgreSQL's text rendering; NULL becomes the empty
    /// string.
    pub rows: Vec<Vec<String>>,

    pub row_count: u64,
    pub elapsed_ms: u64,

    #[serde(rename = "error")]
    pub error_text: String,

    pub backend_pid: i32,
}

impl Frame {
    /// The initial pid-only frame.
    pub fn pid(backend_pid: i32) -> Self {
        Self {
            backend_pid,
            ..Self::default()
        }
    }

    pub fn data(
        backend_pid: i32,
        columns: Vec<ColumnMeta>,
        rows: Vec<Vec<String>>,
        elapsed_ms: u64,
    ) -> Self {
        Self {
            row_count: rows.len() as u64,
            columns,
            rows,
            elapsed_ms,
            error_text: String::new(),
            backend_pid,
        }
    }

    pub fn error(backend_pid: i32, error_text: impl Into<String>, elapsed_ms: u64) -> Self {
        Self {
            error_text: error_text.into(),
            elapsed_ms,
            backend_pid,
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pid_frame_is_otherwise_empty() {
        let frame = Frame::pid(4711);
        assert_eq!(frame.backend_pid, 4711);
        assert!(frame.columns.is_empty());
        assert!(frame.rows.is_empty());
        assert_eq!(frame.row_count, 0);
        assert_eq!(frame.elapsed_ms, 0);
        assert!(frame.error_text.is_empty());
    }

    #[test]
    fn data_frame_counts_its_rows() {
        let frame = Frame::data(
            1,
            vec![ColumnMeta::named("?column?")],
            vec![vec!["1".to_string()], vec!["2".to_string()]],
            7,
        );
        assert_eq!(frame.row_count, 2);
        assert!(frame.error_text.is_empty());
    }
}
