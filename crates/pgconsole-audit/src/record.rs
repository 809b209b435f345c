//! Audit record types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// What happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditRecordKind {
    Login,
    Logout,
    Sql,
    Export,
}

/// One audit record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    pub record_id: Uuid,
    pub occurred_at: DateTime<Utc>,
    pub kind: AuditRecordKind,

    /// The acting principal's email.
    pub email: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub connection_id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub sql: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub success: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub elapsed_ms: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub row_count: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AuditRecord {
    pub fn new(kind: AuditRecordKind, email: impl Into<String>) -> Self {
        Self {
            record_id: Uuid::new_v4(),
            occurred_at: Utc::now(),
            kind,
            email: email.into(),
            connection_id: None,
            database: None,
            sql: None,
            success: None,
            elapsed_ms: None,
            row_count: None,
            error: None,
        }
    }

    pub fn login(email: impl Into<String>) -> Self {
        Self::new(AuditRecordKind::Login, email)
    }

    pub fn logout(email: impl Into<String>) -> Self {
        Self::new(AuditRecordKind::Logout, email)
    }

    /// A SQL execution record; success and timing are filled by the builder
    /// methods below.
    pub fn sql(
        email: impl Into<String>,
        connection_id: impl Into<String>,
        database: impl Into<String>,
        sql: impl Into<String>,
    ) -> Self {
        let mut record = Self::new(AuditRecordKind::Sql, email);
        record.connection_id = Some(connection_id.into());
        record.database = Some(database.into());
        record.sql = Some(sql.into());
        record
    }

    pub fn export(
        email: impl Into<String>,
        connection_id: impl Into<String>,
        database: impl Into<String>,
    ) -> Self {
        let mut record = Self::new(AuditRecordKind::Export, email);
        record.connection_id = Some(connection_id.into());
        record.database = Some(database.into());
        record
    }

    pub fn succeeded(mut self, elapsed_ms: u64, row_count: u64) -> Self {
        self.success = Some(true);
        self.elapsed_ms = Some(elapsed_ms);
        self.row_count = Some(row_count);
        self
    }

    pub fn failed(mut self, elapsed_ms: u64, error: impl Into<String>) -> Self {
        self.success = Some(false);
        self.elapsed_ms = Some(elapsed_ms);
        self.error = Some(error.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sql_record_serializes_one_compact_object() {
        let record = AuditRecord::sql("alice@example.com", "prod", "app", "SELECT 1")
            .succeeded(12, 1);
        let json = serde_json::to_string(&record).unwrap();
        assert!(!json.contains('\n'));
        assert!(json.contains("\"kind\":\"sql\""));
        assert!(json.contains("\"row_count\":1"));
        assert!(!json.contains("error"));
    }

    #[test]
    fn failure_records_carry_the_error_text() {
        let record = AuditRecord::sql("alice@example.com", "prod", "app", "SELECT oops")
            .failed(3, "column \"oops\" does not exist");
        assert_eq!(record.success, Some(false));
        assert!(record.error.as_deref().unwrap().contains("oops"));
        assert_eq!(record.row_count, None);
    }
}
