//! Statement classification.
//!
//! Each parsed statement is reduced to a tag from a closed kind set, which
//! then determines the base permission and whether the statement may run
//! inside a transaction block. Statements outside sqlparser's grammar are
//! classified by their leading keywords where that is unambiguous (ALTER
//! SEQUENCE, REFRESH MATERIALIZED VIEW); everything else lands in
//! [`StatementKind::Unknown`], which requires `admin`. That covers the
//! maintenance family (VACUUM, CLUSTER, REINDEX, ALTER SYSTEM, tablespace
//! DDL, ...).

use pgconsole_core::Permission;
use regex::Regex;
use sqlparser::ast::{ObjectType, Statement};
use std::sync::OnceLock;

/// The closed statement-kind set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    // Reads
    Select,
    Show,
    Set,
    Transaction,

    // Dedicated kinds
    Explain,
    Call,

    // Writes
    Insert,
    Update,
    Delete,
    Copy,

    // DDL
    CreateTable,
    AlterTable,
    Drop,
    DropIndexConcurrently,
    CreateView,
    CreateIndex,
    CreateIndexConcurrently,
    CreateFunction,
    Truncate,
    CreateSchema,
    CreateSequence,
    AlterSequence,
    RefreshMaterializedView,
    CreateType,
    CreateExtension,
    CreateTrigger,
    Comment,
    Grant,
    Revoke,

    // Administration
    CreateRole,
    AlterRole,
    DropRole,
    CreateDatabase,
    DropDatabase,

    /// Anything the parser produced that has no mapping, or text the parser
    /// rejected outright.
    Unknown,
}

impl StatementKind {
    /// Reduce a parsed statement to its kind. `text` is the statement source,
    /// used where the AST does not carry the deciding flag.
    pub fn classify(stmt: &Statement, text: &str) -> StatementKind {
        match stmt {
            Statement::Query { .. } => StatementKind::Select,
            Statement::ShowVariable { .. } => StatementKind::Show,
            Statement::Set { .. } => StatementKind::Set,
            Statement::StartTransaction { .. }
            | Statement::Commit { .. }
            | Statement::Rollback { .. } => StatementKind::Transaction,

            Statement::Explain { .. } | Statement::ExplainTable { .. } => StatementKind::Explain,
            Statement::Call { .. } => StatementKind::Call,

            Statement::Insert { .. } => StatementKind::Insert,
            Statement::Update { .. } => StatementKind::Update,
            Statement::Delete { .. } => StatementKind::Delete,
            Statement::Copy { .. } => StatementKind::Copy,

            Statement::CreateTable { .. } => StatementKind::CreateTable,
            Statement::AlterTable { .. } => StatementKind::AlterTable,
            Statement::CreateView { .. } => StatementKind::CreateView,
            Statement::CreateIndex(create_index) => {
                if create_index.concurrently {
                    StatementKind::CreateIndexConcurrently
                } else {
                    StatementKind::CreateIndex
                }
            }
            Statement::CreateFunction { .. } => StatementKind::CreateFunction,
            Statement::Truncate { .. } => StatementKind::Truncate,
            Statement::CreateSchema { .. } => StatementKind::CreateSchema,
            Statement::CreateSequence { .. } => StatementKind::CreateSequence,
            Statement::CreateType { .. } => StatementKind::CreateType,
            Statement::CreateExtension { .. } => StatementKind::CreateExtension,
            Statement::CreateTrigger { .. } => StatementKind::CreateTrigger,
            Statement::Comment { .. } => StatementKind::Comment,
            Statement::Grant { .. } => StatementKind::Grant,
            Statement::Revoke { .. } => StatementKind::Revoke,

            Statement::CreateRole { .. } => StatementKind::CreateRole,
            Statement::AlterRole { .. } => StatementKind::AlterRole,
            Statement::CreateDatabase { .. } => StatementKind::CreateDatabase,

            Statement::Drop { object_type, .. } => match object_type {
                ObjectType::Role => StatementKind::DropRole,
                ObjectType::Database => StatementKind::DropDatabase,
                ObjectType::Index => {
                    if drop_index_is_concurrent(text) {
                        StatementKind::DropIndexConcurrently
                    } else {
                        StatementKind::Drop
                    }
                }
                _ => StatementKind::Drop,
            },

            _ => StatementKind::from_leading_keywords(text),
        }
    }

    /// Classify a statement by its leading keywords.
    ///
    /// Catches DDL the parser has no grammar for but whose opening words
    /// identify it unambiguously. Anything else stays `Unknown`.
    pub fn from_leading_keywords(text: &str) -> StatementKind {
        let mut words = text.split_whitespace();
        let first = words.next().unwrap_or_default();
        let second = words.next().unwrap_or_default();
        let third = words.next().unwrap_or_default();

        if first.eq_ignore_ascii_case("alter") && second.eq_ignore_ascii_case("sequence") {
            return StatementKind::AlterSequence;
        }
        if first.eq_ignore_ascii_case("refresh")
            && second.eq_ignore_ascii_case("materialized")
            && third.eq_ignore_ascii_case("view")
        {
            return StatementKind::RefreshMaterializedView;
        }
        StatementKind::Unknown
    }

    /// The base permission demanded by this kind.
    pub fn permission(&self) -> Permission {
        use StatementKind::*;
        match self {
            Select | Show | Set | Transaction => Permission::Read,
            Explain => Permission::Explain,
            Call => Permission::Execute,
            Insert | Update | Delete | Copy => Permission::Write,
            CreateTable | AlterTable | Drop | DropIndexConcurrently | CreateView | CreateIndex
            | CreateIndexConcurrently | CreateFunction | Truncate | CreateSchema
            | CreateSequence | AlterSequence | RefreshMaterializedView | CreateType
            | CreateExtension | CreateTrigger | Comment | Grant | Revoke => Permission::Ddl,
            CreateRole | AlterRole | DropRole | CreateDatabase | DropDatabase | Unknown => {
                Permission::Admin
            }
        }
    }

    /// Whether a statement of this kind may run inside BEGIN/COMMIT.
    pub fn transaction_safe(&self) -> bool {
        use StatementKind::*;
        !matches!(
            self,
            Transaction
                | CreateDatabase
                | DropDatabase
                | CreateIndexConcurrently
                | DropIndexConcurrently
                | Unknown
        )
    }
}

/// `DROP INDEX CONCURRENTLY` cannot run inside a transaction, but the AST
/// does not carry the flag, so the statement text is scanned for the
/// word-bounded keyword.
fn drop_index_is_concurrent(text: &str) -> bool {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\bconcurrently\b").unwrap())
        .is_match(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn concurrent_keyword_scan_is_word_bounded() {
        assert!(drop_index_is_concurrent("DROP INDEX CONCURRENTLY idx"));
        assert!(drop_index_is_concurrent("drop index concurrently idx"));
        assert!(!drop_index_is_concurrent("DROP INDEX idx_concurrently_x"));
        assert!(!drop_index_is_concurrent("DROP INDEX myconcurrently"));
    }

    #[test]
    fn admin_kinds_are_never_transaction_safe_when_destructive() {
        assert!(!StatementKind::CreateDatabase.transaction_safe());
        assert!(!StatementKind::Unknown.transaction_safe());
        assert!(StatementKind::CreateRole.transaction_safe());
        assert!(StatementKind::Select.transaction_safe());
    }

    #[test]
    fn leading_keywords_classify_sequence_and_matview_ddl() {
        assert_eq!(
            StatementKind::from_leading_keywords("ALTER SEQUENCE order_id_seq RESTART"),
            StatementKind::AlterSequence
        );
        assert_eq!(
            StatementKind::from_leading_keywords("refresh materialized view daily_totals"),
            StatementKind::RefreshMaterializedView
        );

        assert_eq!(StatementKind::AlterSequence.permission(), Permission::Ddl);
        assert_eq!(
            StatementKind::RefreshMaterializedView.permission(),
            Permission::Ddl
        );
        assert!(StatementKind::AlterSequence.transaction_safe());
        assert!(StatementKind::RefreshMaterializedView.transaction_safe());
    }

    #[test]
    fn other_leading_keywords_stay_unknown() {
        assert_eq!(
            StatementKind::from_leading_keywords("VACUUM t"),
            StatementKind::Unknown
        );
        assert_eq!(
            StatementKind::from_leading_keywords("ALTER SYSTEM SET work_mem = '64MB'"),
            StatementKind::Unknown
        );
        assert_eq!(
            StatementKind::from_leading_keywords("REFRESH VIEW nope"),
            StatementKind::Unknown
        );
        assert_eq!(StatementKind::from_leading_keywords(""), StatementKind::Unknown);
    }
}
