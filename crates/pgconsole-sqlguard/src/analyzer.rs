//! The SQL permission analyzer.

use crate::functions::{collect_function_names, function_permission};
use crate::splitter::split_statements;
use crate::statements::StatementKind;
use pgconsole_core::{Permission, PermissionSet};
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::parser::Parser;

/// The result of analyzing one SQL text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlAnalysis {
    /// Union of the permissions every statement in the batch demands.
    pub permissions: PermissionSet,
    /// Number of statements in the batch.
    pub statement_count: usize,
    /// Whether the whole batch may be wrapped in BEGIN/COMMIT.
    pub transaction_safe: bool,
}

impl SqlAnalysis {
    /// Analysis of an empty batch: reading nothing still requires `read`.
    fn empty() -> Self {
        Self {
            permissions: [Permission::Read].into_iter().collect(),
            statement_count: 0,
            transaction_safe: true,
        }
    }

    /// The fail-closed analysis for input the tokenizer rejects outright.
    fn fail_closed() -> Self {
        Self {
            permissions: [Permission::Admin].into_iter().collect(),
            statement_count: 1,
            transaction_safe: false,
        }
    }
}

/// Analyzes SQL text into required permissions.
pub struct SqlAnalyzer {
    dialect: PostgreSqlDialect,
}

impl Clone for SqlAnalyzer {
    fn clone(&self) -> Self {
        Self {
            dialect: PostgreSqlDialect {},
        }
    }
}

impl Default for SqlAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl SqlAnalyzer {
    pub fn new() -> Self {
        Self {
            dialect: PostgreSqlDialect {},
        }
    }

    /// Analyze a batch of SQL.
    ///
    /// Each statement contributes its base permission plus the catalog
    /// permission of every function it calls. A statement that cannot be
    /// parsed contributes `admin` and makes the batch unwrappable.
    pub fn analyze(&self, sql: &str) -> SqlAnalysis {
        if sql.trim().is_empty() {
            return SqlAnalysis::empty();
        }

        let pieces = match split_statements(sql) {
            Ok(pieces) => pieces,
            Err(err) => {
                tracing::debug!(%err, "SQL failed to tokenize, requiring admin");
                return SqlAnalysis::fail_closed();
            }
        };
        if pieces.is_empty() {
            return SqlAnalysis::empty();
        }

        let mut permissions = PermissionSet::new();
        let mut transaction_safe = true;

        for piece in &pieces {
            match Parser::parse_sql(&self.dialect, piece) {
                Ok(statements) => {
                    for stmt in &statements {
                        let kind = StatementKind::classify(stmt, piece);
                        permissions.insert(kind.permission());
                        if !kind.transaction_safe() {
                            transaction_safe = false;
                        }
                        for name in collect_function_names(stmt) {
                            permissions.insert(function_permission(&name));
                        }
                    }
                    // A piece that tokenizes but parses to nothing is not a
                    // statement we understand.
                    if statements.is_empty() {
                        permissions.insert(Permission::Admin);
                        transaction_safe = false;
                    }
                }
                Err(err) => {
                    // Statements the grammar rejects can still be classified
                    // by their leading keywords; the rest require admin.
                    let kind = StatementKind::from_leading_keywords(piece);
                    if kind == StatementKind::Unknown {
                        tracing::debug!(%err, statement = piece.as_str(), "unparseable statement, requiring admin");
                    }
                    permissions.insert(kind.permission());
                    if !kind.transaction_safe() {
                        transaction_safe = false;
                    }
                }
            }
        }

        SqlAnalysis {
            permissions,
            statement_count: pieces.len(),
            transaction_safe,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn perms(names: &[Permission]) -> PermissionSet {
        names.iter().copied().collect()
    }

    fn analyze(sql: &str) -> SqlAnalysis {
        SqlAnalyzer::new().analyze(sql)
    }

    #[test]
    fn empty_input_counts_zero_statements() {
        let analysis = analyze("   \n\t");
        assert_eq!(analysis.statement_count, 0);
        assert_eq!(analysis.permissions, perms(&[Permission::Read]));
        assert!(analysis.transaction_safe);
    }

    #[test]
    fn simple_select_requires_read() {
        let analysis = analyze("SELECT 1");
        assert_eq!(analysis.permissions, perms(&[Permission::Read]));
        assert_eq!(analysis.statement_count, 1);
        assert!(analysis.transaction_safe);
    }

    #[test]
    fn statement_kinds_map_to_base_permissions() {
        assert_eq!(analyze("EXPLAIN SELECT 1").permissions, perms(&[Permission::Explain]));
        assert_eq!(analyze("CALL do_thing()").permissions, perms(&[Permission::Execute]));
        assert_eq!(
            analyze("INSERT INTO t (x) VALUES (1)").permissions,
            perms(&[Permission::Write])
        );
        assert_eq!(
            analyze("UPDATE t SET x = 2 WHERE id = 1").permissions,
            perms(&[Permission::Write])
        );
        assert_eq!(analyze("DELETE FROM t WHERE id = 1").permissions, perms(&[Permission::Write]));
        assert_eq!(analyze("CREATE TABLE t (x int)").permissions, perms(&[Permission::Ddl]));
        assert_eq!(analyze("DROP VIEW v").permissions, perms(&[Permission::Ddl]));
        assert_eq!(analyze("TRUNCATE t").permissions, perms(&[Permission::Ddl]));
        assert_eq!(
            analyze("GRANT SELECT ON t TO someone").permissions,
            perms(&[Permission::Ddl])
        );
        assert_eq!(analyze("CREATE ROLE analyst").permissions, perms(&[Permission::Admin]));
        assert_eq!(analyze("DROP DATABASE app").permissions, perms(&[Permission::Admin]));
    }

    #[test]
    fn unparseable_sql_fails_closed() {
        let analysis = analyze("FLURB THE WHATSIT");
        assert!(analysis.permissions.contains(Permission::Admin));
        assert!(!analysis.transaction_safe);
        assert_eq!(analysis.statement_count, 1);
    }

    #[test]
    fn unterminated_string_fails_closed() {
        let analysis = analyze("SELECT 'oops");
        assert!(analysis.permissions.contains(Permission::Admin));
        assert!(!analysis.transaction_safe);
    }

    #[test]
    fn dangerous_function_adds_admin_to_read() {
        let analysis = analyze("SELECT pg_terminate_backend(1)");
        assert_eq!(analysis.permissions, perms(&[Permission::Read, Permission::Admin]));
    }

    #[test]
    fn function_in_where_clause_is_found() {
        let analysis = analyze("SELECT * FROM pg_stat_activity WHERE pg_cancel_backend(pid)");
        assert!(analysis.permissions.contains(Permission::Admin));
    }

    #[test]
    fn function_in_order_by_is_found() {
        let analysis = analyze("SELECT x FROM t ORDER BY pg_terminate_backend(1)");
        assert!(analysis.permissions.contains(Permission::Admin));
    }

    #[test]
    fn function_in_limit_and_offset_is_found() {
        let analysis = analyze("SELECT x FROM t LIMIT pg_cancel_backend(1)");
        assert!(analysis.permissions.contains(Permission::Admin));

        let analysis = analyze("SELECT x FROM t LIMIT 10 OFFSET pg_cancel_backend(1)");
        assert!(analysis.permissions.contains(Permission::Admin));
    }

    #[test]
    fn function_in_join_condition_is_found() {
        let analysis =
            analyze("SELECT a.x FROM t a JOIN u b ON pg_terminate_backend(1) = a.x");
        assert!(analysis.permissions.contains(Permission::Admin));

        let analysis =
            analyze("SELECT a.x FROM t a LEFT JOIN u b ON pg_cancel_backend(b.pid)");
        assert!(analysis.permissions.contains(Permission::Admin));

        let analysis = analyze("SELECT a.x FROM t a INNER JOIN u b ON a.id = b.id");
        assert_eq!(analysis.permissions, perms(&[Permission::Read]));
    }

    #[test]
    fn function_in_filter_clause_is_found() {
        let analysis = analyze("SELECT count(*) FILTER (WHERE pg_cancel_backend(1)) FROM t");
        assert!(analysis.permissions.contains(Permission::Admin));
    }

    #[test]
    fn function_inside_case_and_cast_is_found() {
        let analysis =
            analyze("SELECT CASE WHEN pg_cancel_backend(1) THEN 1 ELSE 2 END FROM t");
        assert!(analysis.permissions.contains(Permission::Admin));

        let analysis = analyze("SELECT CAST(pg_terminate_backend(1) AS text)");
        assert!(analysis.permissions.contains(Permission::Admin));
    }

    #[test]
    fn schema_qualified_function_hits_the_catalog() {
        let analysis = analyze("SELECT pg_catalog.pg_terminate_backend(1)");
        assert!(analysis.permissions.contains(Permission::Admin));
    }

    #[test]
    fn harmless_functions_stay_read() {
        let analysis = analyze("SELECT lower(name), now() FROM t");
        assert_eq!(analysis.permissions, perms(&[Permission::Read]));
    }

    #[test]
    fn subquery_bodies_are_not_descended_into() {
        let analysis = analyze("SELECT (SELECT pg_terminate_backend(pid)) FROM t");
        assert_eq!(analysis.permissions, perms(&[Permission::Read]));
    }

    #[test]
    fn multi_statement_batches_union_permissions() {
        let analysis = analyze("SELECT 1; INSERT INTO t (x) VALUES (1); CREATE TABLE u (y int)");
        assert_eq!(
            analysis.permissions,
            perms(&[Permission::Read, Permission::Write, Permission::Ddl])
        );
        assert_eq!(analysis.statement_count, 3);
        assert!(analysis.transaction_safe);
    }

    #[test]
    fn sequence_and_matview_ddl_require_ddl() {
        let analysis = analyze("ALTER SEQUENCE order_id_seq RESTART WITH 100");
        assert_eq!(analysis.permissions, perms(&[Permission::Ddl]));
        assert_eq!(analysis.statement_count, 1);
        assert!(analysis.transaction_safe);

        let analysis = analyze("REFRESH MATERIALIZED VIEW daily_totals");
        assert_eq!(analysis.permissions, perms(&[Permission::Ddl]));
        assert!(analysis.transaction_safe);
    }

    #[test]
    fn sequence_ddl_in_batch_unions_with_reads() {
        let analysis = analyze("SELECT 1; ALTER SEQUENCE order_id_seq RESTART WITH 100");
        assert_eq!(analysis.permissions, perms(&[Permission::Read, Permission::Ddl]));
        assert_eq!(analysis.statement_count, 2);
        assert!(analysis.transaction_safe);
    }

    #[test]
    fn maintenance_statement_in_batch_requires_admin_and_blocks_wrapping() {
        let analysis = analyze("SELECT 1; VACUUM t");
        assert_eq!(analysis.permissions, perms(&[Permission::Read, Permission::Admin]));
        assert_eq!(analysis.statement_count, 2);
        assert!(!analysis.transaction_safe);
    }

    #[test]
    fn transaction_control_blocks_wrapping() {
        let analysis = analyze("BEGIN; SELECT 1; COMMIT");
        assert_eq!(analysis.permissions, perms(&[Permission::Read]));
        assert_eq!(analysis.statement_count, 3);
        assert!(!analysis.transaction_safe);
    }

    #[test]
    fn concurrent_index_build_blocks_wrapping() {
        let analysis = analyze("CREATE INDEX CONCURRENTLY idx ON t (x)");
        assert_eq!(analysis.permissions, perms(&[Permission::Ddl]));
        assert!(!analysis.transaction_safe);
    }

    #[test]
    fn plain_index_operations_are_wrappable() {
        let analysis = analyze("CREATE INDEX idx ON t (x); DROP INDEX idx");
        assert_eq!(analysis.permissions, perms(&[Permission::Ddl]));
        assert!(analysis.transaction_safe);
    }

    #[test]
    fn set_and_show_require_read() {
        assert_eq!(analyze("SET search_path TO public").permissions, perms(&[Permission::Read]));
        assert_eq!(analyze("SHOW server_version").permissions, perms(&[Permission::Read]));
    }

    #[test]
    fn analysis_is_deterministic() {
        let sql = "SELECT pg_cancel_backend(1); CREATE TABLE t (x int)";
        assert_eq!(analyze(sql), analyze(sql));
    }
}
