//! Final SQL composition.

use pgconsole_adapter_pg::quote_ident;
use pgconsole_sqlguard::SqlAnalysis;

/// Wrap a multi-statement batch in a transaction when every statement
/// tolerates it; otherwise run the text unchanged.
pub fn compose_sql(sql: &str, analysis: &SqlAnalysis) -> String {
    if analysis.statement_count > 1 && analysis.transaction_safe {
        format!("BEGIN;\n{sql}\nCOMMIT;")
    } else {
        sql.to_string()
    }
}

/// Build the `SET search_path` statement with quoted identifiers.
pub fn search_path_statement(search_path: &str) -> String {
    let quoted: Vec<String> = search_path
        .split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(quote_ident)
        .collect();
    format!("SET search_path TO {}", quoted.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pgconsole_sqlguard::SqlAnalyzer;
    use pretty_assertions::assert_eq;

    fn compose(sql: &str) -> String {
        let analysis = SqlAnalyzer::new().analyze(sql);
        compose_sql(sql, &analysis)
    }

    #[test]
    fn single_statements_run_unchanged() {
        assert_eq!(compose("SELECT 1"), "SELECT 1");
    }

    #[test]
    fn safe_batches_get_wrapped() {
        let composed = compose("SELECT 1; SELECT 2");
        assert!(composed.starts_with("BEGIN;\n"));
        assert!(composed.ends_with("\nCOMMIT;"));
        assert!(composed.contains("SELECT 1; SELECT 2"));
    }

    #[test]
    fn batches_with_unsafe_statements_are_not_wrapped() {
        let sql = "SELECT 1; VACUUM t";
        assert_eq!(compose(sql), sql);

        let sql = "SELECT 1; CREATE INDEX CONCURRENTLY i ON t (x)";
        assert_eq!(compose(sql), sql);

        let sql = "BEGIN; SELECT 1; COMMIT";
        assert_eq!(compose(sql), sql);
    }

    #[test]
    fn search_path_identifiers_are_quoted() {
        assert_eq!(search_path_statement("public"), "SET search_path TO \"public\"");
        assert_eq!(
            search_path_statement("app, public"),
            "SET search_path TO \"app\", \"public\""
        );
        assert_eq!(
            search_path_statement("we\"ird"),
            "SET search_path TO \"we\"\"ird\""
        );
    }
}
