//! Database error rendering.
//!
//! Errors are delivered to the client inside the final frame, not as
//! protocol errors. When the server reports a character position, it is
//! translated into a line number with the offending line quoted underneath.

use tokio_postgres::error::ErrorPosition;

/// Render a database error against the SQL that was executed.
pub fn format_db_error(sql: &str, err: &tokio_postgres::Error) -> String {
    let Some(db) = err.as_db_error() else {
        return err.to_string();
    };

    let position = match db.position() {
        Some(ErrorPosition::Original(pos)) => Some(*pos as usize),
        _ => None,
    };

    render(sql, db.message(), position, db.detail(), db.hint())
}

/// Pure renderer: `position` is the 1-based character offset PostgreSQL
/// reports.
pub fn render(
    sql: &str,
    message: &str,
    position: Option<usize>,
    detail: Option<&str>,
    hint: Option<&str>,
) -> String {
    let mut out = match position.and_then(|pos| locate_line(sql, pos)) {
        Some((line_number, line_text)) => format!(
            "ERROR at Line {line_number}: {message}\nLINE {line_number}: {line_text}"
        ),
        None => format!("ERROR: {message}"),
    };
    if let Some(detail) = detail {
        out.push_str(&format!("\nDETAIL: {detail}"));
    }
    if let Some(hint) = hint {
        out.push_str(&format!("\nHINT: {hint}"));
    }
    out
}

/// Translate a 1-based character offset into (line number, line text).
fn locate_line(sql: &str, position: usize) -> Option<(usize, String)> {
    if position == 0 {
        return None;
    }
    let mut line_number = 1;
    let mut line_start = 0;
    for (seen, (byte_offset, ch)) in sql.char_indices().enumerate() {
        if seen + 1 == position {
            let line_end = sql[byte_offset..]
                .find('\n')
                .map(|n| byte_offset + n)
                .unwrap_or(sql.len());
            return Some((line_number, sql[line_start..line_end].trim_end().to_string()));
        }
        if ch == '\n' {
            line_number += 1;
            line_start = byte_offset + ch.len_utf8();
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn position_is_translated_to_a_line_context() {
        let sql = "SELECT 1;\nSELECT oops\nFROM t";
        // Character 18 is inside "oops" on line 2.
        let out = render(sql, "column \"oops\" does not exist", Some(18), None, None);
        assert_eq!(
            out,
            "ERROR at Line 2: column \"oops\" does not exist\nLINE 2: SELECT oops"
        );
    }

    #[test]
    fn first_line_positions_work() {
        let out = render("SELECT oops", "column \"oops\" does not exist", Some(8), None, None);
        assert!(out.starts_with("ERROR at Line 1:"));
        assert!(out.ends_with("LINE 1: SELECT oops"));
    }

    #[test]
    fn missing_position_renders_the_message_alone() {
        let out = render("SELECT 1", "canceling statement due to user request", None, None, None);
        assert_eq!(out, "ERROR: canceling statement due to user request");
    }

    #[test]
    fn detail_and_hint_are_appended() {
        let out = render(
            "INSERT INTO t VALUES (1)",
            "duplicate key value violates unique constraint \"t_pkey\"",
            None,
            Some("Key (id)=(1) already exists."),
            Some("Use ON CONFLICT."),
        );
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[1].starts_with("DETAIL: "));
        assert!(lines[2].starts_with("HINT: "));
    }

    #[test]
    fn out_of_range_positions_degrade_gracefully() {
        let out = render("SELECT 1", "weird", Some(500), None, None);
        assert_eq!(out, "ERROR: weird");
    }
}
