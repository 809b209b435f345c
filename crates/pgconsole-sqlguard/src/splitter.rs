//! Batch splitting.
//!
//! The analyzer works statement by statement, so a batch has to be split on
//! top-level semicolons first. The sqlparser tokenizer does the heavy
//! lifting: string literals, dollar-quoted bodies and comments are single
//! tokens and can never leak a separator.

use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::tokenizer::{Token, Tokenizer, Whitespace};

/// Error for input the tokenizer itself rejects (unterminated strings and
/// the like). Callers treat this as an unparseable batch.
#[derive(Debug, thiserror::Error)]
#[error("cannot tokenize SQL: {0}")]
pub struct SplitError(String);

/// Split raw SQL into individual statement texts.
///
/// Pieces that hold only whitespace or comments are dropped; the returned
/// texts are trimmed and carry no trailing semicolon.
pub fn split_statements(sql: &str) -> Result<Vec<String>, SplitError> {
    let dialect = PostgreSqlDialect {};
    let tokens = Tokenizer::new(&dialect, sql)
        .tokenize()
        .map_err(|e| SplitError(e.to_string()))?;

    let mut pieces = Vec::new();
    let mut current = String::new();
    let mut substantive = false;

    for token in tokens {
        if token == Token::SemiColon {
            if substantive {
                pieces.push(current.trim().to_string());
            }
            current.clear();
            substantive = false;
            continue;
        }
        // Comments count as whitespace when deciding whether a piece holds
        // an actual statement.
        if !matches!(token, Token::Whitespace(_)) {
            substantive = true;
        }
        current.push_str(&token_text(&token));
    }
    if substantive {
        pieces.push(current.trim().to_string());
    }

    Ok(pieces)
}

fn token_text(token: &Token) -> String {
    match token {
        // Normalize comment-only noise to plain whitespace so a trailing
        // comment cannot glue itself onto the next word.
        Token::Whitespace(Whitespace::SingleLineComment { .. })
        | Token::Whitespace(Whitespace::MultiLineComment(_)) => " ".to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_on_top_level_semicolons() {
        let pieces = split_statements("SELECT 1; SELECT 2").unwrap();
        assert_eq!(pieces, vec!["SELECT 1", "SELECT 2"]);
    }

    #[test]
    fn semicolon_inside_string_is_not_a_separator() {
        let pieces = split_statements("SELECT 'a;b'; SELECT 2").unwrap();
        assert_eq!(pieces.len(), 2);
        assert!(pieces[0].contains("a;b"));
    }

    #[test]
    fn dollar_quoted_bodies_stay_whole() {
        let sql = "CREATE FUNCTION f() RETURNS int AS $$ SELECT 1; $$ LANGUAGE sql";
        let pieces = split_statements(sql).unwrap();
        assert_eq!(pieces.len(), 1);
    }

    #[test]
    fn comment_only_pieces_are_dropped() {
        let pieces = split_statements("-- nothing here\n;SELECT 1;").unwrap();
        assert_eq!(pieces.len(), 1);
        assert_eq!(pieces[0], "SELECT 1");
    }

    #[test]
    fn empty_input_yields_no_pieces() {
        assert!(split_statements("").unwrap().is_empty());
        assert!(split_statements("  \n\t ").unwrap().is_empty());
        assert!(split_statements(";;;").unwrap().is_empty());
    }

    #[test]
    fn unterminated_string_is_an_error() {
        assert!(split_statements("SELECT 'oops").is_err());
    }
}
