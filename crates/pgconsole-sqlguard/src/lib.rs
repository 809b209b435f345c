//! SQL statement analysis.
//!
//! Given raw SQL, this crate determines the set of permissions required to
//! execute it, how many statements it contains, and whether the whole batch
//! is safe to wrap in a transaction. The analysis fails closed: anything the
//! parser cannot understand requires `admin` and is never wrapped.

pub mod analyzer;
pub mod functions;
pub mod splitter;
pub mod statements;

pub use analyzer::{SqlAnalysis, SqlAnalyzer};
pub use statements::StatementKind;
