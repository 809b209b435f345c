//! The query broker.
//!
//! Ties the whole pipeline together: resolve the principal, analyze the SQL,
//! check IAM, open a tagged client, stream frames back (the first carries
//! only the backend pid), audit the outcome, and release everything on every
//! exit path. Cancellation runs through a separate client and the shared
//! active-query table.

pub mod active;
pub mod broker;
pub mod compose;
pub mod format;
pub mod frame;

pub use active::{ActiveQueryEntry, ActiveQueryGuard, ActiveQueryTable};
pub use broker::{CancelResult, QueryBroker};
pub use frame::{ColumnMeta, Frame};
