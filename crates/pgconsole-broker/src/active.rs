//! The active-query table.
//!
//! Correlates client-supplied query ids with database backend pids so a
//! second request can cancel a running statement. The executing task owns
//! its entry through an RAII guard; cancellation tasks only read. Stale
//! reads are fine: the follow-up `pg_cancel_backend` is a no-op on a
//! backend that already finished.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// What a cancellation needs to know about a running query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveQueryEntry {
    pub backend_pid: i32,
    pub connection_id: String,
    pub email: String,
}

/// Process-wide map from query id to running backend.
#[derive(Default)]
pub struct ActiveQueryTable {
    inner: RwLock<HashMap<String, ActiveQueryEntry>>,
}

impl ActiveQueryTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, query_id: &str) -> Option<ActiveQueryEntry> {
        self.inner.read().ok()?.get(query_id).cloned()
    }

    /// Register a running query; the returned guard removes the entry when
    /// dropped, on every exit path.
    pub fn register(
        self: &Arc<Self>,
        query_id: impl Into<String>,
        entry: ActiveQueryEntry,
    ) -> ActiveQueryGuard {
        let query_id = query_id.into();
        if let Ok(mut map) = self.inner.write() {
            map.insert(query_id.clone(), entry);
        }
        ActiveQueryGuard {
            table: Arc::clone(self),
            query_id,
        }
    }

    fn remove(&self, query_id: &str) {
        if let Ok(mut map) = self.inner.write() {
            map.remove(query_id);
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.inner.read().map(|m| m.len()).unwrap_or_default()
    }
}

/// Removes the registered entry on drop.
pub struct ActiveQueryGuard {
    table: Arc<ActiveQueryTable>,
    query_id: String,
}

impl Drop for ActiveQueryGuard {
    fn drop(&mut self) {
        self.table.remove(&self.query_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(pid: i32, email: &str) -> ActiveQueryEntry {
        ActiveQueryEntry {
            backend_pid: pid,
            connection_id: "prod".to_string(),
            email: email.to_string(),
        }
    }

    #[test]
    fn registered_entries_are_readable_by_other_tasks() {
        let table = Arc::new(ActiveQueryTable::new());
        let _guard = table.register("q1", entry(42, "alice@example.com"));
        let found = table.get("q1").unwrap();
        assert_eq!(found.backend_pid, 42);
        assert_eq!(found.email, "alice@example.com");
        assert_eq!(table.get("q2"), None);
    }

    #[test]
    fn dropping_the_guard_removes_the_entry() {
        let table = Arc::new(ActiveQueryTable::new());
        {
            let _guard = table.register("q1", entry(42, "alice@example.com"));
            assert_eq!(table.len(), 1);
        }
        assert_eq!(table.len(), 0);
        assert_eq!(table.get("q1"), None);
    }

    #[test]
    fn entries_are_independent() {
        let table = Arc::new(ActiveQueryTable::new());
        let _g1 = table.register("q1", entry(1, "alice@example.com"));
        let g2 = table.register("q2", entry(2, "bob@example.com"));
        drop(g2);
        assert!(table.get("q1").is_some());
        assert!(table.get("q2").is_none());
    }
}
