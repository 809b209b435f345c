//! Per-connection server facts.
//!
//! Populated on the first successful probe, cleared only by restart.
//! Insert-mostly: writers win last and readers may observe either snapshot.

use crate::client::PgClient;
use crate::error::AdapterError;
use std::collections::HashMap;
use std::sync::RwLock;

/// Cached facts about one configured connection's server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionInfo {
    pub server_major_version: i32,
}

/// Process-wide map from connection id to server facts.
#[derive(Default)]
pub struct ConnectionInfoCache {
    inner: RwLock<HashMap<String, ConnectionInfo>>,
}

impl ConnectionInfoCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, connection_id: &str) -> Option<ConnectionInfo> {
        self.inner
            .read()
            .ok()
            .and_then(|map| map.get(connection_id).copied())
    }

    pub fn insert(&self, connection_id: &str, info: ConnectionInfo) {
        if let Ok(mut map) = self.inner.write() {
            map.insert(connection_id.to_string(), info);
        }
    }

    /// Probe the server version over `client` and cache it.
    pub async fn probe(
        &self,
        connection_id: &str,
        client: &PgClient,
    ) -> Result<ConnectionInfo, AdapterError> {
        let row = client
            .query_one("SELECT current_setting('server_version_num')", &[])
            .await?;
        let version_num: String = row.get(0);
        let major = version_num
            .parse::<i32>()
            .map(|n| n / 10000)
            .unwrap_or_default();
        let info = ConnectionInfo {
            server_major_version: major,
        };
        self.insert(connection_id, info);
        Ok(info)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_is_insert_mostly() {
        let cache = ConnectionInfoCache::new();
        assert_eq!(cache.get("prod"), None);
        cache.insert("prod", ConnectionInfo { server_major_version: 16 });
        assert_eq!(
            cache.get("prod"),
            Some(ConnectionInfo { server_major_version: 16 })
        );
        cache.insert("prod", ConnectionInfo { server_major_version: 17 });
        assert_eq!(cache.get("prod").unwrap().server_major_version, 17);
    }
}
