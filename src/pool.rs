//! Idle connection pool for HTTP/1.1 keep-alive reuse.
//!
//! One pool is shared by all requests of a session. Connections are
//! parked after a fully drained, reusable response and handed back out
//! for the next request to the same host/port/scheme.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Pool key identifying a unique host/port/scheme combination.
#[derive(Debug, Clone, Hash, Eq, PartialEq)]
pub struct PoolKey {
    pub host: String,
    pub port: u16,
    pub is_https: bool,
}

impl PoolKey {
    pub fn new(host: String, port: u16, is_https: bool) -> Self {
        Self {
            host,
            port,
            is_https,
        }
    }
}

/// Connection-pool options, configured once at session construction.
#[derive(Debug, Clone)]
pub struct AgentOptions {
    /// Maximum parked connections per pool key.
    pub max_idle_per_host: usize,
    /// Parked connections older than this are dropped.
    pub idle_timeout: Duration,
    /// Deadline for TCP connect plus TLS handshake.
    pub connect_timeout: Duration,
}

impl Default for AgentOptions {
    fn default() -> Self {
        Self {
            max_idle_per_host: 6,
            idle_timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

struct Idle<T> {
    conn: T,
    parked_at: Instant,
}

/// Idle-connection pool, generic over the pooled stream type.
pub struct ConnectionPool<T> {
    entries: Mutex<HashMap<PoolKey, Vec<Idle<T>>>>,
    max_idle_per_host: usize,
    idle_timeout: Duration,
}

impl<T> ConnectionPool<T> {
    pub fn new(max_idle_per_host: usize, idle_timeout: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            max_idle_per_host,
            idle_timeout,
        }
    }

    /// Take a parked connection for `key`, dropping any that idled out.
    pub fn take(&self, key: &PoolKey) -> Option<T> {
        let mut entries = self.entries.lock().expect("connection pool mutex poisoned");
        let list = entries.get_mut(key)?;
        list.retain(|idle| idle.parked_at.elapsed() < self.idle_timeout);
        let idle = list.pop()?;
        tracing::debug!(host = %key.host, port = key.port, "reusing pooled connection");
        Some(idle.conn)
    }

    /// Park a reusable connection. Dropped silently when the per-host
    /// cap is reached.
    pub fn park(&self, key: PoolKey, conn: T) {
        let mut entries = self.entries.lock().expect("connection pool mutex poisoned");
        let list = entries.entry(key).or_default();
        if list.len() < self.max_idle_per_host {
            list.push(Idle {
                conn,
                parked_at: Instant::now(),
            });
        }
    }

    /// Drop every parked connection.
    pub fn clear(&self) {
        let mut entries = self.entries.lock().expect("connection pool mutex poisoned");
        entries.clear();
    }

    /// Current pool statistics (for debugging/monitoring).
    pub fn stats(&self) -> PoolStats {
        let entries = self.entries.lock().expect("connection pool mutex poisoned");
        PoolStats {
            hosts: entries.len(),
            idle_connections: entries.values().map(Vec::len).sum(),
        }
    }
}

/// Pool statistics for monitoring.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolStats {
    pub hosts: usize,
    pub idle_connections: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> PoolKey {
        PoolKey::new("example.com".to_string(), 443, true)
    }

    #[test]
    fn test_pool_key_equality() {
        assert_eq!(key(), key());
        assert_ne!(key(), PoolKey::new("example.com".to_string(), 80, false));
    }

    #[test]
    fn test_take_returns_parked_connection() {
        let pool = ConnectionPool::new(6, Duration::from_secs(30));
        assert!(pool.take(&key()).is_none());
        pool.park(key(), 7u32);
        assert_eq!(pool.take(&key()), Some(7));
        assert!(pool.take(&key()).is_none());
    }

    #[test]
    fn test_per_host_cap() {
        let pool = ConnectionPool::new(2, Duration::from_secs(30));
        pool.park(key(), 1u32);
        pool.park(key(), 2u32);
        pool.park(key(), 3u32);
        assert_eq!(pool.stats().idle_connections, 2);
    }

    #[test]
    fn test_idle_timeout_drops_connections() {
        let pool = ConnectionPool::new(6, Duration::from_millis(0));
        pool.park(key(), 1u32);
        assert!(pool.take(&key()).is_none());
    }

    #[test]
    fn test_clear() {
        let pool = ConnectionPool::new(6, Duration::from_secs(30));
        pool.park(key(), 1u32);
        pool.clear();
        assert_eq!(
            pool.stats(),
            PoolStats {
                hosts: 0,
                idle_connections: 0
            }
        );
    }
}
