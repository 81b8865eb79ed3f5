//! Bounded pool of SQLite handles.
//!
//! The pool is owned by one [`QueryEngine`](crate::QueryEngine); nothing here
//! is global. Handles are checked with a trivial round-trip before reuse, and a
//! handle that failed or was interrupted mid-use is closed by [`discard`]
//! rather than returned.
//!
//! [`discard`]: ConnectionPool::discard

use std::path::PathBuf;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use rusqlite::Connection;
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::{Error, Result};

pub(crate) const BUSY_TIMEOUT: Duration = Duration::from_secs(10);

const CONNECTION_PRAGMAS: &str = "
    PRAGMA journal_mode = WAL;
    PRAGMA synchronous = NORMAL;
    PRAGMA foreign_keys = ON;
";

/// Snapshot of pool occupancy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    pub idle: usize,
    pub capacity: usize,
    pub created: usize,
}

pub struct ConnectionPool {
    path: PathBuf,
    capacity: usize,
    idle: Mutex<Vec<Connection>>,
    created: AtomicUsize,
}

impl ConnectionPool {
    pub fn new(path: impl Into<PathBuf>, capacity: usize) -> Self {
        Self {
            path: path.into(),
            capacity: capacity.max(1),
            idle: Mutex::new(Vec::with_capacity(capacity)),
            created: AtomicUsize::new(0),
        }
    }

    /// Take a live handle, reusing an idle one when it passes a liveness check.
    pub fn acquire(&self) -> Result<Connection> {
        loop {
            let candidate = self.lock()?.pop();
            let Some(conn) = candidate else {
                return self.open_connection();
            };

            match conn.execute_batch("SELECT 1") {
                Ok(()) => {
                    debug!("Reusing pooled connection");
                    return Ok(conn);
                }
                Err(e) => {
                    warn!("Pooled connection failed liveness check, closing: {}", e);
                    close(conn);
                }
            }
        }
    }

    /// Return a healthy handle. Closed instead when the pool is full.
    pub fn release(&self, conn: Connection) {
        if !conn.is_autocommit() {
            // An open transaction means the caller did not finish cleanly.
            self.discard(conn);
            return;
        }

        let overflow = match self.lock() {
            Ok(mut idle) if idle.len() < self.capacity => {
                idle.push(conn);
                None
            }
            _ => Some(conn),
        };

        if let Some(conn) = overflow {
            debug!("Pool at capacity, closing connection");
            close(conn);
        }
    }

    /// Roll back and close a handle that errored or timed out.
    pub fn discard(&self, conn: Connection) {
        if !conn.is_autocommit() {
            let _ = conn.execute_batch("ROLLBACK");
        }
        debug!("Discarding connection");
        close(conn);
    }

    /// Close every idle handle.
    pub fn close_all(&self) {
        let drained: Vec<Connection> = match self.idle.lock() {
            Ok(mut idle) => idle.drain(..).collect(),
            Err(poisoned) => poisoned.into_inner().drain(..).collect(),
        };
        let count = drained.len();
        drained.into_iter().for_each(close);
        if count > 0 {
            debug!("Closed {} pooled connections", count);
        }
    }

    pub fn stats(&self) -> PoolStats {
        let idle = match self.idle.lock() {
            Ok(idle) => idle.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        };
        PoolStats {
            idle,
            capacity: self.capacity,
            created: self.created.load(Ordering::SeqCst),
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Vec<Connection>>> {
        self.idle
            .lock()
            .map_err(|_| Error::store("Connection pool lock poisoned"))
    }

    fn open_connection(&self) -> Result<Connection> {
        let conn = Connection::open(&self.path).map_err(|e| {
            Error::store(format!(
                "Failed to open database at {}: {}",
                self.path.display(),
                e
            ))
        })?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.execute_batch(CONNECTION_PRAGMAS)?;

        let created = self.created.fetch_add(1, Ordering::SeqCst) + 1;
        debug!("Opened connection #{} to {}", created, self.path.display());
        Ok(conn)
    }
}

impl Drop for ConnectionPool {
    fn drop(&mut self) {
        self.close_all();
    }
}

fn close(conn: Connection) {
    if let Err((_, e)) = conn.close() {
        warn!("Error closing connection: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn pool(capacity: usize) -> (TempDir, ConnectionPool) {
        let dir = TempDir::new().unwrap();
        let pool = ConnectionPool::new(dir.path().join("index.db"), capacity);
        (dir, pool)
    }

    #[test]
    fn test_acquire_reuses_released_handle() {
        let (_dir, pool) = pool(5);

        let conn = pool.acquire().unwrap();
        pool.release(conn);
        assert_eq!(pool.stats().idle, 1);

        let _conn = pool.acquire().unwrap();
        let stats = pool.stats();
        assert_eq!(stats.created, 1);
        assert_eq!(stats.idle, 0);
    }

    #[test]
    fn test_pool_never_exceeds_capacity() {
        let (_dir, pool) = pool(5);

        let handles: Vec<Connection> = (0..7).map(|_| pool.acquire().unwrap()).collect();
        assert_eq!(pool.stats().created, 7);

        for conn in handles {
            pool.release(conn);
        }

        let stats = pool.stats();
        assert_eq!(stats.idle, 5);
        assert_eq!(stats.capacity, 5);
    }

    #[test]
    fn test_discarded_handle_is_replaced() {
        let (_dir, pool) = pool(5);

        let conn = pool.acquire().unwrap();
        assert!(conn.execute_batch("SELECT * FROM missing_table").is_err());
        pool.discard(conn);
        assert_eq!(pool.stats().idle, 0);

        let _fresh = pool.acquire().unwrap();
        assert_eq!(pool.stats().created, 2);
    }

    #[test]
    fn test_release_with_open_transaction_discards() {
        let (_dir, pool) = pool(5);

        let conn = pool.acquire().unwrap();
        conn.execute_batch("BEGIN").unwrap();
        pool.release(conn);

        assert_eq!(pool.stats().idle, 0);
    }

    #[test]
    fn test_connection_pragmas() {
        let (_dir, pool) = pool(1);
        let conn = pool.acquire().unwrap();

        let mode: String = conn
            .query_row("PRAGMA journal_mode", [], |row| row.get(0))
            .unwrap();
        assert_eq!(mode.to_lowercase(), "wal");

        let fk: i64 = conn
            .query_row("PRAGMA foreign_keys", [], |row| row.get(0))
            .unwrap();
        assert_eq!(fk, 1);
    }

    #[test]
    fn test_close_all_empties_pool() {
        let (_dir, pool) = pool(3);
        let a = pool.acquire().unwrap();
        let b = pool.acquire().unwrap();
        pool.release(a);
        pool.release(b);
        assert_eq!(pool.stats().idle, 2);

        pool.close_all();
        assert_eq!(pool.stats().idle, 0);
    }
}
