//! # Log Store
//!
//! Audit log of proxied requests, backing the admin API (§4.10 of the
//! design doc). Two backends share one trait: an in-memory circular
//! buffer (the default) and a SQLite table with optional retention.
//! Both support best-effort subscription for the admin UI's
//! Server-Sent Events stream — a full subscriber channel drops the
//! entry for that subscriber rather than blocking the writer, mirroring
//! the original tool's non-blocking broadcast.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tunnel_protocol::Headers;

use crate::error::LogStoreError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub id: String,
    pub subdomain: String,
    pub method: String,
    pub path: String,
    pub status: u16,
    #[serde(default)]
    pub headers: Headers,
    #[serde(default)]
    pub body: String,
    /// Unix timestamp, seconds.
    pub timestamp: i64,
}

pub fn now_unix() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// Shared behavior across log store backends.
pub trait LogStore: Send + Sync {
    fn append(&self, entry: LogEntry);
    fn all(&self) -> Vec<LogEntry>;
    fn get(&self, id: &str) -> Option<LogEntry>;
    /// Subscribes to newly appended entries. The returned receiver lags
    /// (drops old entries) rather than blocking the writer if the
    /// subscriber falls behind.
    fn subscribe(&self) -> broadcast::Receiver<LogEntry>;
    /// Lets `main.rs` downcast to `SqliteLogStore` to schedule the
    /// retention purge task without widening this trait for it.
    fn as_any(&self) -> &dyn std::any::Any;
}

/// Fixed-capacity circular buffer, safe for concurrent use. Preserves
/// exactly the last `capacity` entries, oldest-to-newest.
pub struct MemoryLogStore {
    capacity: usize,
    buf: Mutex<VecDeque<LogEntry>>,
    broadcaster: broadcast::Sender<LogEntry>,
}

impl MemoryLogStore {
    pub fn new(capacity: usize) -> Self {
        let (broadcaster, _) = broadcast::channel(256);
        Self {
            capacity: capacity.max(1),
            buf: Mutex::new(VecDeque::with_capacity(capacity)),
            broadcaster,
        }
    }
}

impl LogStore for MemoryLogStore {
    fn append(&self, entry: LogEntry) {
        let mut buf = self.buf.lock().expect("log store mutex poisoned");
        if buf.len() == self.capacity {
            buf.pop_front();
        }
        buf.push_back(entry.clone());
        drop(buf);
        let _ = self.broadcaster.send(entry);
    }

    fn all(&self) -> Vec<LogEntry> {
        self.buf.lock().expect("log store mutex poisoned").iter().cloned().collect()
    }

    fn get(&self, id: &str) -> Option<LogEntry> {
        self.buf
            .lock()
            .expect("log store mutex poisoned")
            .iter()
            .find(|e| e.id == id)
            .cloned()
    }

    fn subscribe(&self) -> broadcast::Receiver<LogEntry> {
        self.broadcaster.subscribe()
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

/// SQLite-backed store. Retention is enforced by a periodic purge
/// (see [`SqliteLogStore::purge_older_than`]), not on every `append`.
pub struct SqliteLogStore {
    conn: Mutex<Connection>,
    broadcaster: broadcast::Sender<LogEntry>,
}

impl SqliteLogStore {
    pub fn open(path: &std::path::Path) -> Result<Self, LogStoreError> {
        let conn = Connection::open(path)?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS logs (
                id TEXT PRIMARY KEY,
                subdomain TEXT NOT NULL,
                method TEXT NOT NULL,
                path TEXT NOT NULL,
                status INTEGER NOT NULL,
                headers TEXT NOT NULL,
                body TEXT NOT NULL,
                ts INTEGER NOT NULL
            )",
            [],
        )?;
        let (broadcaster, _) = broadcast::channel(256);
        Ok(Self {
            conn: Mutex::new(conn),
            broadcaster,
        })
    }

    /// Deletes every row older than `retention_days` days, measured
    /// against the current time. A `retention_days` of 0 means
    /// "forever" and this is a no-op — callers should not schedule the
    /// purge task at all in that case, but the method stays safe
    /// either way.
    pub fn purge_older_than(&self, retention_days: u32) -> Result<usize, LogStoreError> {
        if retention_days == 0 {
            return Ok(0);
        }
        let cutoff = now_unix() - (retention_days as i64) * 86_400;
        let conn = self.conn.lock().expect("sqlite mutex poisoned");
        let deleted = conn.execute("DELETE FROM logs WHERE ts < ?1", [cutoff])?;
        Ok(deleted)
    }
}

impl LogStore for SqliteLogStore {
    fn append(&self, entry: LogEntry) {
        let headers_json = serde_json::to_string(&entry.headers).unwrap_or_default();
        let conn = self.conn.lock().expect("sqlite mutex poisoned");
        let _ = conn.execute(
            "INSERT OR REPLACE INTO logs (id, subdomain, method, path, status, headers, body, ts)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            rusqlite::params![
                entry.id,
                entry.subdomain,
                entry.method,
                entry.path,
                entry.status,
                headers_json,
                entry.body,
                entry.timestamp,
            ],
        );
        drop(conn);
        let _ = self.broadcaster.send(entry);
    }

    fn all(&self) -> Vec<LogEntry> {
        let conn = self.conn.lock().expect("sqlite mutex poisoned");
        let mut stmt = match conn.prepare(
            "SELECT id, subdomain, method, path, status, headers, body, ts
             FROM logs ORDER BY ts ASC",
        ) {
            Ok(s) => s,
            Err(_) => return Vec::new(),
        };
        let rows = stmt.query_map([], |row| {
            let headers_json: String = row.get(5)?;
            Ok(LogEntry {
                id: row.get(0)?,
                subdomain: row.get(1)?,
                method: row.get(2)?,
                path: row.get(3)?,
                status: row.get(4)?,
                headers: serde_json::from_str(&headers_json).unwrap_or_default(),
                body: row.get(6)?,
                timestamp: row.get(7)?,
            })
        });
        match rows {
            Ok(iter) => iter.filter_map(Result::ok).collect(),
            Err(_) => Vec::new(),
        }
    }

    fn get(&self, id: &str) -> Option<LogEntry> {
        self.all().into_iter().find(|e| e.id == id)
    }

    fn subscribe(&self) -> broadcast::Receiver<LogEntry> {
        self.broadcaster.subscribe()
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: &str) -> LogEntry {
        LogEntry {
            id: id.to_string(),
            subdomain: "myapp".to_string(),
            method: "GET".to_string(),
            path: "/".to_string(),
            status: 200,
            headers: Headers::new(),
            body: String::new(),
            timestamp: now_unix(),
        }
    }

    #[test]
    fn memory_store_preserves_last_n_entries() {
        let store = MemoryLogStore::new(3);
        store.append(entry("1"));
        store.append(entry("2"));
        store.append(entry("3"));
        assert_eq!(store.all().len(), 3);

        store.append(entry("4"));
        let all = store.all();
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].id, "2");
        assert_eq!(all[2].id, "4");
    }

    #[test]
    fn memory_store_get_finds_by_id() {
        let store = MemoryLogStore::new(10);
        store.append(entry("abc"));
        assert!(store.get("abc").is_some());
        assert!(store.get("missing").is_none());
    }

    #[tokio::test]
    async fn memory_store_subscribers_receive_appended_entries() {
        let store = MemoryLogStore::new(10);
        let mut rx = store.subscribe();
        store.append(entry("1"));
        let received = rx.recv().await.unwrap();
        assert_eq!(received.id, "1");
    }

    #[test]
    fn sqlite_store_round_trips_entries() {
        let dir = std::env::temp_dir().join(format!("tunnel-server-test-{}", uuid::Uuid::new_v4()));
        let store = SqliteLogStore::open(&dir).unwrap();
        store.append(entry("1"));
        store.append(entry("2"));
        let all = store.all();
        assert_eq!(all.len(), 2);
        let _ = std::fs::remove_file(&dir);
    }

    #[test]
    fn sqlite_store_purge_removes_only_old_rows() {
        let dir = std::env::temp_dir().join(format!("tunnel-server-test-{}", uuid::Uuid::new_v4()));
        let store = SqliteLogStore::open(&dir).unwrap();
        let mut old = entry("old");
        old.timestamp = now_unix() - 2 * 86_400;
        store.append(old);
        store.append(entry("new"));

        let deleted = store.purge_older_than(1).unwrap();
        assert_eq!(deleted, 1);
        let remaining = store.all();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, "new");
        let _ = std::fs::remove_file(&dir);
    }
}
