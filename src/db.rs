use crate::error::Result;
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Mutex;

/// String key-value storage with its own notion of "now".
///
/// The cache layer only ever talks to this trait, so it runs the same over
/// SQLite on disk or a plain map in tests.
pub trait KvStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
    /// Current time in epoch milliseconds.
    fn now(&self) -> i64;
}

fn system_now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// SQLite-backed store holding cache blobs across runs.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::init(Connection::open(path)?)
    }

    pub fn in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS cache (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            )",
            [],
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl KvStore for SqliteStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let value = self
            .conn()
            .query_row("SELECT value FROM cache WHERE key = ?", [key], |row| {
                row.get::<_, String>(0)
            })
            .optional()?;
        Ok(value)
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.conn().execute(
            "INSERT OR REPLACE INTO cache (key, value) VALUES (?, ?)",
            params![key, value],
        )?;
        Ok(())
    }

    fn now(&self) -> i64 {
        system_now_ms()
    }
}

enum Clock {
    System,
    Manual(AtomicI64),
}

/// In-process store. With [`MemoryStore::with_clock`] time only moves when
/// [`advance`](MemoryStore::advance) is called.
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
    clock: Clock,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            clock: Clock::System,
        }
    }

    pub fn with_clock(start_ms: i64) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            clock: Clock::Manual(AtomicI64::new(start_ms)),
        }
    }

    /// Moves a manual clock forward. No effect on the system clock.
    pub fn advance(&self, ms: i64) {
        if let Clock::Manual(now) = &self.clock {
            now.fetch_add(ms, Ordering::SeqCst);
        }
    }

    fn entries(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl KvStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.entries().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn now(&self) -> i64 {
        match &self.clock {
            Clock::System => system_now_ms(),
            Clock::Manual(now) => now.load(Ordering::SeqCst),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sqlite_store_round_trips_and_overwrites() {
        let store = SqliteStore::in_memory().unwrap();
        assert_eq!(store.get("pollution_data").unwrap(), None);

        store.set("pollution_data", "{\"a\":1}").unwrap();
        store.set("pollution_data", "{\"a\":2}").unwrap();
        assert_eq!(store.get("pollution_data").unwrap().as_deref(), Some("{\"a\":2}"));
    }

    #[test]
    fn sqlite_store_persists_to_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.db");
        {
            let store = SqliteStore::open(&path).unwrap();
            store.set("k", "v").unwrap();
        }
        let reopened = SqliteStore::open(&path).unwrap();
        assert_eq!(reopened.get("k").unwrap().as_deref(), Some("v"));
    }

    #[test]
    fn manual_clock_only_moves_when_advanced() {
        let store = MemoryStore::with_clock(1_000);
        assert_eq!(store.now(), 1_000);
        store.advance(500);
        assert_eq!(store.now(), 1_500);
    }
}
