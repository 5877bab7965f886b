//! SQLite-backed store.

use std::path::Path;

use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};

use super::{
    CacheEntry, CacheStore, ProfileStore, SourceStore, StoreError, Subscriber, SubscriberStore,
};
use crate::subscription::ProxyNode;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS proxy_cache (
    url        TEXT PRIMARY KEY,
    nodes      TEXT NOT NULL,
    updated_at INTEGER NOT NULL
);
CREATE TABLE IF NOT EXISTS meta (
    key   TEXT PRIMARY KEY,
    value INTEGER NOT NULL
);
CREATE TABLE IF NOT EXISTS subscribe_urls (
    position INTEGER PRIMARY KEY,
    url      TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS profiles (
    name    TEXT PRIMARY KEY,
    content TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS subscribers (
    username TEXT PRIMARY KEY,
    profile  TEXT NOT NULL
);
";

const LAST_RUN_KEY: &str = "proxy_cache:last_run_at";

/// Thread-safe SQLite store implementing every store trait.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) the database at `path`, creating parent directories.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        Self::init(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

fn require_key(key: &str) -> Result<(), StoreError> {
    if key.is_empty() {
        return Err(StoreError::EmptyKey);
    }
    Ok(())
}

// ── cache ───────────────────────────────────────────────────────

impl CacheStore for SqliteStore {
    fn get_entry(&self, url: &str) -> Result<Option<CacheEntry>, StoreError> {
        require_key(url)?;
        let row: Option<(String, i64)> = self
            .conn
            .lock()
            .query_row(
                "SELECT nodes, updated_at FROM proxy_cache WHERE url = ?1",
                params![url],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        match row {
            Some((nodes, updated_at)) => {
                let nodes: Vec<ProxyNode> = serde_json::from_str(&nodes)?;
                Ok(Some(CacheEntry { nodes, updated_at }))
            }
            None => Ok(None),
        }
    }

    fn put_entry(&self, url: &str, entry: &CacheEntry) -> Result<(), StoreError> {
        require_key(url)?;
        let nodes = serde_json::to_string(&entry.nodes)?;
        self.conn.lock().execute(
            "INSERT INTO proxy_cache (url, nodes, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(url) DO UPDATE SET nodes = excluded.nodes, updated_at = excluded.updated_at",
            params![url, nodes, entry.updated_at],
        )?;
        Ok(())
    }

    fn last_run_at(&self) -> Result<i64, StoreError> {
        let value = self
            .conn
            .lock()
            .query_row(
                "SELECT value FROM meta WHERE key = ?1",
                params![LAST_RUN_KEY],
                |row| row.get::<_, i64>(0),
            )
            .optional()?;
        Ok(value.unwrap_or(0))
    }

    fn set_last_run_at(&self, at: i64) -> Result<(), StoreError> {
        self.conn.lock().execute(
            "INSERT INTO meta (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![LAST_RUN_KEY, at],
        )?;
        Ok(())
    }
}

// ── sources ─────────────────────────────────────────────────────

impl SourceStore for SqliteStore {
    fn configured_sources(&self) -> Result<Vec<String>, StoreError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare("SELECT url FROM subscribe_urls ORDER BY position")?;
        let urls = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(urls)
    }

    fn save_sources(&self, urls: &[String]) -> Result<(), StoreError> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM subscribe_urls", [])?;
        {
            let mut stmt = tx.prepare("INSERT INTO subscribe_urls (position, url) VALUES (?1, ?2)")?;
            let kept = urls.iter().map(|u| u.trim()).filter(|u| !u.is_empty());
            for (position, url) in kept.enumerate() {
                stmt.execute(params![position as i64, url])?;
            }
        }
        tx.commit()?;
        Ok(())
    }
}

// ── profiles ────────────────────────────────────────────────────

impl ProfileStore for SqliteStore {
    fn get_profile(&self, name: &str) -> Result<Option<String>, StoreError> {
        require_key(name)?;
        let content = self
            .conn
            .lock()
            .query_row(
                "SELECT content FROM profiles WHERE name = ?1",
                params![name],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(content)
    }

    fn put_profile(&self, name: &str, content: &str) -> Result<(), StoreError> {
        require_key(name)?;
        self.conn.lock().execute(
            "INSERT INTO profiles (name, content) VALUES (?1, ?2)
             ON CONFLICT(name) DO UPDATE SET content = excluded.content",
            params![name, content],
        )?;
        Ok(())
    }

    fn insert_profile(&self, name: &str, content: &str) -> Result<bool, StoreError> {
        require_key(name)?;
        let inserted = self.conn.lock().execute(
            "INSERT OR IGNORE INTO profiles (name, content) VALUES (?1, ?2)",
            params![name, content],
        )?;
        Ok(inserted == 1)
    }

    fn profile_names(&self) -> Result<Vec<String>, StoreError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare("SELECT name FROM profiles ORDER BY name")?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(names)
    }
}

// ── subscribers ─────────────────────────────────────────────────

impl SubscriberStore for SqliteStore {
    fn subscriber_profile(&self, username: &str) -> Result<Option<String>, StoreError> {
        require_key(username)?;
        let profile = self
            .conn
            .lock()
            .query_row(
                "SELECT profile FROM subscribers WHERE username = ?1",
                params![username],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(profile)
    }

    fn insert_subscriber(&self, username: &str, profile: &str) -> Result<bool, StoreError> {
        require_key(username)?;
        let inserted = self.conn.lock().execute(
            "INSERT OR IGNORE INTO subscribers (username, profile) VALUES (?1, ?2)",
            params![username, profile],
        )?;
        Ok(inserted == 1)
    }

    fn set_subscriber_profile(&self, username: &str, profile: &str) -> Result<bool, StoreError> {
        require_key(username)?;
        let updated = self.conn.lock().execute(
            "UPDATE subscribers SET profile = ?2 WHERE username = ?1",
            params![username, profile],
        )?;
        Ok(updated == 1)
    }

    fn delete_subscriber(&self, username: &str) -> Result<bool, StoreError> {
        require_key(username)?;
        let deleted = self.conn.lock().execute(
            "DELETE FROM subscribers WHERE username = ?1",
            params![username],
        )?;
        Ok(deleted == 1)
    }

    fn subscribers(&self) -> Result<Vec<Subscriber>, StoreError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare("SELECT username, profile FROM subscribers ORDER BY username")?;
        let subscribers = stmt
            .query_map([], |row| {
                Ok(Subscriber {
                    username: row.get(0)?,
                    profile_name: row.get(1)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(subscribers)
    }
}
