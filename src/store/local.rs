//! Local State Store
//! Mission: Named, individually expiring entries on the local device
//!
//! This is the authoritative tier for session state and the persisted mirror
//! for the content cache. Entries behave like named cookies: each carries its
//! own expiry and silently disappears once it has passed.

use crate::clock::Clock;
use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::sync::Arc;

pub struct LocalStateStore {
    db_path: String,
    clock: Arc<dyn Clock>,
}

impl LocalStateStore {
    pub fn new(db_path: &str, clock: Arc<dyn Clock>) -> Result<Self> {
        let store = Self {
            db_path: db_path.to_string(),
            clock,
        };
        store.init_db()?;
        Ok(store)
    }

    fn open(&self) -> Result<Connection> {
        Connection::open(&self.db_path).context("Failed to open local state database")
    }

    fn init_db(&self) -> Result<()> {
        let conn = self.open()?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS local_state (
                name TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                expires_at INTEGER NOT NULL
            )",
            [],
        )?;
        Ok(())
    }

    /// Write one entry, replacing any previous value under the same name.
    pub fn set(&self, name: &str, value: &str, ttl_ms: i64) -> Result<()> {
        let expires_at = self.clock.now_ms() + ttl_ms;
        let conn = self.open()?;
        conn.execute(
            "INSERT INTO local_state (name, value, expires_at) VALUES (?1, ?2, ?3)
             ON CONFLICT (name) DO UPDATE SET value = ?2, expires_at = ?3",
            params![name, value, expires_at],
        )?;
        Ok(())
    }

    /// Read one entry. Expired entries read as absent.
    pub fn get(&self, name: &str) -> Result<Option<String>> {
        let conn = self.open()?;
        let row: Option<(String, i64)> = conn
            .query_row(
                "SELECT value, expires_at FROM local_state WHERE name = ?1",
                params![name],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()
            .context("Failed to read local state")?;

        match row {
            Some((value, expires_at)) if self.clock.now_ms() <= expires_at => Ok(Some(value)),
            _ => Ok(None),
        }
    }

    pub fn delete(&self, name: &str) -> Result<()> {
        let conn = self.open()?;
        conn.execute("DELETE FROM local_state WHERE name = ?1", params![name])?;
        Ok(())
    }

    pub fn delete_many(&self, names: &[&str]) -> Result<()> {
        let conn = self.open()?;
        for name in names {
            conn.execute("DELETE FROM local_state WHERE name = ?1", params![name])?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use std::time::Duration;
    use tempfile::NamedTempFile;

    fn create_test_store() -> (LocalStateStore, Arc<ManualClock>, NamedTempFile) {
        let temp_file = NamedTempFile::new().unwrap();
        let clock = Arc::new(ManualClock::new(1_000_000));
        let store = LocalStateStore::new(
            temp_file.path().to_str().unwrap(),
            Arc::clone(&clock) as Arc<dyn Clock>,
        )
        .unwrap();
        (store, clock, temp_file)
    }

    #[test]
    fn test_set_get_delete() {
        let (store, _clock, _temp) = create_test_store();

        store.set("auth_token", "abc", 60_000).unwrap();
        assert_eq!(store.get("auth_token").unwrap().as_deref(), Some("abc"));

        store.set("auth_token", "def", 60_000).unwrap();
        assert_eq!(store.get("auth_token").unwrap().as_deref(), Some("def"));

        store.delete("auth_token").unwrap();
        assert!(store.get("auth_token").unwrap().is_none());
    }

    #[test]
    fn test_expired_entry_reads_as_absent() {
        let (store, clock, _temp) = create_test_store();

        store.set("last_activity", "now", 1_000).unwrap();
        assert!(store.get("last_activity").unwrap().is_some());

        clock.advance(Duration::from_millis(1_001));
        assert!(store.get("last_activity").unwrap().is_none());
    }

    #[test]
    fn test_delete_many() {
        let (store, _clock, _temp) = create_test_store();
        store.set("a", "1", 60_000).unwrap();
        store.set("b", "2", 60_000).unwrap();

        store.delete_many(&["a", "b", "missing"]).unwrap();
        assert!(store.get("a").unwrap().is_none());
        assert!(store.get("b").unwrap().is_none());
    }
}
