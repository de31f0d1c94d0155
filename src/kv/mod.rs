mod schema;

use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;

use crate::error::StoreError;

/// String-keyed blob store over a single SQLite table. Every value is a JSON
/// document; callers own (de)serialization so that a malformed value can be
/// handled per-key instead of failing the whole store.
pub(crate) struct KvStore {
    conn: Connection,
}

impl KvStore {
    pub(crate) fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database: {}", path.display()))?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")
            .context("Failed to set database pragmas")?;
        let mut kv = Self { conn };
        kv.migrate().context("Database migration failed")?;
        Ok(kv)
    }

    #[cfg(test)]
    pub(crate) fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let mut kv = Self { conn };
        kv.migrate()?;
        Ok(kv)
    }

    fn migrate(&mut self) -> Result<()> {
        // Check if schema_version table exists
        let has_version_table: bool = self.conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version')",
            [],
            |row| row.get(0),
        )?;

        if !has_version_table {
            // Fresh database - apply full schema
            self.conn.execute_batch(schema::SCHEMA_V1)?;
            self.conn.execute(
                "INSERT INTO schema_version (version) VALUES (?1)",
                params![schema::CURRENT_VERSION],
            )?;
            return Ok(());
        }

        // Existing database - check version and apply migrations
        let current: i32 = self
            .conn
            .query_row("SELECT version FROM schema_version LIMIT 1", [], |row| {
                row.get(0)
            })
            .unwrap_or(0);

        for &(from_version, sql) in schema::MIGRATIONS {
            if current <= from_version {
                self.conn.execute_batch(sql)?;
            }
        }

        if current < schema::CURRENT_VERSION {
            self.conn.execute(
                "UPDATE schema_version SET version = ?1",
                params![schema::CURRENT_VERSION],
            )?;
        }

        Ok(())
    }

    /// Raw JSON text stored under `key`, if any.
    pub(crate) fn get_raw(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.conn
            .query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| {
                row.get(0)
            })
            .optional()
            .map_err(StoreError::from_sqlite)
    }

    /// Stores `value` under `key`, replacing any previous value.
    pub(crate) fn set_raw(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.conn
            .execute(
                "INSERT INTO kv (key, value) VALUES (?1, ?2)
                 ON CONFLICT(key) DO UPDATE SET value = ?2",
                params![key, value],
            )
            .map_err(StoreError::from_sqlite)?;
        Ok(())
    }

    /// Deserializes the value under `key`. Absent keys are `None`; a stored
    /// value that fails to parse is a `ParseFailure` naming the key.
    pub(crate) fn get<T: serde::de::DeserializeOwned>(
        &self,
        key: &str,
    ) -> Result<Option<T>, StoreError> {
        match self.get_raw(key)? {
            None => Ok(None),
            Some(text) => serde_json::from_str(&text)
                .map(Some)
                .map_err(|source| StoreError::ParseFailure {
                    key: key.to_string(),
                    source,
                }),
        }
    }

    /// Serializes `value` and stores it under `key`.
    pub(crate) fn set<T: serde::Serialize>(&self, key: &str, value: &T) -> Result<(), StoreError> {
        let text = serde_json::to_string(value).map_err(|source| StoreError::ParseFailure {
            key: key.to_string(),
            source,
        })?;
        self.set_raw(key, &text)
    }

    pub(crate) fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.conn
            .execute("DELETE FROM kv WHERE key = ?1", params![key])
            .map_err(StoreError::from_sqlite)?;
        Ok(())
    }

    pub(crate) fn contains(&self, key: &str) -> Result<bool, StoreError> {
        self.conn
            .query_row(
                "SELECT EXISTS(SELECT 1 FROM kv WHERE key = ?1)",
                params![key],
                |row| row.get(0),
            )
            .map_err(StoreError::from_sqlite)
    }
}
