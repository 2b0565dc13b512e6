// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! SQLite storage backend
//!
//! Durable key-value records for host builds (gateways, simulators).

use anyhow::{Context, Result};
use meshlog::properties::Storage;
use meshlog::Error;
use rusqlite::{params, Connection, OptionalExtension};

/// SQLite key-value storage
///
/// # Schema
///
/// ```sql
/// CREATE TABLE records (
///     key INTEGER PRIMARY KEY,
///     value BLOB NOT NULL
/// );
/// ```
pub struct SqliteStorage {
    conn: Connection,
}

impl SqliteStorage {
    /// Create a new SQLite storage with a file-based database
    pub fn new(path: &str) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open SQLite database at {}", path))?;

        let storage = Self { conn };
        storage.init_schema()?;
        Ok(storage)
    }

    /// Create an in-memory SQLite storage (for testing)
    pub fn new_in_memory() -> Result<Self> {
        let conn =
            Connection::open_in_memory().context("Failed to create in-memory SQLite database")?;

        let storage = Self { conn };
        storage.init_schema()?;
        Ok(storage)
    }

    /// Number of stored records
    pub fn count(&self) -> Result<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM records", [], |row| row.get(0))?;
        Ok(usize::try_from(count)?)
    }

    /// Initialize database schema
    fn init_schema(&self) -> Result<()> {
        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS records (
                key INTEGER PRIMARY KEY,
                value BLOB NOT NULL
            )",
            [],
        )?;

        Ok(())
    }

    fn fetch(&self, key: u16) -> rusqlite::Result<Option<Vec<u8>>> {
        self.conn
            .query_row(
                "SELECT value FROM records WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()
    }
}

fn storage_error(op: &str, key: u16, err: &rusqlite::Error) -> Error {
    tracing::warn!("SQLite {} of record 0x{:04x} failed: {}", op, key, err);
    Error::Storage
}

impl Storage for SqliteStorage {
    fn contains(&mut self, key: u16) -> meshlog::Result<bool> {
        self.fetch(key)
            .map(|value| value.is_some())
            .map_err(|e| storage_error("probe", key, &e))
    }

    fn read(&mut self, key: u16, buf: &mut [u8]) -> meshlog::Result<usize> {
        let value = self
            .fetch(key)
            .map_err(|e| storage_error("read", key, &e))?
            .ok_or(Error::Storage)?;

        if buf.len() < value.len() {
            return Err(Error::BufferTooSmall);
        }
        buf[..value.len()].copy_from_slice(&value);
        Ok(value.len())
    }

    fn write(&mut self, key: u16, value: &[u8]) -> meshlog::Result<()> {
        self.conn
            .execute(
                "INSERT INTO records (key, value) VALUES (?1, ?2)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                params![key, value],
            )
            .map_err(|e| storage_error("write", key, &e))?;

        tracing::debug!("Stored record 0x{:04x} ({} bytes)", key, value.len());
        Ok(())
    }

    fn delete(&mut self, key: u16) -> meshlog::Result<()> {
        self.conn
            .execute("DELETE FROM records WHERE key = ?1", params![key])
            .map_err(|e| storage_error("delete", key, &e))?;
        Ok(())
    }
}
