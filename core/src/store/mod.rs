//! SQLite persistence layer.
//!
//! RULE: Only store/ talks to the database.
//! Pipeline components call store methods and never execute SQL directly.
//!
//! The store is the pipeline's query executor. Callers own it and hand a
//! reference to every component that needs database access.

mod customer;
mod segment;

pub use customer::{CustomerFacts, NewCustomer};
pub use segment::{AssignedCustomer, SegmentDefinition, SegmentUsage};

use crate::{config::StoreConfig, error::ChurnResult};
use rusqlite::Connection;
use std::time::Duration;

/// Maximum number of ids bound into a single `IN (...)` clause.
pub(crate) const ID_CHUNK: usize = 500;

pub struct CrmStore {
    conn: Connection,
}

impl CrmStore {
    pub fn open(path: &str, config: &StoreConfig) -> ChurnResult<Self> {
        let conn = Connection::open_with_flags(
            path,
            rusqlite::OpenFlags::SQLITE_OPEN_READ_WRITE
                | rusqlite::OpenFlags::SQLITE_OPEN_CREATE
                | rusqlite::OpenFlags::SQLITE_OPEN_URI,
        )?;
        // WAL mode only for real files (shared-memory and :memory: ignore it).
        let _ = conn.execute_batch("PRAGMA journal_mode=WAL;");
        Self::configure(&conn, config)?;
        Ok(Self { conn })
    }

    /// Open an in-memory database (used in tests).
    pub fn in_memory(config: &StoreConfig) -> ChurnResult<Self> {
        let conn = Connection::open(":memory:")?;
        Self::configure(&conn, config)?;
        Ok(Self { conn })
    }

    fn configure(conn: &Connection, config: &StoreConfig) -> ChurnResult<()> {
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        conn.busy_timeout(Duration::from_millis(config.busy_timeout_ms))?;
        Ok(())
    }

    /// Apply all schema migrations in order. Safe to run repeatedly.
    pub fn migrate(&self) -> ChurnResult<()> {
        self.conn
            .execute_batch(include_str!("../../../migrations/001_crm_source.sql"))?;
        self.conn
            .execute_batch(include_str!("../../../migrations/002_segment.sql"))?;
        Ok(())
    }
}

/// Current wall-clock time in the text format stored in timestamp columns.
pub(crate) fn now_text() -> String {
    chrono::Local::now()
        .naive_local()
        .format("%Y-%m-%d %H:%M:%S")
        .to_string()
}

/// `?, ?, ?` placeholder list for `n` bound parameters.
pub(crate) fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}
