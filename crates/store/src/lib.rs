/*
 * SPDX-FileCopyrightText: 2024 A3Mailer Project
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

//! # Mailbox Store
//!
//! Relational persistence layer for the multi-domain mailbox engine.
//!
//! This crate owns the schema and every query against it: organizations,
//! domains, users, mailboxes, folders, messages, shared-mailbox grants and
//! the audit log. The engine crate drives it through typed operations and
//! never sees SQL.
//!
//! ## Architecture
//!
//! - SQLite through `sqlx` with WAL journaling and foreign keys enforced.
//! - The schema is applied from `schema.sql` when a pool is opened; every
//!   statement is idempotent so re-opening an existing database is safe.
//! - Single-row reads and writes run directly against the pool. Multi-step
//!   mutations (UID allocation, counter updates) run on a transaction the
//!   caller obtains from [`Store::begin`], using the `*_tx` variants that
//!   take an explicit connection, so a mid-operation failure rolls the whole
//!   batch back.
//!
//! ## Example
//!
//! ```rust,no_run
//! use store::Store;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = Store::open("mailbox.db").await?;
//!     let domains = store.list_domains().await?;
//!     println!("{} domains provisioned", domains.len());
//!     Ok(())
//! }
//! ```

use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Sqlite, SqlitePool, Transaction};
use tracing::{debug, info};

pub mod access;
pub mod audit;
pub mod directory;
pub mod error;
pub mod folders;
pub mod mailboxes;
pub mod messages;
pub mod model;

pub use error::{Result, StoreError};
pub use model::{
    AuditEntry, Domain, Folder, Mailbox, Message, NamespaceMode, Organization, OwnedMailbox,
    Permission, SharedAccess, SharedMailbox, SpecialUse, User, FLAG_SEEN,
};

static SCHEMA: &str = include_str!("schema.sql");

/// A write transaction handed out by [`Store::begin`].
pub type Tx = Transaction<'static, Sqlite>;

/// Handle to the relational store. Cheap to clone; all clones share one pool.
#[derive(Debug, Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    /// Opens (and migrates) a file-backed database.
    pub async fn open(path: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(path)
            .map_err(|err| StoreError::Migration(err.to_string()))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(10))
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(8)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.apply_schema().await?;
        info!(path, "mailbox store opened");
        Ok(store)
    }

    /// Opens an in-memory database, used by tests and tooling.
    ///
    /// The pool is pinned to a single connection; a plain `:memory:` database
    /// exists per connection, so handing out more would silently hand out
    /// empty databases.
    pub async fn open_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(|err| StoreError::Migration(err.to_string()))?
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.apply_schema().await?;
        Ok(store)
    }

    async fn apply_schema(&self) -> Result<()> {
        for statement in SCHEMA.split(';') {
            let statement = statement.trim();
            if statement.is_empty() {
                continue;
            }
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(|err| StoreError::Migration(format!("{statement}: {err}")))?;
        }
        debug!("schema applied");
        Ok(())
    }

    /// Begins a transaction for a multi-step mutation. Dropping it without
    /// committing rolls everything back.
    pub async fn begin(&self) -> Result<Transaction<'static, Sqlite>> {
        Ok(self.pool.begin().await?)
    }

    /// Commits a transaction, mapping the driver error.
    pub async fn commit(tx: Tx) -> Result<()> {
        Ok(tx.commit().await?)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

/// Current timestamp as stored in the database.
pub(crate) fn now() -> DateTime<Utc> {
    Utc::now()
}
