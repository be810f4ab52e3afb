//! SQLite-backed account store.
//!
//! Tables:
//! - `accounts`: id, display_name, balance, last_bonus_at
//! - `applied_orders`: order tokens already credited (webhook idempotency)
//!
//! Connections come from an r2d2 pool — each request borrows one scoped
//! connection, so no session object is ever shared across concurrent
//! handlers. WAL mode lets reads parallelise; writes are serialised by
//! SQLite's own page lock + busy_timeout.

use crate::error::StorageError;
use chrono::{DateTime, Utc};
use r2d2::PooledConnection;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::params;
use std::path::Path;

/// Pool size: enough for parallel WAL reads without unbounded descriptors.
const POOL_MAX_CONNECTIONS: u32 = 8;

/// How long a writer waits on SQLite's page lock before failing (ms).
const BUSY_TIMEOUT_MS: u32 = 5_000;

/// One persisted account record.
#[derive(Debug, Clone)]
pub struct Account {
    pub id: String,
    pub display_name: Option<String>,
    pub balance: u32,
    pub last_bonus_at: Option<DateTime<Utc>>,
}

/// Pooled SQLite store for account records.
#[derive(Clone)]
pub struct AccountStore {
    pool: r2d2::Pool<SqliteConnectionManager>,
}

impl AccountStore {
    /// Open (or create) the ledger database at the given path.
    pub fn open(db_path: &Path) -> Result<Self, StorageError> {
        let manager = SqliteConnectionManager::file(db_path).with_init(|conn| {
            conn.execute_batch(&format!(
                "PRAGMA journal_mode = WAL;
                 PRAGMA synchronous = NORMAL;
                 PRAGMA busy_timeout = {BUSY_TIMEOUT_MS};"
            ))
        });
        let pool = r2d2::Pool::builder()
            .max_size(POOL_MAX_CONNECTIONS)
            .build(manager)?;

        let conn = pool.get()?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS accounts (
                id TEXT PRIMARY KEY,
                display_name TEXT,
                balance INTEGER NOT NULL DEFAULT 0,
                last_bonus_at INTEGER,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS applied_orders (
                order_token TEXT PRIMARY KEY,
                account_id TEXT NOT NULL,
                credits INTEGER NOT NULL,
                applied_at INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_applied_orders_account
                ON applied_orders(account_id);",
        )?;

        Ok(Self { pool })
    }

    /// Borrow one scoped connection from the pool.
    pub fn conn(&self) -> Result<PooledConnection<SqliteConnectionManager>, StorageError> {
        Ok(self.pool.get()?)
    }

    /// Fetch an account by id.
    pub fn get(&self, account_id: &str) -> Result<Option<Account>, StorageError> {
        let conn = self.conn()?;
        let result = conn.query_row(
            "SELECT id, display_name, balance, last_bonus_at FROM accounts WHERE id = ?1",
            params![account_id],
            row_to_account,
        );

        match result {
            Ok(account) => Ok(Some(account)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

pub(crate) fn row_to_account(row: &rusqlite::Row<'_>) -> rusqlite::Result<Account> {
    let balance: i64 = row.get(2)?;
    let last_bonus_epoch: Option<i64> = row.get(3)?;
    Ok(Account {
        id: row.get(0)?,
        display_name: row.get(1)?,
        balance: u32::try_from(balance).unwrap_or(0),
        last_bonus_at: last_bonus_epoch.and_then(|secs| DateTime::from_timestamp(secs, 0)),
    })
}

/// Current epoch seconds.
pub(crate) fn now_epoch() -> i64 {
    Utc::now().timestamp()
}
