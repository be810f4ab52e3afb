//! Credit ledger: the only writer of account balances.
//!
//! Every mutation is a single conditional UPDATE or one `BEGIN IMMEDIATE`
//! transaction on a pooled connection, so concurrent handlers — including
//! two for the same account — serialize at the storage layer rather than
//! through in-process locks. The service can run multiple instances against
//! the same database file.

use super::bonus::{self, BonusEligibility};
use super::store::{now_epoch, Account, AccountStore};
use crate::config::LedgerConfig;
use crate::error::StorageError;
use chrono::{DateTime, Duration, Utc};
use rusqlite::params;

/// Outcome of a debit attempt. Insufficient credit is an expected result,
/// not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebitOutcome {
    Debited { balance: u32 },
    InsufficientCredit { balance: u32 },
}

/// Outcome of a bonus claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BonusOutcome {
    Granted { balance: u32 },
    TooEarly { wait: Duration },
}

/// Outcome of applying a confirmed payment order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderApplication {
    /// Credits granted; the order token is now recorded as applied.
    Applied { balance: u32 },
    /// This token was credited before — a provider redelivery.
    AlreadyApplied,
    /// No such account; webhooks never create accounts.
    NoSuchAccount,
}

/// Transactional credit ledger over the account store.
#[derive(Clone)]
pub struct CreditLedger {
    store: AccountStore,
    initial_grant: u32,
    bonus_grant: u32,
    bonus_period: Duration,
}

impl CreditLedger {
    pub fn new(store: AccountStore, config: &LedgerConfig) -> Self {
        Self {
            store,
            initial_grant: config.initial_grant,
            bonus_grant: config.bonus_grant,
            bonus_period: Duration::hours(i64::from(config.bonus_period_hours)),
        }
    }

    /// Credits granted per bonus claim.
    pub fn bonus_grant(&self) -> u32 {
        self.bonus_grant
    }

    /// Cooldown between bonus claims.
    pub fn bonus_period(&self) -> Duration {
        self.bonus_period
    }

    /// Ensure the account exists (first contact receives the initial
    /// grant), then return it.
    pub fn ensure_account(&self, account_id: &str) -> Result<Account, StorageError> {
        let conn = self.store.conn()?;
        let now = now_epoch();
        conn.execute(
            "INSERT OR IGNORE INTO accounts (id, display_name, balance, last_bonus_at, created_at, updated_at)
             VALUES (?1, NULL, ?2, NULL, ?3, ?3)",
            params![account_id, self.initial_grant, now],
        )?;
        drop(conn);

        self.store
            .get(account_id)?
            .ok_or(StorageError::Sqlite(rusqlite::Error::QueryReturnedNoRows))
    }

    /// Current balance, creating the account with the initial grant if it
    /// does not exist yet.
    pub fn balance(&self, account_id: &str) -> Result<u32, StorageError> {
        Ok(self.ensure_account(account_id)?.balance)
    }

    /// Upsert the last-seen display name without touching the balance.
    pub fn touch_identity(
        &self,
        account_id: &str,
        display_name: Option<&str>,
    ) -> Result<(), StorageError> {
        let conn = self.store.conn()?;
        let now = now_epoch();
        conn.execute(
            "INSERT INTO accounts (id, display_name, balance, last_bonus_at, created_at, updated_at)
             VALUES (?1, ?2, ?3, NULL, ?4, ?4)
             ON CONFLICT(id) DO UPDATE SET
                 display_name = COALESCE(excluded.display_name, display_name),
                 updated_at = excluded.updated_at",
            params![account_id, display_name, self.initial_grant, now],
        )?;
        Ok(())
    }

    /// Atomically debit `amount` credits if the balance covers it.
    ///
    /// The check and decrement are one conditional UPDATE: two concurrent
    /// debits against a balance of 1 yield exactly one success.
    pub fn try_debit(&self, account_id: &str, amount: u32) -> Result<DebitOutcome, StorageError> {
        let account = self.ensure_account(account_id)?;
        if amount == 0 {
            return Ok(DebitOutcome::Debited {
                balance: account.balance,
            });
        }

        let conn = self.store.conn()?;
        let updated = conn.execute(
            "UPDATE accounts SET balance = balance - ?1, updated_at = ?2
             WHERE id = ?3 AND balance >= ?1",
            params![amount, now_epoch(), account_id],
        )?;
        drop(conn);

        let balance = self
            .store
            .get(account_id)?
            .map(|a| a.balance)
            .unwrap_or(0);

        if updated == 0 {
            Ok(DebitOutcome::InsufficientCredit { balance })
        } else {
            Ok(DebitOutcome::Debited { balance })
        }
    }

    /// Atomically add `amount` credits, creating the account on demand.
    /// A zero amount is a no-op that still ensures the account exists.
    pub fn credit(&self, account_id: &str, amount: u32) -> Result<u32, StorageError> {
        let account = self.ensure_account(account_id)?;
        if amount == 0 {
            return Ok(account.balance);
        }

        let conn = self.store.conn()?;
        conn.execute(
            "UPDATE accounts SET balance = balance + ?1, updated_at = ?2 WHERE id = ?3",
            params![amount, now_epoch(), account_id],
        )?;
        drop(conn);

        self.balance(account_id)
    }

    /// Claim the daily bonus of `grant` credits. Eligibility is
    /// re-evaluated inside the same conditional UPDATE that credits and
    /// stamps `last_bonus_at`, so two concurrent claims produce exactly
    /// one grant.
    pub fn claim_bonus(
        &self,
        account_id: &str,
        grant: u32,
        now: DateTime<Utc>,
    ) -> Result<BonusOutcome, StorageError> {
        self.ensure_account(account_id)?;

        // Eligible iff last_bonus_at + period < now, i.e. last < cutoff.
        let cutoff = (now - self.bonus_period).timestamp();
        let conn = self.store.conn()?;
        let updated = conn.execute(
            "UPDATE accounts SET balance = balance + ?1, last_bonus_at = ?2, updated_at = ?2
             WHERE id = ?3 AND (last_bonus_at IS NULL OR last_bonus_at < ?4)",
            params![grant, now.timestamp(), account_id, cutoff],
        )?;
        drop(conn);

        let account = self
            .store
            .get(account_id)?
            .ok_or(StorageError::Sqlite(rusqlite::Error::QueryReturnedNoRows))?;

        if updated == 1 {
            tracing::info!(account_id, grant, "bonus granted");
            return Ok(BonusOutcome::Granted {
                balance: account.balance,
            });
        }

        let wait = match bonus::evaluate(account.last_bonus_at, now, self.bonus_period) {
            BonusEligibility::WaitRemaining(wait) => wait,
            // Lost a race and the winner's stamp is not visible as a wait;
            // report a zero cooldown rather than claiming twice.
            BonusEligibility::Available => Duration::zero(),
        };
        Ok(BonusOutcome::TooEarly { wait })
    }

    /// Apply a confirmed payment order: record the order token and credit
    /// the account in one transaction. Both-or-neither; a redelivered token
    /// is reported as `AlreadyApplied` with no mutation.
    pub fn apply_order(
        &self,
        order_token: &str,
        account_id: &str,
        credits: u32,
    ) -> Result<OrderApplication, StorageError> {
        let conn = self.store.conn()?;
        conn.execute_batch("BEGIN IMMEDIATE")?;

        let result = (|| -> Result<OrderApplication, StorageError> {
            let inserted = conn.execute(
                "INSERT OR IGNORE INTO applied_orders (order_token, account_id, credits, applied_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![order_token, account_id, credits, now_epoch()],
            )?;
            if inserted == 0 {
                return Ok(OrderApplication::AlreadyApplied);
            }

            let updated = conn.execute(
                "UPDATE accounts SET balance = balance + ?1, updated_at = ?2 WHERE id = ?3",
                params![credits, now_epoch(), account_id],
            )?;
            if updated == 0 {
                return Ok(OrderApplication::NoSuchAccount);
            }

            let balance: i64 = conn.query_row(
                "SELECT balance FROM accounts WHERE id = ?1",
                params![account_id],
                |row| row.get(0),
            )?;
            Ok(OrderApplication::Applied {
                balance: u32::try_from(balance).unwrap_or(0),
            })
        })();

        match result {
            Ok(outcome @ OrderApplication::Applied { .. }) => {
                conn.execute_batch("COMMIT")?;
                Ok(outcome)
            }
            Ok(outcome) => {
                // Nothing to keep: a duplicate token changed no rows, and a
                // missing account must not leave its token recorded.
                conn.execute_batch("ROLLBACK")?;
                Ok(outcome)
            }
            Err(e) => {
                let _ = conn.execute_batch("ROLLBACK");
                Err(e)
            }
        }
    }

    /// Fetch an account without creating it. Webhook reconciliation uses
    /// this to reject orders for ids that never interacted.
    pub fn lookup(&self, account_id: &str) -> Result<Option<Account>, StorageError> {
        self.store.get(account_id)
    }
}
