//! Credit ledger for scriptforge.
//!
//! Tracks per-account prepaid balances, grants the time-gated daily bonus,
//! and applies confirmed payment orders idempotently.
//!
//! ## Design
//! - SQLite account store behind an r2d2 pool (one scoped connection per
//!   request, WAL mode, busy_timeout)
//! - Every balance mutation is one atomic conditional UPDATE or one
//!   `BEGIN IMMEDIATE` transaction
//! - Applied order tokens are persisted so webhook redelivery never
//!   double-credits

pub mod bonus;
pub mod credits;
pub mod store;

pub use bonus::{evaluate as evaluate_bonus, wait_hours_minutes, BonusEligibility};
pub use credits::{BonusOutcome, CreditLedger, DebitOutcome, OrderApplication};
pub use store::{Account, AccountStore};
