//! scriptforge — a usage-metered AI script generation gateway.
//!
//! Clients spend prepaid credits per generation. Balances refill through a
//! time-gated daily bonus or an asynchronously confirmed crypto payment;
//! the payment provider's webhooks are signature-verified and reconciled
//! idempotently against the SQLite-backed credit ledger.

pub mod config;
pub mod error;
pub mod gateway;
pub mod generate;
pub mod ledger;
pub mod notify;
pub mod payment;

pub use config::Config;
pub use error::StorageError;
