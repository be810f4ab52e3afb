//! Error taxonomy for the credit ledger core.
//!
//! Only infrastructure failures are errors here. Expected domain outcomes
//! (insufficient credit, bonus cooldown, ignored webhooks) are modeled as
//! enum variants on the operations that produce them, never as `Err`.

use thiserror::Error;

/// A storage-layer failure: the pool could not hand out a connection, or a
/// query failed. Callers surface this as "service unavailable" — no ledger
/// mutation has been committed when one of these propagates.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage unavailable: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("storage query failed: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sqlite_error_converts() {
        let err: StorageError = rusqlite::Error::QueryReturnedNoRows.into();
        assert!(err.to_string().contains("storage query failed"));
    }
}
