//! Best-effort account notifications.
//!
//! Credits are never held hostage by messaging: a notification failure is
//! logged and dropped, the ledger mutation stands.

use async_trait::async_trait;

/// Delivery seam for user-facing notices (payment confirmed, etc.).
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver `message` to the account holder. Errors are the caller's
    /// signal to log, never to roll anything back.
    async fn notify(&self, account_id: &str, message: &str) -> anyhow::Result<()>;
}

/// Default notifier: writes the notice to the log. The chat transport that
/// would deliver it is an external collaborator.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, account_id: &str, message: &str) -> anyhow::Result<()> {
        tracing::info!(account_id, message, "account notification");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn log_notifier_always_succeeds() {
        let notifier = LogNotifier;
        assert!(notifier.notify("42", "payment received").await.is_ok());
    }
}
