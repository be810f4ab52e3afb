//! Payment webhook reconciliation.
//!
//! Validates inbound provider notifications and applies them to the ledger.
//! Signature verification over the raw body happens at the HTTP layer
//! before the notification is parsed; everything after that lives here.

use super::order;
use crate::error::StorageError;
use crate::ledger::{CreditLedger, OrderApplication};
use crate::notify::Notifier;
use serde::Deserialize;
use std::sync::Arc;

/// Provider statuses that mean "money arrived".
const FINAL_STATUSES: &[&str] = &["paid", "completed"];

/// An inbound payment notification, already signature-checked.
#[derive(Debug, Clone, Deserialize)]
pub struct PaymentNotification {
    pub status: String,
    pub order_id: String,
}

/// Why a notification was ignored. Ignored is a terminal, intentional
/// outcome — the provider gets an acknowledgement either way.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoredReason {
    /// Status is not a final "paid" state (pending, cancelled, ...).
    NonFinalStatus,
    /// The order token was credited before — provider redelivery.
    DuplicateOrder,
}

/// Why a notification was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectedReason {
    /// The order token did not decode.
    MalformedOrder,
    /// The decoded account id never interacted with the service.
    /// Webhooks do not create accounts.
    UnknownAccount,
}

/// Result of reconciling one notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    Applied {
        account_id: String,
        credits: u32,
        balance: u32,
    },
    Ignored(IgnoredReason),
    Rejected(RejectedReason),
}

/// Applies validated payment notifications to the credit ledger.
#[derive(Clone)]
pub struct WebhookReconciler {
    ledger: CreditLedger,
    notifier: Arc<dyn Notifier>,
}

impl WebhookReconciler {
    pub fn new(ledger: CreditLedger, notifier: Arc<dyn Notifier>) -> Self {
        Self { ledger, notifier }
    }

    /// Reconcile one notification. Storage failures propagate with no
    /// partial mutation; everything else is a domain outcome.
    pub async fn reconcile(
        &self,
        notification: &PaymentNotification,
    ) -> Result<ReconcileOutcome, StorageError> {
        let status = notification.status.trim().to_ascii_lowercase();
        if !FINAL_STATUSES.contains(&status.as_str()) {
            tracing::debug!(%status, order_id = %notification.order_id, "non-final status");
            return Ok(ReconcileOutcome::Ignored(IgnoredReason::NonFinalStatus));
        }

        let Ok(reference) = order::decode(&notification.order_id) else {
            tracing::warn!(order_id = %notification.order_id, "malformed order token");
            return Ok(ReconcileOutcome::Rejected(RejectedReason::MalformedOrder));
        };

        match self.ledger.apply_order(
            &notification.order_id,
            &reference.account_id,
            reference.credits,
        )? {
            OrderApplication::Applied { balance } => {
                tracing::info!(
                    account_id = %reference.account_id,
                    credits = reference.credits,
                    balance,
                    "payment applied"
                );

                // Fire-and-forget: a failed notice never unwinds the credit.
                let notifier = Arc::clone(&self.notifier);
                let account_id = reference.account_id.clone();
                let message = format!(
                    "Payment confirmed: +{} credits. New balance: {balance}.",
                    reference.credits
                );
                tokio::spawn(async move {
                    if let Err(e) = notifier.notify(&account_id, &message).await {
                        tracing::warn!(%account_id, "payment notification failed: {e}");
                    }
                });

                Ok(ReconcileOutcome::Applied {
                    account_id: reference.account_id,
                    credits: reference.credits,
                    balance,
                })
            }
            OrderApplication::AlreadyApplied => {
                tracing::info!(
                    order_id = %notification.order_id,
                    "duplicate delivery ignored"
                );
                Ok(ReconcileOutcome::Ignored(IgnoredReason::DuplicateOrder))
            }
            OrderApplication::NoSuchAccount => {
                tracing::warn!(
                    account_id = %reference.account_id,
                    order_id = %notification.order_id,
                    "order for unknown account"
                );
                Ok(ReconcileOutcome::Rejected(RejectedReason::UnknownAccount))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LedgerConfig;
    use crate::ledger::AccountStore;
    use crate::notify::LogNotifier;
    use tempfile::TempDir;

    fn make_reconciler() -> (TempDir, CreditLedger, WebhookReconciler) {
        let tmp = TempDir::new().unwrap();
        let store = AccountStore::open(&tmp.path().join("ledger.db")).unwrap();
        let ledger = CreditLedger::new(store, &LedgerConfig::default());
        let reconciler = WebhookReconciler::new(ledger.clone(), Arc::new(LogNotifier));
        (tmp, ledger, reconciler)
    }

    fn paid(order_id: &str) -> PaymentNotification {
        PaymentNotification {
            status: "paid".into(),
            order_id: order_id.into(),
        }
    }

    #[tokio::test]
    async fn paid_notification_credits_account() {
        let (_tmp, ledger, reconciler) = make_reconciler();
        ledger.ensure_account("42").unwrap();

        let outcome = reconciler.reconcile(&paid("42_100_ab12")).await.unwrap();
        assert_eq!(
            outcome,
            ReconcileOutcome::Applied {
                account_id: "42".into(),
                credits: 100,
                balance: 110,
            }
        );
    }

    #[tokio::test]
    async fn completed_status_also_applies() {
        let (_tmp, ledger, reconciler) = make_reconciler();
        ledger.ensure_account("42").unwrap();

        let notification = PaymentNotification {
            status: "COMPLETED".into(),
            order_id: "42_10_ff00".into(),
        };
        let outcome = reconciler.reconcile(&notification).await.unwrap();
        assert!(matches!(outcome, ReconcileOutcome::Applied { .. }));
    }

    #[tokio::test]
    async fn replay_credits_exactly_once() {
        let (_tmp, ledger, reconciler) = make_reconciler();
        ledger.ensure_account("42").unwrap();

        let notification = paid("42_100_ab12");
        reconciler.reconcile(&notification).await.unwrap();
        let outcome = reconciler.reconcile(&notification).await.unwrap();

        assert_eq!(
            outcome,
            ReconcileOutcome::Ignored(IgnoredReason::DuplicateOrder)
        );
        assert_eq!(ledger.balance("42").unwrap(), 110);
    }

    #[tokio::test]
    async fn pending_status_is_ignored() {
        let (_tmp, ledger, reconciler) = make_reconciler();
        ledger.ensure_account("42").unwrap();

        let notification = PaymentNotification {
            status: "pending".into(),
            order_id: "42_100_ab12".into(),
        };
        let outcome = reconciler.reconcile(&notification).await.unwrap();
        assert_eq!(
            outcome,
            ReconcileOutcome::Ignored(IgnoredReason::NonFinalStatus)
        );
        assert_eq!(ledger.balance("42").unwrap(), 10);
    }

    #[tokio::test]
    async fn malformed_token_is_rejected() {
        let (_tmp, _ledger, reconciler) = make_reconciler();

        let outcome = reconciler.reconcile(&paid("justanid")).await.unwrap();
        assert_eq!(
            outcome,
            ReconcileOutcome::Rejected(RejectedReason::MalformedOrder)
        );
    }

    #[tokio::test]
    async fn unknown_account_is_rejected_not_created() {
        let (_tmp, ledger, reconciler) = make_reconciler();

        let outcome = reconciler.reconcile(&paid("ghost_100_ab12")).await.unwrap();
        assert_eq!(
            outcome,
            ReconcileOutcome::Rejected(RejectedReason::UnknownAccount)
        );
        assert!(ledger.lookup("ghost").unwrap().is_none());
    }
}
