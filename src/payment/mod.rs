//! Payment subsystem: invoice signing, order tokens, and webhook
//! reconciliation against the credit ledger.
//!
//! ## Design
//! - Order tokens carry `(account, credits, nonce)` through the provider
//!   round-trip; no server-side pending-order state
//! - Outbound invoice bodies are canonical-JSON → base64 → HMAC-SHA256
//! - Inbound webhooks are signature-verified over the raw body, then
//!   applied idempotently (applied-order tokens are persisted)

pub mod invoice;
pub mod order;
pub mod reconcile;
pub mod signing;

pub use invoice::{find_package, CreditPackage, InvoiceClient, PreparedInvoice, CREDIT_PACKAGES};
pub use order::{OrderError, OrderReference};
pub use reconcile::{PaymentNotification, ReconcileOutcome, WebhookReconciler};
pub use signing::SignedPayload;
