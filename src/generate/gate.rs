//! The usage gate: one credit per successful generation.
//!
//! Order of operations is check → generate → debit. A failed or timed-out
//! generation never costs a credit, and no ledger write happens while the
//! external call is in flight.

use super::Generator;
use crate::error::StorageError;
use crate::ledger::{CreditLedger, DebitOutcome};
use std::sync::Arc;
use std::time::Duration;

/// Credits consumed per successful generation.
const GENERATION_COST: u32 = 1;

/// Outcome of one generation request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GenerationOutcome {
    Generated { text: String, balance: u32 },
    /// Balance is empty; the generator was never invoked.
    Insufficient,
    /// The generator failed or timed out; nothing was debited.
    ServiceUnavailable,
}

/// Meters generation requests against the credit ledger.
#[derive(Clone)]
pub struct UsageGate {
    ledger: CreditLedger,
    generator: Arc<dyn Generator>,
    timeout: Duration,
}

impl UsageGate {
    pub fn new(ledger: CreditLedger, generator: Arc<dyn Generator>, timeout: Duration) -> Self {
        Self {
            ledger,
            generator,
            timeout,
        }
    }

    /// Handle one generation request for `account_id`.
    ///
    /// `Err` means storage was unreachable for the balance check — the
    /// generator is not invoked and nothing is debited.
    pub async fn handle(
        &self,
        account_id: &str,
        display_name: Option<&str>,
        prompt: &str,
    ) -> Result<GenerationOutcome, StorageError> {
        self.ledger.touch_identity(account_id, display_name)?;
        let balance = self.ledger.balance(account_id)?;
        if balance < GENERATION_COST {
            return Ok(GenerationOutcome::Insufficient);
        }

        let text = match tokio::time::timeout(self.timeout, self.generator.generate(prompt)).await
        {
            Ok(Ok(text)) => text,
            Ok(Err(e)) => {
                tracing::warn!(account_id, "generation failed: {e}");
                return Ok(GenerationOutcome::ServiceUnavailable);
            }
            Err(_) => {
                tracing::warn!(
                    account_id,
                    timeout_secs = self.timeout.as_secs(),
                    "generation timed out"
                );
                return Ok(GenerationOutcome::ServiceUnavailable);
            }
        };

        // Debit after success: the generated text is already in hand, so a
        // transient debit failure gets one retry before we give the
        // generation away rather than fail the user.
        let debit = self
            .ledger
            .try_debit(account_id, GENERATION_COST)
            .or_else(|first_err| {
                tracing::error!(account_id, "debit failed, retrying once: {first_err}");
                self.ledger.try_debit(account_id, GENERATION_COST)
            });

        match debit {
            Ok(DebitOutcome::Debited { balance }) => {
                Ok(GenerationOutcome::Generated { text, balance })
            }
            Ok(DebitOutcome::InsufficientCredit { balance }) => {
                // A concurrent request spent the last credit between our
                // check and this debit. The text is already generated;
                // hand it over and keep the floor at zero.
                tracing::warn!(account_id, "last credit lost to a concurrent debit");
                Ok(GenerationOutcome::Generated { text, balance })
            }
            Err(e) => {
                tracing::error!(account_id, "debit not recorded after generation: {e}");
                Ok(GenerationOutcome::Generated {
                    text,
                    balance: balance.saturating_sub(GENERATION_COST),
                })
            }
        }
    }
}
