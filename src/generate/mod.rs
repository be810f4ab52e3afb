//! Text generation: the external LLM seam and the credit-metered gate in
//! front of it.

pub mod gate;
pub mod openrouter;

use async_trait::async_trait;

/// The external text generator. One prompt in, one script out; any
/// transport or provider failure surfaces as an error the gate translates
/// to "service unavailable" without touching the ledger.
#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(&self, prompt: &str) -> anyhow::Result<String>;
}

pub use gate::{GenerationOutcome, UsageGate};
pub use openrouter::OpenRouterGenerator;
