//! Daily bonus eligibility clock.
//!
//! Pure time arithmetic only — claiming (credit + timestamp write) lives in
//! the ledger so it can happen under one atomic statement.

use chrono::{DateTime, Duration, Utc};

/// Result of a bonus eligibility check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BonusEligibility {
    /// The bonus can be claimed now.
    Available,
    /// The cooldown has not elapsed; claimable after this wait.
    WaitRemaining(Duration),
}

impl BonusEligibility {
    pub fn is_available(&self) -> bool {
        matches!(self, Self::Available)
    }
}

/// Evaluate bonus eligibility at `now`.
///
/// A `None` timestamp means the bonus was never claimed and is available
/// immediately. Eligibility requires `now` to be strictly past the end of
/// the cooldown.
pub fn evaluate(
    last_bonus_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    period: Duration,
) -> BonusEligibility {
    let Some(last) = last_bonus_at else {
        return BonusEligibility::Available;
    };

    let next_at = last + period;
    if now > next_at {
        BonusEligibility::Available
    } else {
        BonusEligibility::WaitRemaining(next_at - now)
    }
}

/// Split a wait into whole hours and remainder minutes, flooring.
/// `(23h 59m 59s)` renders as `23h 59m`, not `24h 0m`.
pub fn wait_hours_minutes(wait: Duration) -> (i64, i64) {
    let total_minutes = wait.num_minutes().max(0);
    (total_minutes / 60, total_minutes % 60)
}
