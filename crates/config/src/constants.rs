//! Protocol-level default parameters.

/// Confirmations required before a deposit counts as CONFIRMED.
///
/// Applies to canonical and duplicate deposits alike; duplicates do not
/// use a separate threshold.
pub const DEFAULT_CONFIRMATION_TARGET: u32 = 3;

/// Maximum deviation (percent) between a backup transaction's implied
/// fee rate and the current network fee rate before the transaction is
/// rejected during receive validation.
pub const DEFAULT_FEE_RATE_TOLERANCE_PERCENT: u32 = 40;

/// Upper bound on the fee rate (sats/vB) used when building transactions.
pub const DEFAULT_MAX_FEE_RATE: u64 = 25;

/// Interval between polls while waiting for a deposit or batch to resolve.
pub const POLL_INTERVAL_SECS: u64 = 5;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn confirmation_target_is_positive() {
        assert!(DEFAULT_CONFIRMATION_TARGET >= 1);
    }
}
