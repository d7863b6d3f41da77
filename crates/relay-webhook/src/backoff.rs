// SPDX-FileCopyrightText: 2026 Relay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use std::time::Duration;

/// Delay before retry number `attempt` (1-based): `min(base * 2^(attempt-1), max)`.
pub fn retry_delay(attempt: u32, base_ms: u64, max_ms: u64) -> Duration {
    let base = base_ms.max(1);
    let max = max_ms.max(base);
    let factor = 2u64.checked_pow(attempt.saturating_sub(1)).unwrap_or(u64::MAX);
    Duration::from_millis(base.saturating_mul(factor).min(max))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn doubles_from_base() {
        assert_eq!(retry_delay(1, 1000, 30_000), Duration::from_millis(1000));
        assert_eq!(retry_delay(2, 1000, 30_000), Duration::from_millis(2000));
        assert_eq!(retry_delay(4, 1000, 30_000), Duration::from_millis(8000));
    }

    #[test]
    fn capped_at_max() {
        assert_eq!(retry_delay(6, 1000, 30_000), Duration::from_millis(30_000));
        assert_eq!(retry_delay(200, 1000, 30_000), Duration::from_millis(30_000));
    }

    #[test]
    fn attempt_zero_is_treated_as_first() {
        assert_eq!(retry_delay(0, 250, 1000), Duration::from_millis(250));
    }
}
