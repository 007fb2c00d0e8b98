// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared duration math: the restart-backoff formula used by both the
//! service manager and the check manager.

use std::time::Duration;

/// Serde helper for `Duration` fields that cross a JSON boundary
/// (persisted state, plan structs) as whole milliseconds.
pub mod serde_ms {
    use super::Duration;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(d: &Duration, s: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(d: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let ms = u64::deserialize(d)?;
        Ok(Duration::from_millis(ms))
    }
}

/// `delay_n = min(limit, delay * factor^(n-1))` for `n >= 1`.
///
/// `factor` must be `>= 1.0`; callers validate that at plan-load time (a
/// plan with `factor < 1.0` is a validation error upstream, out of this
/// crate's scope) but this function clamps defensively rather than panic.
pub fn backoff_delay(base: Duration, factor: f64, limit: Duration, attempt: u32) -> Duration {
    if attempt == 0 {
        return Duration::ZERO;
    }
    let factor = factor.max(1.0);
    let exponent = (attempt - 1) as i32;
    let scaled = base.as_secs_f64() * factor.powi(exponent);
    let scaled = Duration::from_secs_f64(scaled.max(0.0));
    scaled.min(limit)
}

#[cfg(test)]
mod tests {
    use super::*;
    use yare::parameterized;

    #[parameterized(
        first_attempt = { 1, Duration::from_millis(500) },
        second_attempt = { 2, Duration::from_secs(1) },
        third_attempt = { 3, Duration::from_secs(2) },
        clamped_at_limit = { 10, Duration::from_secs(30) },
    )]
    fn matches_exponential_formula(attempt: u32, expected: Duration) {
        let delay = backoff_delay(
            Duration::from_millis(500),
            2.0,
            Duration::from_secs(30),
            attempt,
        );
        assert_eq!(delay, expected);
    }

    #[test]
    fn zero_attempts_means_no_delay() {
        assert_eq!(
            backoff_delay(Duration::from_millis(500), 2.0, Duration::from_secs(30), 0),
            Duration::ZERO
        );
    }

    #[test]
    fn factor_below_one_is_clamped_to_one() {
        // A misconfigured factor must never make retries converge to zero delay.
        let d1 = backoff_delay(Duration::from_millis(500), 0.1, Duration::from_secs(30), 1);
        let d5 = backoff_delay(Duration::from_millis(500), 0.1, Duration::from_secs(30), 5);
        assert_eq!(d1, Duration::from_millis(500));
        assert_eq!(d5, Duration::from_millis(500));
    }
}
