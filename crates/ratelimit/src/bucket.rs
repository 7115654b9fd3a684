use std::num::NonZeroU64;
use std::time::{Duration, Instant};

const MICROS_PER_SECOND: u128 = 1_000_000;
const MINIMUM_THROTTLE_MICROS: u128 = MICROS_PER_SECOND / 10;
pub(crate) const MIN_WRITE_MAX: usize = 512;

fn calculate_write_max(limit: NonZeroU64, burst: Option<NonZeroU64>) -> usize {
    let kib = if limit.get() < 1024 { 1 } else { limit.get() / 1024 };
    let base = u128::from(kib).saturating_mul(128).max(MIN_WRITE_MAX as u128);
    let mut write_max = base.min(usize::MAX as u128) as usize;

    if let Some(burst) = burst {
        write_max = usize::try_from(burst.get())
            .unwrap_or(usize::MAX)
            .max(MIN_WRITE_MAX);
    }
    write_max.max(MIN_WRITE_MAX)
}

/// A token bucket that never sleeps itself: [`Self::register`] reports how
/// long the caller should wait before its next write, letting the
/// cooperative scheduler poll a deadline instead of blocking a thread.
#[derive(Clone, Debug)]
pub struct TokenBucket {
    limit_bytes: NonZeroU64,
    burst_bytes: Option<NonZeroU64>,
    write_max: usize,
    debt_bytes: u128,
    last_register: Option<Instant>,
}

impl TokenBucket {
    #[must_use]
    pub fn new(limit: NonZeroU64) -> Self {
        Self::with_burst(limit, None)
    }

    #[must_use]
    pub fn with_burst(limit: NonZeroU64, burst: Option<NonZeroU64>) -> Self {
        Self {
            limit_bytes: limit,
            burst_bytes: burst,
            write_max: calculate_write_max(limit, burst),
            debt_bytes: 0,
            last_register: None,
        }
    }

    pub fn update(&mut self, limit: NonZeroU64, burst: Option<NonZeroU64>) {
        *self = Self::with_burst(limit, burst);
    }

    #[must_use]
    pub fn limit_bytes(&self) -> NonZeroU64 {
        self.limit_bytes
    }

    #[must_use]
    pub fn burst_bytes(&self) -> Option<NonZeroU64> {
        self.burst_bytes
    }

    /// The largest chunk that should be read/written before the next
    /// `register` call, clamped to `buffer_len`.
    #[must_use]
    pub fn recommended_chunk(&self, buffer_len: usize) -> usize {
        buffer_len.min(self.write_max.max(1))
    }

    fn clamp_to_burst(&mut self) {
        if let Some(burst) = self.burst_bytes {
            self.debt_bytes = self.debt_bytes.min(u128::from(burst.get()));
        }
    }

    /// Records that `bytes` were just transferred. Returns `Some(instant)`
    /// — the point in time the caller should wait until before sending
    /// more — if the accumulated debt crosses the throttling threshold.
    pub fn register(&mut self, bytes: usize) -> Option<Instant> {
        if bytes == 0 {
            return None;
        }
        let now = Instant::now();
        self.debt_bytes = self.debt_bytes.saturating_add(bytes as u128);
        self.clamp_to_burst();

        let rate = u128::from(self.limit_bytes.get());
        if let Some(previous) = self.last_register {
            let elapsed_us = now.duration_since(previous).as_micros();
            let repaid = elapsed_us.saturating_mul(rate) / MICROS_PER_SECOND;
            self.debt_bytes = self.debt_bytes.saturating_sub(repaid.min(self.debt_bytes));
        }
        self.last_register = Some(now);

        let throttle_us = self.debt_bytes.saturating_mul(MICROS_PER_SECOND) / rate;
        if throttle_us < MINIMUM_THROTTLE_MICROS {
            return None;
        }
        let throttle_us = throttle_us.min(u64::MAX as u128) as u64;
        Some(now + Duration::from_micros(throttle_us))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nz(v: u64) -> NonZeroU64 {
        NonZeroU64::new(v).unwrap()
    }

    #[test]
    fn small_limit_uses_minimum_write_max() {
        assert_eq!(calculate_write_max(nz(100), None), MIN_WRITE_MAX);
    }

    #[test]
    fn large_limit_scales_write_max() {
        assert_eq!(calculate_write_max(nz(1024 * 100), None), 12800);
    }

    #[test]
    fn burst_overrides_calculated_write_max() {
        assert_eq!(calculate_write_max(nz(1024 * 100), Some(nz(8192))), 8192);
    }

    #[test]
    fn register_zero_bytes_is_noop() {
        let mut bucket = TokenBucket::new(nz(10_000));
        assert!(bucket.register(0).is_none());
    }

    #[test]
    fn register_within_rate_does_not_throttle() {
        let mut bucket = TokenBucket::new(nz(1_000_000_000));
        assert!(bucket.register(100).is_none());
    }

    #[test]
    fn register_beyond_burst_clamps_debt() {
        let mut bucket = TokenBucket::with_burst(nz(100), Some(nz(1000)));
        bucket.register(5000);
        assert!(bucket.debt_bytes <= 1000);
    }

    #[test]
    fn slow_limit_reports_future_deadline() {
        let mut bucket = TokenBucket::new(nz(10));
        let deadline = bucket.register(1000);
        assert!(deadline.is_some());
        assert!(deadline.unwrap() > Instant::now());
    }

    #[test]
    fn update_resets_accumulated_debt() {
        let mut bucket = TokenBucket::new(nz(10));
        bucket.register(1000);
        bucket.update(nz(20), None);
        assert_eq!(bucket.debt_bytes, 0);
    }
}
