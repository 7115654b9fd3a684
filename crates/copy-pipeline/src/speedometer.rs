//! An exponentially-smoothed rate meter, lftp's `Speedometer`: each sample
//! decays the running average rather than windowing a fixed sample buffer,
//! so the rate a caller reads is always cheap to compute and never needs a
//! ring buffer of timestamps.

use std::time::{Duration, Instant};

/// How much weight a sample more than one `period` old retains; smaller is
/// smoother (slower to react), larger tracks recent bursts more closely.
const DECAY_PER_PERIOD: f64 = 0.3;

#[derive(Clone, Debug)]
pub struct Speedometer {
    period: Duration,
    rate: f64,
    last_sample: Option<Instant>,
    start: Option<Instant>,
}

impl Speedometer {
    #[must_use]
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            rate: 0.0,
            last_sample: None,
            start: None,
        }
    }

    /// Records `bytes` transferred just now, decaying the running rate by
    /// how long it's been since the previous sample.
    pub fn add(&mut self, bytes: u64) {
        let now = Instant::now();
        self.start.get_or_insert(now);
        if let Some(last) = self.last_sample {
            let elapsed = now.duration_since(last).as_secs_f64();
            let periods = elapsed / self.period.as_secs_f64().max(f64::EPSILON);
            let decay = DECAY_PER_PERIOD.powf(periods);
            let instantaneous = bytes as f64 / elapsed.max(f64::EPSILON);
            self.rate = self.rate * decay + instantaneous * (1.0 - decay);
        } else {
            self.rate = 0.0;
        }
        self.last_sample = Some(now);
    }

    /// Resets the meter to a fresh start, used when a copy restarts after a
    /// reconnect so the displayed rate doesn't dip to reflect the stall.
    pub fn reset(&mut self) {
        self.rate = 0.0;
        self.last_sample = None;
        self.start = None;
    }

    #[must_use]
    pub fn rate(&self) -> f64 {
        self.rate
    }

    /// Seconds remaining to transfer `bytes_remaining` at the current rate,
    /// or `None` if the rate is still zero (nothing sampled yet).
    #[must_use]
    pub fn eta(&self, bytes_remaining: u64) -> Option<Duration> {
        if self.rate <= 0.0 {
            return None;
        }
        Some(Duration::from_secs_f64(bytes_remaining as f64 / self.rate))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_meter_has_zero_rate_and_no_eta() {
        let meter = Speedometer::new(Duration::from_secs(30));
        assert_eq!(meter.rate(), 0.0);
        assert_eq!(meter.eta(1000), None);
    }

    #[test]
    fn a_single_sample_seeds_no_rate() {
        let mut meter = Speedometer::new(Duration::from_secs(30));
        meter.add(1000);
        assert_eq!(meter.rate(), 0.0);
    }

    #[test]
    fn two_samples_apart_produce_a_positive_rate() {
        let mut meter = Speedometer::new(Duration::from_secs(1));
        meter.add(0);
        std::thread::sleep(Duration::from_millis(20));
        meter.add(2000);
        assert!(meter.rate() > 0.0);
        assert!(meter.eta(2000).is_some());
    }

    #[test]
    fn reset_clears_accumulated_rate() {
        let mut meter = Speedometer::new(Duration::from_secs(1));
        meter.add(0);
        std::thread::sleep(Duration::from_millis(20));
        meter.add(2000);
        meter.reset();
        assert_eq!(meter.rate(), 0.0);
    }
}
