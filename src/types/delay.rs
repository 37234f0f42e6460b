//! Delay measurement types

use serde::{Deserialize, Serialize};
use std::fmt;

/// One end-to-end delay measurement, in seconds since the Unix epoch.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DelaySample {
    /// Send time parsed from the payload
    pub sent_at: f64,
    /// Local time the unit was received
    pub received_at: f64,
}

impl DelaySample {
    pub fn new(sent_at: f64, received_at: f64) -> Self {
        Self { sent_at, received_at }
    }

    /// Raw delay in seconds (may be negative when clocks disagree).
    pub fn delay(&self) -> f64 {
        self.received_at - self.sent_at
    }

    /// Delay rounded to two decimals, as reported.
    pub fn rounded(&self) -> f64 {
        (self.delay() * 100.0).round() / 100.0
    }
}

impl fmt::Display for DelaySample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Delay: {:.2} s", self.rounded())
    }
}

/// Running aggregate over delay samples; samples themselves are not kept.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DelayStats {
    /// Samples with a valid timestamp
    pub count: u64,
    /// Units whose timestamp could not be parsed or decoded
    pub invalid: u64,
    pub min: Option<f64>,
    pub max: Option<f64>,
    sum: f64,
}

impl DelayStats {
    pub fn record(&mut self, sample: &DelaySample) {
        let delay = sample.delay();
        self.count += 1;
        self.sum += delay;
        self.min = Some(self.min.map_or(delay, |m| m.min(delay)));
        self.max = Some(self.max.map_or(delay, |m| m.max(delay)));
    }

    pub fn record_invalid(&mut self) {
        self.invalid += 1;
    }

    pub fn mean(&self) -> Option<f64> {
        (self.count > 0).then(|| self.sum / self.count as f64)
    }
}

impl fmt::Display for DelayStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.mean(), self.min, self.max) {
            (Some(mean), Some(min), Some(max)) => write!(
                f,
                "{} samples ({} invalid), delay mean {:.2} s, min {:.2} s, max {:.2} s",
                self.count, self.invalid, mean, min, max
            ),
            _ => write!(f, "no samples ({} invalid)", self.invalid),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_rounds_to_two_decimals() {
        let t0 = 1_700_000_000.0;
        let sample = DelaySample::new(t0, t0 + 0.37);
        assert_eq!(sample.rounded(), 0.37);
        assert_eq!(sample.to_string(), "Delay: 0.37 s");

        let sample = DelaySample::new(10.0, 10.126);
        assert_eq!(sample.rounded(), 0.13);
    }

    #[test]
    fn stats_track_extremes_and_mean() {
        let mut stats = DelayStats::default();
        assert_eq!(stats.mean(), None);
        assert_eq!(stats.to_string(), "no samples (0 invalid)");

        stats.record(&DelaySample::new(0.0, 0.5));
        stats.record(&DelaySample::new(0.0, 1.5));
        stats.record_invalid();

        assert_eq!(stats.count, 2);
        assert_eq!(stats.invalid, 1);
        assert_eq!(stats.min, Some(0.5));
        assert_eq!(stats.max, Some(1.5));
        assert_eq!(stats.mean(), Some(1.0));
    }
}
