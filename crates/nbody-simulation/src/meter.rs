//! Windowed step timing

use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Number of recent steps averaged by default.
pub const DEFAULT_WINDOW: usize = 100;

/// Wall-clock time of recent steps, averaged over a sliding window.
#[derive(Debug, Clone)]
pub struct StepMeter {
    samples: VecDeque<f64>,
    window: usize,
    started: Option<Instant>,
}

impl Default for StepMeter {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW)
    }
}

impl StepMeter {
    pub fn new(window: usize) -> Self {
        let window = window.max(1);
        Self {
            samples: VecDeque::with_capacity(window),
            window,
            started: None,
        }
    }

    pub fn begin(&mut self) {
        self.started = Some(Instant::now());
    }

    /// Close the sample opened by [`StepMeter::begin`].
    pub fn end(&mut self) -> Option<Duration> {
        let elapsed = self.started.take()?.elapsed();
        self.record(elapsed);
        Some(elapsed)
    }

    pub fn record(&mut self, elapsed: Duration) {
        self.samples.push_back(elapsed.as_secs_f64());
        if self.samples.len() > self.window {
            self.samples.pop_front();
        }
    }

    pub fn reset(&mut self) {
        self.samples.clear();
        self.started = None;
    }

    /// Mean step time in seconds, or zero before the first sample.
    pub fn mean_seconds(&self) -> f64 {
        if self.samples.is_empty() {
            return 0.0;
        }
        self.samples.iter().sum::<f64>() / self.samples.len() as f64
    }

    /// `work` units per second at the mean step time.
    pub fn rate(&self, work: f64) -> f64 {
        let mean = self.mean_seconds();
        if mean > 0.0 {
            work / mean
        } else {
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_drops_oldest_samples() {
        let mut meter = StepMeter::new(2);
        meter.record(Duration::from_secs(10));
        meter.record(Duration::from_millis(100));
        meter.record(Duration::from_millis(300));
        assert!((meter.mean_seconds() - 0.2).abs() < 1e-9);
        assert!((meter.rate(1000.0) - 5000.0).abs() < 1e-6);
    }

    #[test]
    fn empty_meter_reports_zero() {
        let mut meter = StepMeter::default();
        assert_eq!(meter.rate(1.0), 0.0);
        assert_eq!(meter.end(), None);
        meter.begin();
        assert!(meter.end().is_some());
        meter.reset();
        assert_eq!(meter.mean_seconds(), 0.0);
    }
}
