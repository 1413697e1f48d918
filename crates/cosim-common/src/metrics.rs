//! ---
//! cosim_section: "01-core-functionality"
//! cosim_subsection: "module"
//! cosim_type: "source"
//! cosim_scope: "code"
//! cosim_description: "Wall-clock timing of co-simulation steps."
//! cosim_version: "v0.0.0-prealpha"
//! cosim_owner: "tbd"
//! ---
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Collects per-step wall-clock durations.
#[derive(Debug, Default)]
pub struct StepTimingHistogram {
    samples: Mutex<Vec<f64>>,
}

impl StepTimingHistogram {
    pub fn record(&self, elapsed: Duration) {
        let micros = elapsed.as_secs_f64() * 1_000_000.0;
        self.samples.lock().push(micros);
    }

    /// Start timing a step; the returned guard records on drop.
    pub fn start(&self) -> StepTimer<'_> {
        StepTimer {
            histogram: self,
            started: Instant::now(),
        }
    }

    pub fn len(&self) -> usize {
        self.samples.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn summary(&self) -> Option<StepTimingSummary> {
        let samples = self.samples.lock();
        let slice = samples.as_slice();
        if slice.is_empty() {
            return None;
        }
        let count = slice.len() as f64;
        let mean = slice.iter().sum::<f64>() / count;
        let variance = if slice.len() > 1 {
            let sum_sq = slice
                .iter()
                .map(|value| {
                    let delta = value - mean;
                    delta * delta
                })
                .sum::<f64>();
            sum_sq / (count - 1.0)
        } else {
            0.0
        };
        let max = slice.iter().copied().fold(f64::MIN, f64::max);
        let min = slice.iter().copied().fold(f64::MAX, f64::min);
        Some(StepTimingSummary {
            mean_us: mean,
            std_dev_us: variance.sqrt(),
            max_us: max,
            min_us: min,
            samples: slice.len() as u64,
        })
    }
}

/// Records the time between its creation and drop into a [`StepTimingHistogram`].
#[derive(Debug)]
pub struct StepTimer<'a> {
    histogram: &'a StepTimingHistogram,
    started: Instant,
}

impl Drop for StepTimer<'_> {
    fn drop(&mut self) {
        self.histogram.record(self.started.elapsed());
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepTimingSummary {
    pub mean_us: f64,
    pub std_dev_us: f64,
    pub max_us: f64,
    pub min_us: f64,
    pub samples: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_reports_spread() {
        let histogram = StepTimingHistogram::default();
        assert!(histogram.summary().is_none());
        histogram.record(Duration::from_micros(100));
        histogram.record(Duration::from_micros(300));
        let summary = histogram.summary().unwrap();
        assert_eq!(summary.samples, 2);
        assert!((summary.mean_us - 200.0).abs() < 1e-6);
        assert!((summary.min_us - 100.0).abs() < 1e-6);
        assert!((summary.max_us - 300.0).abs() < 1e-6);
        assert!(summary.std_dev_us > 0.0);
    }

    #[test]
    fn timer_records_on_drop() {
        let histogram = StepTimingHistogram::default();
        {
            let _timer = histogram.start();
        }
        assert_eq!(histogram.len(), 1);
    }
}
