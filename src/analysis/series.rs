use crate::DEFAULT_SERIES_CAPACITY;
use crate::collections::CircularBuffer;
use std::time::Duration;
use std::time::Instant;

/// one timestamped observation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    pub at: Instant,
    pub value: f64,
}

/// bounded time series with the usual trend machinery
///
/// points ride a ring, so the series keeps the newest `capacity`
/// observations. timestamps are monotonic instants; `push_at` exists
/// for callers (and tests) that drive their own clock and must stay
/// non-decreasing.
#[derive(Debug, Clone)]
pub struct TimeSeries {
    ring: CircularBuffer<Sample>,
}

impl Default for TimeSeries {
    fn default() -> Self {
        Self::new(DEFAULT_SERIES_CAPACITY)
    }
}

impl TimeSeries {
    pub fn new(capacity: usize) -> Self {
        Self {
            ring: CircularBuffer::new(capacity),
        }
    }

    pub fn push(&mut self, value: f64) {
        self.push_at(Instant::now(), value);
    }

    pub fn push_at(&mut self, at: Instant, value: f64) {
        self.ring.push_back(Sample { at, value });
    }

    pub fn len(&self) -> usize {
        self.ring.len()
    }
    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }
    pub fn capacity(&self) -> usize {
        self.ring.capacity()
    }

    pub fn latest(&self) -> Option<f64> {
        self.ring.back().map(|s| s.value)
    }

    pub fn oldest(&self) -> Option<f64> {
        self.ring.front().map(|s| s.value)
    }

    pub fn values(&self) -> Vec<f64> {
        self.ring.iter().map(|s| s.value).collect()
    }

    pub fn samples(&self) -> Vec<Sample> {
        self.ring.iter().copied().collect()
    }

    pub fn clear(&mut self) {
        self.ring.clear();
    }

    /// values no older than `duration` before the newest point,
    /// chronological
    pub fn window(&self, duration: Duration) -> Vec<f64> {
        let Some(newest) = self.ring.back() else {
            return Vec::new();
        };
        self.ring
            .iter()
            .filter(|s| newest.at.saturating_duration_since(s.at) <= duration)
            .map(|s| s.value)
            .collect()
    }

    /// simple moving average; empty until `periods` points exist
    pub fn sma(&self, periods: usize) -> Vec<f64> {
        let values = self.values();
        if periods == 0 || values.len() < periods {
            return Vec::new();
        }
        let mut averages = Vec::with_capacity(values.len() - periods + 1);
        let mut sum: f64 = values.iter().take(periods).sum();
        averages.push(sum / periods as f64);
        for i in periods..values.len() {
            sum += values[i] - values[i - periods];
            averages.push(sum / periods as f64);
        }
        averages
    }

    /// exponential moving average; alpha outside (0, 1) yields nothing
    pub fn ema(&self, alpha: f64) -> Vec<f64> {
        let values = self.values();
        if values.is_empty() || alpha <= 0.0 || alpha >= 1.0 {
            return Vec::new();
        }
        let mut averages = Vec::with_capacity(values.len());
        averages.push(values[0]);
        for value in values.iter().skip(1) {
            let last = averages[averages.len() - 1];
            averages.push(alpha * value + (1.0 - alpha) * last);
        }
        averages
    }

    /// least-squares (slope, intercept) over seconds since the first point
    pub fn trend(&self) -> (f64, f64) {
        let samples = self.samples();
        if samples.len() < 2 {
            return (0.0, 0.0);
        }
        let first = samples[0].at;
        let n = samples.len() as f64;
        let xs = samples
            .iter()
            .map(|s| s.at.saturating_duration_since(first).as_secs_f64())
            .collect::<Vec<f64>>();
        let ys = samples.iter().map(|s| s.value).collect::<Vec<f64>>();
        let sum_x: f64 = xs.iter().sum();
        let sum_y: f64 = ys.iter().sum();
        let sum_xy: f64 = xs.iter().zip(ys.iter()).map(|(x, y)| x * y).sum();
        let sum_xx: f64 = xs.iter().map(|x| x * x).sum();
        let denominator = n * sum_xx - sum_x * sum_x;
        if denominator == 0.0 {
            return (0.0, sum_y / n);
        }
        let slope = (n * sum_xy - sum_x * sum_y) / denominator;
        let intercept = (sum_y - slope * sum_x) / n;
        (slope, intercept)
    }

    /// percent change against the value k periods back
    pub fn rate_of_change(&self, periods: usize) -> Option<f64> {
        let values = self.values();
        if values.len() <= periods {
            return None;
        }
        let old = values[values.len() - periods - 1];
        let new = values[values.len() - 1];
        if old == 0.0 {
            return None;
        }
        Some((new - old) / old * 100.0)
    }

    /// indices whose z-score (population) exceeds the threshold
    pub fn outliers(&self, threshold: f64) -> Vec<usize> {
        let values = self.values();
        if values.len() < 3 {
            return Vec::new();
        }
        let n = values.len() as f64;
        let mean = values.iter().sum::<f64>() / n;
        let variance = values.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / n;
        let std_dev = variance.sqrt();
        if std_dev == 0.0 {
            return Vec::new();
        }
        values
            .iter()
            .enumerate()
            .filter(|(_, v)| ((**v - mean) / std_dev).abs() > threshold)
            .map(|(i, _)| i)
            .collect()
    }

    /// autocorrelation coefficient at the given lag
    pub fn autocorrelation(&self, lag: usize) -> Option<f64> {
        let values = self.values();
        if lag >= values.len() {
            return None;
        }
        let n = values.len() as f64;
        let mean = values.iter().sum::<f64>() / n;
        let numerator: f64 = (0..values.len() - lag)
            .map(|i| (values[i] - mean) * (values[i + lag] - mean))
            .sum();
        let denominator: f64 = values.iter().map(|v| (v - mean) * (v - mean)).sum();
        if denominator == 0.0 {
            return None;
        }
        Some(numerator / denominator)
    }

    /// nearest-neighbour resample on a fixed grid from first to last
    pub fn resample(&self, interval: Duration) -> TimeSeries {
        let mut resampled = TimeSeries::new(self.capacity());
        let samples = self.samples();
        if samples.is_empty() || interval.is_zero() {
            return resampled;
        }
        let first = samples[0].at;
        let last = samples[samples.len() - 1].at;
        let mut grid = first;
        loop {
            let nearest = samples
                .iter()
                .min_by_key(|s| {
                    s.at.saturating_duration_since(grid)
                        .max(grid.saturating_duration_since(s.at))
                })
                .map(|s| s.value);
            if let Some(value) = nearest {
                resampled.push_at(grid, value);
            }
            match grid.checked_add(interval) {
                Some(next) if next <= last => grid = next,
                _ => break,
            }
        }
        resampled
    }
}
