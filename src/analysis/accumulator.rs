use crate::DEFAULT_ROLLING_WINDOW;
use std::collections::VecDeque;

/// everything the accumulator knows, in one struct
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Summary {
    pub count: u64,
    pub mean: f64,
    pub std_dev: f64,
    pub min: f64,
    pub max: f64,
    pub range: f64,
    pub median: f64,
    pub skewness: f64,
    pub kurtosis: f64,
    pub cv: f64,
    pub rms: f64,
    pub rolling_mean: f64,
    pub rolling_std_dev: f64,
}

/// single-pass running statistics
///
/// central moments are maintained incrementally (Welford's recurrences
/// up to the fourth moment), so mean/variance/skew/kurtosis never
/// re-scan. the sample list is retained only for the exact median.
/// rolling statistics cover the newest WINDOW values.
#[derive(Debug, Clone)]
pub struct Accumulator<const WINDOW: usize = DEFAULT_ROLLING_WINDOW> {
    count: u64,
    mean: f64,
    m2: f64,
    m3: f64,
    m4: f64,
    min: f64,
    max: f64,
    sum_squares: f64,
    samples: Vec<f64>,
    window: VecDeque<f64>,
    window_sum: f64,
    window_sum_squares: f64,
}

impl<const WINDOW: usize> Default for Accumulator<WINDOW> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const WINDOW: usize> Accumulator<WINDOW> {
    pub fn new() -> Self {
        Self {
            count: 0,
            mean: 0.0,
            m2: 0.0,
            m3: 0.0,
            m4: 0.0,
            min: 0.0,
            max: 0.0,
            sum_squares: 0.0,
            samples: Vec::new(),
            window: VecDeque::with_capacity(WINDOW + 1),
            window_sum: 0.0,
            window_sum_squares: 0.0,
        }
    }

    pub fn add(&mut self, value: f64) {
        if self.count == 0 {
            self.min = value;
            self.max = value;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);
        }

        let n1 = self.count as f64;
        self.count += 1;
        let n = self.count as f64;
        let delta = value - self.mean;
        let delta_n = delta / n;
        let delta_n2 = delta_n * delta_n;
        let term = delta * delta_n * n1;
        self.mean += delta_n;
        self.m4 += term * delta_n2 * (n * n - 3.0 * n + 3.0) + 6.0 * delta_n2 * self.m2
            - 4.0 * delta_n * self.m3;
        self.m3 += term * delta_n * (n - 2.0) - 3.0 * delta_n * self.m2;
        self.m2 += term;

        self.sum_squares += value * value;
        self.samples.push(value);

        self.window.push_back(value);
        self.window_sum += value;
        self.window_sum_squares += value * value;
        if self.window.len() > WINDOW {
            if let Some(evicted) = self.window.pop_front() {
                self.window_sum -= evicted;
                self.window_sum_squares -= evicted * evicted;
            }
        }
    }

    pub fn add_all(&mut self, values: impl IntoIterator<Item = f64>) {
        for value in values {
            self.add(value);
        }
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn mean(&self) -> f64 {
        self.mean
    }

    /// sample variance, divisor n - 1
    pub fn variance(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            self.m2 / (self.count as f64 - 1.0)
        }
    }

    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }

    pub fn min(&self) -> f64 {
        self.min
    }
    pub fn max(&self) -> f64 {
        self.max
    }
    pub fn range(&self) -> f64 {
        self.max - self.min
    }

    /// exact median of everything seen
    pub fn median(&self) -> f64 {
        if self.samples.is_empty() {
            return 0.0;
        }
        let mut sorted = self.samples.clone();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        let mid = sorted.len() / 2;
        if sorted.len() % 2 == 1 {
            sorted[mid]
        } else {
            (sorted[mid - 1] + sorted[mid]) / 2.0
        }
    }

    pub fn skewness(&self) -> f64 {
        if self.count < 2 || self.m2 == 0.0 {
            return 0.0;
        }
        let n = self.count as f64;
        n.sqrt() * self.m3 / self.m2.powf(1.5)
    }

    /// Pearson kurtosis; approaches 3 for a normal distribution
    pub fn kurtosis(&self) -> f64 {
        if self.count < 2 || self.m2 == 0.0 {
            return 0.0;
        }
        let n = self.count as f64;
        n * self.m4 / (self.m2 * self.m2)
    }

    /// k-th central moment, k in 2..=4
    pub fn moment(&self, k: u32) -> f64 {
        if self.count == 0 {
            return 0.0;
        }
        let n = self.count as f64;
        match k {
            2 => self.m2 / n,
            3 => self.m3 / n,
            4 => self.m4 / n,
            _ => 0.0,
        }
    }

    pub fn coefficient_of_variation(&self) -> f64 {
        if self.mean == 0.0 {
            0.0
        } else {
            self.std_dev() / self.mean.abs()
        }
    }

    pub fn rms(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            (self.sum_squares / self.count as f64).sqrt()
        }
    }

    pub fn rolling_mean(&self) -> f64 {
        if self.window.is_empty() {
            0.0
        } else {
            self.window_sum / self.window.len() as f64
        }
    }

    pub fn rolling_variance(&self) -> f64 {
        let n = self.window.len() as f64;
        if self.window.len() < 2 {
            return 0.0;
        }
        let centered = self.window_sum_squares - self.window_sum * self.window_sum / n;
        (centered / (n - 1.0)).max(0.0)
    }

    pub fn rolling_std_dev(&self) -> f64 {
        self.rolling_variance().sqrt()
    }

    /// rule-of-thumb normality: |skew| < 2 and |kurtosis - 3| < 7
    pub fn is_normal_distributed(&self) -> bool {
        self.skewness().abs() < 2.0 && (self.kurtosis() - 3.0).abs() < 7.0
    }

    pub fn summary(&self) -> Summary {
        Summary {
            count: self.count,
            mean: self.mean(),
            std_dev: self.std_dev(),
            min: self.min(),
            max: self.max(),
            range: self.range(),
            median: self.median(),
            skewness: self.skewness(),
            kurtosis: self.kurtosis(),
            cv: self.coefficient_of_variation(),
            rms: self.rms(),
            rolling_mean: self.rolling_mean(),
            rolling_std_dev: self.rolling_std_dev(),
        }
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-9;

    #[test]
    fn moments_against_known_set() {
        let mut acc = Accumulator::<100>::new();
        acc.add_all([2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]);
        assert_eq!(acc.count(), 8);
        assert!((acc.mean() - 5.0).abs() < EPS);
        // sample variance of the classic set: 32 / 7
        assert!((acc.variance() - 32.0 / 7.0).abs() < EPS);
        assert!((acc.min() - 2.0).abs() < EPS);
        assert!((acc.max() - 9.0).abs() < EPS);
        assert!((acc.range() - 7.0).abs() < EPS);
        assert!((acc.median() - 4.5).abs() < EPS);
    }

    #[test]
    fn rms_and_cv() {
        let mut acc = Accumulator::<10>::new();
        acc.add_all([3.0, 4.0]);
        assert!((acc.rms() - (12.5f64).sqrt()).abs() < EPS);
        assert!(acc.coefficient_of_variation() > 0.0);
    }

    #[test]
    fn skewness_sign_tracks_tail() {
        let mut right = Accumulator::<100>::new();
        right.add_all([1.0, 1.0, 1.0, 1.0, 10.0]);
        assert!(right.skewness() > 0.0);
        let mut left = Accumulator::<100>::new();
        left.add_all([10.0, 10.0, 10.0, 10.0, 1.0]);
        assert!(left.skewness() < 0.0);
    }

    #[test]
    fn symmetric_set_has_zero_skew() {
        let mut acc = Accumulator::<100>::new();
        acc.add_all([1.0, 2.0, 3.0, 4.0, 5.0]);
        assert!(acc.skewness().abs() < EPS);
        assert!(acc.is_normal_distributed());
    }

    #[test]
    fn kurtosis_of_uniformish_set_is_low() {
        let mut acc = Accumulator::<100>::new();
        acc.add_all((1..=100).map(|i| i as f64));
        // continuous uniform kurtosis is 1.8
        assert!((acc.kurtosis() - 1.8).abs() < 0.1);
    }

    #[test]
    fn rolling_window_tracks_newest() {
        let mut acc = Accumulator::<3>::new();
        acc.add_all([100.0, 100.0, 1.0, 2.0, 3.0]);
        assert!((acc.rolling_mean() - 2.0).abs() < EPS);
        assert!((acc.rolling_variance() - 1.0).abs() < EPS);
        // lifetime mean still sees everything
        assert!((acc.mean() - 41.2).abs() < EPS);
    }

    #[test]
    fn constant_stream_degenerates_cleanly() {
        let mut acc = Accumulator::<4>::new();
        acc.add_all([5.0; 10]);
        assert_eq!(acc.variance(), 0.0);
        assert_eq!(acc.skewness(), 0.0);
        assert_eq!(acc.kurtosis(), 0.0);
        assert!((acc.rms() - 5.0).abs() < EPS);
    }

    #[test]
    fn reset_forgets() {
        let mut acc = Accumulator::<4>::new();
        acc.add_all([1.0, 2.0]);
        acc.reset();
        assert_eq!(acc.count(), 0);
        assert_eq!(acc.mean(), 0.0);
        assert_eq!(acc.summary(), Summary::default());
    }
}
