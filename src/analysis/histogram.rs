use crate::CHI_SQUARE_CRITICAL_5DF;
use crate::Error;
use crate::FaceValue;
use crate::Result;

/// regular-binned histogram over [min, max)
///
/// weights land in the containing bin; values outside the axis are
/// tallied but binless. moments are computed from bin centres, which
/// is all the downstream analytics need.
#[derive(Debug, Clone, PartialEq)]
pub struct Histogram {
    min: f64,
    max: f64,
    bins: Vec<f64>,
    total: f64,
    underflow: f64,
    overflow: f64,
}

impl Histogram {
    pub fn new(bins: usize, min: f64, max: f64) -> Result<Self> {
        if bins == 0 {
            return Err(Error::invalid_parameter("histogram needs at least one bin"));
        }
        if !(max > min) {
            return Err(Error::invalid_parameter(format!(
                "histogram axis is empty: [{}, {})",
                min, max
            )));
        }
        Ok(Self {
            min,
            max,
            bins: vec![0.0; bins],
            total: 0.0,
            underflow: 0.0,
            overflow: 0.0,
        })
    }

    pub fn bin_count(&self) -> usize {
        self.bins.len()
    }

    pub fn bin_width(&self) -> f64 {
        (self.max - self.min) / self.bins.len() as f64
    }

    fn index_of(&self, value: f64) -> Option<usize> {
        if value < self.min || value >= self.max || value.is_nan() {
            return None;
        }
        let index = ((value - self.min) / self.bin_width()) as usize;
        Some(index.min(self.bins.len() - 1))
    }

    pub fn add(&mut self, value: f64) {
        self.add_weighted(value, 1.0);
    }

    pub fn add_weighted(&mut self, value: f64, weight: f64) {
        match self.index_of(value) {
            Some(index) => self.bins[index] += weight,
            None if value < self.min => self.underflow += weight,
            None => self.overflow += weight,
        }
        self.total += weight;
    }

    pub fn add_all(&mut self, values: impl IntoIterator<Item = f64>) {
        for value in values {
            self.add(value);
        }
    }

    /// count in the bin containing value, 0 outside the axis
    pub fn count_at(&self, value: f64) -> f64 {
        self.index_of(value).map(|i| self.bins[i]).unwrap_or(0.0)
    }

    /// weight of everything ever added, in range or not
    pub fn total(&self) -> f64 {
        self.total
    }

    /// weight that landed in a bin
    pub fn binned(&self) -> f64 {
        self.bins.iter().sum()
    }

    pub fn counts(&self) -> &[f64] {
        &self.bins
    }

    pub fn centers(&self) -> Vec<f64> {
        let width = self.bin_width();
        (0..self.bins.len())
            .map(|i| self.min + (i as f64 + 0.5) * width)
            .collect()
    }

    pub fn edges(&self) -> Vec<f64> {
        let width = self.bin_width();
        (0..=self.bins.len())
            .map(|i| self.min + i as f64 * width)
            .collect()
    }

    /// probability density: count / (mass * bin width)
    pub fn normalized(&self) -> Vec<f64> {
        let mass = self.binned();
        if mass == 0.0 {
            return vec![0.0; self.bins.len()];
        }
        let width = self.bin_width();
        self.bins.iter().map(|c| c / (mass * width)).collect()
    }

    /// (centre, count) of the fullest bin
    pub fn mode(&self) -> (f64, f64) {
        if self.binned() == 0.0 {
            return (0.0, 0.0);
        }
        let centers = self.centers();
        let mut best = 0;
        for (i, count) in self.bins.iter().enumerate() {
            if *count > self.bins[best] {
                best = i;
            }
        }
        (centers[best], self.bins[best])
    }

    pub fn mean(&self) -> f64 {
        let mass = self.binned();
        if mass == 0.0 {
            return 0.0;
        }
        self.centers()
            .iter()
            .zip(self.bins.iter())
            .map(|(c, n)| c * n)
            .sum::<f64>()
            / mass
    }

    pub fn variance(&self) -> f64 {
        let mass = self.binned();
        if mass == 0.0 {
            return 0.0;
        }
        let mean = self.mean();
        self.centers()
            .iter()
            .zip(self.bins.iter())
            .map(|(c, n)| (c - mean) * (c - mean) * n)
            .sum::<f64>()
            / mass
    }

    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }

    /// value (bin centre) at percentile p via cumulative count
    pub fn percentile(&self, p: f64) -> f64 {
        let mass = self.binned();
        if mass == 0.0 || !(0.0..=100.0).contains(&p) {
            return 0.0;
        }
        let target = mass * p / 100.0;
        let centers = self.centers();
        let mut cumulative = 0.0;
        for (i, count) in self.bins.iter().enumerate() {
            cumulative += count;
            if cumulative >= target {
                return centers[i];
            }
        }
        self.max - self.bin_width() / 2.0
    }

    /// Shannon entropy over the binned mass, in bits
    pub fn entropy(&self) -> f64 {
        let mass = self.binned();
        if mass == 0.0 {
            return 0.0;
        }
        self.bins
            .iter()
            .filter(|c| **c > 0.0)
            .map(|c| {
                let p = c / mass;
                -p * p.log2()
            })
            .sum()
    }

    /// additive merge; the axes must be identical
    pub fn merge(&mut self, other: &Histogram) -> Result<()> {
        if self.bins.len() != other.bins.len() || self.min != other.min || self.max != other.max {
            return Err(Error::invalid_parameter("histogram axes differ"));
        }
        for (bin, add) in self.bins.iter_mut().zip(other.bins.iter()) {
            *bin += add;
        }
        self.total += other.total;
        self.underflow += other.underflow;
        self.overflow += other.overflow;
        Ok(())
    }

    pub fn reset(&mut self) {
        self.bins.iter_mut().for_each(|b| *b = 0.0);
        self.total = 0.0;
        self.underflow = 0.0;
        self.overflow = 0.0;
    }
}

/// six unit bins, one per face
#[derive(Debug, Clone, PartialEq)]
pub struct DiceHistogram {
    hist: Histogram,
}

impl Default for DiceHistogram {
    fn default() -> Self {
        Self::new()
    }
}

impl DiceHistogram {
    pub fn new() -> Self {
        Self {
            // six bins for faces 1-6; constructor arguments are static and valid
            hist: Histogram::new(6, 1.0, 7.0).expect("static dice axis"),
        }
    }

    /// faces outside 1-6 are dropped
    pub fn add_face(&mut self, face: FaceValue) {
        if (1..=6).contains(&face) {
            self.hist.add(face as f64);
        }
    }

    pub fn add_roll(&mut self, faces: &[FaceValue]) {
        for face in faces {
            self.add_face(*face);
        }
    }

    pub fn count_of(&self, face: FaceValue) -> f64 {
        self.hist.count_at(face as f64)
    }

    pub fn total_rolls(&self) -> f64 {
        self.hist.total()
    }

    pub fn face_probability(&self, face: FaceValue) -> f64 {
        let total = self.hist.total();
        if total == 0.0 {
            0.0
        } else {
            self.count_of(face) / total
        }
    }

    /// chi-square statistic against the uniform die, 5 degrees of freedom
    pub fn chi_square_uniformity(&self) -> f64 {
        let total = self.hist.total();
        if total == 0.0 {
            return 0.0;
        }
        let expected = total / 6.0;
        (1..=6)
            .map(|face| {
                let observed = self.count_of(face);
                let diff = observed - expected;
                diff * diff / expected
            })
            .sum()
    }

    /// true iff the chi-square statistic stays under the 0.05 critical value
    pub fn is_fair(&self) -> bool {
        self.chi_square_uniformity() < CHI_SQUARE_CRITICAL_5DF
    }

    pub fn inner(&self) -> &Histogram {
        &self.hist
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-9;

    #[test]
    fn rejects_degenerate_axes() {
        assert!(Histogram::new(0, 0.0, 1.0).is_err());
        assert!(Histogram::new(4, 1.0, 1.0).is_err());
        assert!(Histogram::new(4, 2.0, 1.0).is_err());
    }

    #[test]
    fn values_land_in_their_bin() {
        let mut h = Histogram::new(4, 0.0, 4.0).unwrap();
        h.add_all([0.5, 1.5, 1.9, 3.999]);
        assert_eq!(h.counts(), &[1.0, 2.0, 0.0, 1.0]);
        assert_eq!(h.count_at(1.2), 2.0);
        // half-open axis: max itself overflows
        h.add(4.0);
        assert_eq!(h.binned(), 4.0);
        assert_eq!(h.total(), 5.0);
    }

    #[test]
    fn weighted_adds() {
        let mut h = Histogram::new(2, 0.0, 2.0).unwrap();
        h.add_weighted(0.5, 2.5);
        h.add_weighted(1.5, 1.5);
        assert!((h.total() - 4.0).abs() < EPS);
        assert!((h.count_at(0.0) - 2.5).abs() < EPS);
    }

    #[test]
    fn density_integrates_to_one() {
        let mut h = Histogram::new(5, 0.0, 10.0).unwrap();
        h.add_all([1.0, 3.0, 5.0, 7.0, 9.0]);
        let area: f64 = h.normalized().iter().map(|d| d * h.bin_width()).sum();
        assert!((area - 1.0).abs() < EPS);
    }

    #[test]
    fn mode_and_moments_from_centres() {
        let mut h = Histogram::new(3, 0.0, 3.0).unwrap();
        h.add_all([0.5, 1.5, 1.5, 2.5]);
        let (center, count) = h.mode();
        assert!((center - 1.5).abs() < EPS);
        assert!((count - 2.0).abs() < EPS);
        assert!((h.mean() - 1.5).abs() < EPS);
        assert!((h.variance() - 0.5).abs() < EPS);
    }

    #[test]
    fn percentile_walks_cumulative_mass() {
        let mut h = Histogram::new(4, 0.0, 4.0).unwrap();
        h.add_all([0.5, 1.5, 2.5, 3.5]);
        assert!((h.percentile(25.0) - 0.5).abs() < EPS);
        assert!((h.percentile(100.0) - 3.5).abs() < EPS);
        assert_eq!(h.percentile(-1.0), 0.0);
    }

    #[test]
    fn entropy_of_uniform_bins() {
        let mut h = Histogram::new(4, 0.0, 4.0).unwrap();
        h.add_all([0.5, 1.5, 2.5, 3.5]);
        assert!((h.entropy() - 2.0).abs() < EPS);
        let mut point = Histogram::new(4, 0.0, 4.0).unwrap();
        point.add_all([0.5, 0.5]);
        assert!(point.entropy().abs() < EPS);
    }

    #[test]
    fn merge_requires_matching_axis() {
        let mut a = Histogram::new(4, 0.0, 4.0).unwrap();
        let mut b = Histogram::new(4, 0.0, 4.0).unwrap();
        a.add(0.5);
        b.add(0.5);
        b.add(3.5);
        a.merge(&b).unwrap();
        assert_eq!(a.count_at(0.5), 2.0);
        assert_eq!(a.total(), 3.0);
        let c = Histogram::new(5, 0.0, 4.0).unwrap();
        assert!(a.merge(&c).is_err());
    }

    #[test]
    fn fair_die_stays_fair() {
        let mut dice = DiceHistogram::new();
        for _ in 0..100 {
            for face in 1..=6 {
                dice.add_face(face);
            }
        }
        assert!(dice.is_fair());
        assert!((dice.chi_square_uniformity()).abs() < EPS);
        assert!((dice.face_probability(3) - 1.0 / 6.0).abs() < EPS);
    }

    #[test]
    fn loaded_die_is_caught() {
        let mut dice = DiceHistogram::new();
        for _ in 0..200 {
            dice.add_face(6);
        }
        for face in 1..=5 {
            for _ in 0..20 {
                dice.add_face(face);
            }
        }
        assert!(!dice.is_fair());
        assert!(dice.chi_square_uniformity() >= CHI_SQUARE_CRITICAL_5DF);
    }

    #[test]
    fn out_of_range_faces_dropped() {
        let mut dice = DiceHistogram::new();
        dice.add_face(0);
        dice.add_face(7);
        assert_eq!(dice.total_rolls(), 0.0);
        assert!(dice.is_fair());
    }
}
