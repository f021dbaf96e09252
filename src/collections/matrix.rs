use crate::Error;
use crate::Result;
use std::collections::BTreeMap;
use std::ops::Add;
use std::ops::AddAssign;
use std::ops::Div;
use std::ops::Mul;

/// row/col indexed sparse storage for interaction counts and
/// transition weights. writing the additive identity erases the cell,
/// so the map only ever holds structural non-zeros.
#[derive(Debug, Clone)]
pub struct SparseMatrix<T> {
    rows: usize,
    cols: usize,
    cells: BTreeMap<(usize, usize), T>,
}

impl<T> SparseMatrix<T>
where
    T: Copy + Default + PartialEq + PartialOrd + Add<Output = T> + AddAssign,
{
    pub fn new(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            cells: BTreeMap::new(),
        }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }
    pub fn cols(&self) -> usize {
        self.cols
    }
    /// number of stored (non-zero) cells
    pub fn len(&self) -> usize {
        self.cells.len()
    }
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn get(&self, row: usize, col: usize) -> T {
        self.cells.get(&(row, col)).copied().unwrap_or_default()
    }

    /// out-of-bounds writes are dropped; zero writes erase
    pub fn set(&mut self, row: usize, col: usize, value: T) {
        if row >= self.rows || col >= self.cols {
            return;
        }
        if value == T::default() {
            self.cells.remove(&(row, col));
        } else {
            self.cells.insert((row, col), value);
        }
    }

    pub fn increment(&mut self, row: usize, col: usize, delta: T) {
        let mut value = self.get(row, col);
        value += delta;
        self.set(row, col, value);
    }

    pub fn row(&self, row: usize) -> Vec<T> {
        let mut values = vec![T::default(); self.cols];
        for (&(_, col), &value) in self.cells.range((row, 0)..=(row, usize::MAX)) {
            values[col] = value;
        }
        values
    }

    pub fn column(&self, col: usize) -> Vec<T> {
        let mut values = vec![T::default(); self.rows];
        for (&(row, c), &value) in self.cells.iter() {
            if c == col {
                values[row] = value;
            }
        }
        values
    }

    pub fn row_sums(&self) -> Vec<T> {
        let mut sums = vec![T::default(); self.rows];
        for (&(row, _), &value) in self.cells.iter() {
            sums[row] += value;
        }
        sums
    }

    pub fn column_sums(&self) -> Vec<T> {
        let mut sums = vec![T::default(); self.cols];
        for (&(_, col), &value) in self.cells.iter() {
            sums[col] += value;
        }
        sums
    }

    pub fn for_each<F>(&self, mut f: F)
    where
        F: FnMut(usize, usize, T),
    {
        for (&(row, col), &value) in self.cells.iter() {
            f(row, col, value);
        }
    }

    /// stored cells in descending value order, at most n of them
    pub fn top_n(&self, n: usize) -> Vec<(usize, usize, T)> {
        let mut cells = self
            .cells
            .iter()
            .map(|(&(row, col), &value)| (row, col, value))
            .collect::<Vec<_>>();
        cells.sort_by(|a, b| b.2.partial_cmp(&a.2).unwrap_or(std::cmp::Ordering::Equal));
        cells.truncate(n);
        cells
    }
}

impl<T> SparseMatrix<T>
where
    T: Copy
        + Default
        + PartialEq
        + PartialOrd
        + Add<Output = T>
        + AddAssign
        + Mul<Output = T>
        + Div<Output = T>,
{
    /// each non-empty row scaled so it sums to one
    pub fn normalize_rows(&self) -> SparseMatrix<T> {
        let sums = self.row_sums();
        let mut normalized = SparseMatrix::new(self.rows, self.cols);
        self.for_each(|row, col, value| {
            if sums[row] != T::default() {
                normalized.set(row, col, value / sums[row]);
            }
        });
        normalized
    }

    /// dense-compatible product; shapes must agree
    pub fn multiply(&self, other: &SparseMatrix<T>) -> Result<SparseMatrix<T>> {
        if self.cols != other.rows {
            return Err(Error::invalid_parameter(format!(
                "shape mismatch: {}x{} * {}x{}",
                self.rows, self.cols, other.rows, other.cols
            )));
        }
        let mut product = SparseMatrix::new(self.rows, other.cols);
        for (&(i, k), &left) in self.cells.iter() {
            for (&(_, j), &right) in other.cells.range((k, 0)..=(k, usize::MAX)) {
                product.increment(i, j, left * right);
            }
        }
        Ok(product)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_write_erases() {
        let mut m = SparseMatrix::new(3, 3);
        m.set(1, 1, 5.0);
        assert_eq!(m.len(), 1);
        m.set(1, 1, 0.0);
        assert_eq!(m.len(), 0);
        assert_eq!(m.get(1, 1), 0.0);
    }

    #[test]
    fn out_of_bounds_write_is_dropped() {
        let mut m = SparseMatrix::new(2, 2);
        m.set(5, 0, 1.0);
        m.set(0, 5, 1.0);
        assert!(m.is_empty());
    }

    #[test]
    fn sums_by_row_and_column() {
        let mut m = SparseMatrix::new(2, 3);
        m.set(0, 0, 1.0);
        m.set(0, 2, 2.0);
        m.set(1, 2, 3.0);
        assert_eq!(m.row_sums(), vec![3.0, 3.0]);
        assert_eq!(m.column_sums(), vec![1.0, 0.0, 5.0]);
        assert_eq!(m.row(0), vec![1.0, 0.0, 2.0]);
        assert_eq!(m.column(2), vec![2.0, 3.0]);
    }

    #[test]
    fn top_n_descends() {
        let mut m = SparseMatrix::new(3, 3);
        m.set(0, 0, 1.0);
        m.set(1, 1, 9.0);
        m.set(2, 2, 5.0);
        let top = m.top_n(2);
        assert_eq!(top, vec![(1, 1, 9.0), (2, 2, 5.0)]);
    }

    #[test]
    fn rows_normalize_to_one() {
        let mut m: SparseMatrix<f64> = SparseMatrix::new(2, 2);
        m.set(0, 0, 1.0);
        m.set(0, 1, 3.0);
        let n = m.normalize_rows();
        assert!((n.get(0, 0) - 0.25).abs() < 1e-9);
        assert!((n.get(0, 1) - 0.75).abs() < 1e-9);
        assert_eq!(n.row(1), vec![0.0, 0.0]);
    }

    #[test]
    fn product_matches_dense() {
        let mut a = SparseMatrix::new(2, 3);
        a.set(0, 0, 1.0);
        a.set(0, 1, 2.0);
        a.set(1, 2, 4.0);
        let mut b = SparseMatrix::new(3, 2);
        b.set(0, 0, 1.0);
        b.set(1, 0, 1.0);
        b.set(2, 1, 2.0);
        let p = a.multiply(&b).unwrap();
        assert_eq!(p.get(0, 0), 3.0);
        assert_eq!(p.get(1, 1), 8.0);
        assert_eq!(p.get(1, 0), 0.0);
    }

    #[test]
    fn product_shape_check() {
        let a = SparseMatrix::<f64>::new(2, 3);
        let b = SparseMatrix::<f64>::new(2, 3);
        assert!(matches!(
            a.multiply(&b),
            Err(Error::InvalidParameter(message)) if message.contains("shape mismatch")
        ));
    }
}
