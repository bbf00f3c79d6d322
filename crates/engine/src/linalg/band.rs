use weft_core::JacobianColumns;

/// Banded matrix in column-major band storage.
///
/// Column `j` stores rows `j - stored_upper ..= j + lower`, where
/// `stored_upper = min(size - 1, upper + lower)` leaves room for the fill-in
/// produced by partial pivoting.
#[derive(Debug, Clone, PartialEq)]
pub struct BandMatrix {
    size: usize,
    upper: usize,
    lower: usize,
    stored_upper: usize,
    data: Vec<f64>,
}

impl BandMatrix {
    pub(crate) fn zeros(size: usize, upper: usize, lower: usize) -> Self {
        let stored_upper = (upper + lower).min(size.saturating_sub(1));
        Self {
            size,
            upper,
            lower,
            stored_upper,
            data: vec![0.0; size * (stored_upper + lower + 1)],
        }
    }

    #[must_use]
    pub fn size(&self) -> usize {
        self.size
    }

    #[must_use]
    pub fn upper(&self) -> usize {
        self.upper
    }

    #[must_use]
    pub fn lower(&self) -> usize {
        self.lower
    }

    #[must_use]
    pub fn get(&self, row: usize, col: usize) -> f64 {
        if self.in_band(row, col) {
            self.data[self.offset(row, col)]
        } else {
            0.0
        }
    }

    pub fn set(&mut self, row: usize, col: usize, value: f64) {
        if self.in_band(row, col) {
            let i = self.offset(row, col);
            self.data[i] = value;
        }
    }

    pub fn columns(&mut self) -> JacobianColumns<'_> {
        JacobianColumns::band(
            &mut self.data,
            self.size,
            self.upper,
            self.lower,
            self.stored_upper,
        )
    }

    fn in_band(&self, row: usize, col: usize) -> bool {
        row < self.size && col < self.size && row + self.upper >= col && row <= col + self.lower
    }

    pub(crate) fn factor(self) -> Option<BandLu> {
        if self.data.iter().any(|x| !x.is_finite()) {
            return None;
        }
        let mut lu = BandLu {
            size: self.size,
            lower: self.lower,
            stored_upper: self.stored_upper,
            ldim: self.stored_upper + self.lower + 1,
            data: self.data,
            pivots: vec![0; self.size],
        };
        lu.factor_in_place().then_some(lu)
    }

    fn offset(&self, row: usize, col: usize) -> usize {
        col * (self.stored_upper + self.lower + 1) + row + self.stored_upper - col
    }
}

/// Band LU factors with the row interchanges applied during elimination.
///
/// Multipliers are stored negated below the diagonal.
#[derive(Debug, Clone)]
pub(crate) struct BandLu {
    size: usize,
    lower: usize,
    stored_upper: usize,
    ldim: usize,
    data: Vec<f64>,
    pivots: Vec<usize>,
}

impl BandLu {
    fn at(&self, row: usize, col: usize) -> usize {
        col * self.ldim + row + self.stored_upper - col
    }

    /// Gaussian elimination with partial pivoting inside the band.
    fn factor_in_place(&mut self) -> bool {
        let n = self.size;
        for k in 0..n {
            let last_row = (k + self.lower).min(n - 1);

            let mut pivot = k;
            let mut largest = self.data[self.at(k, k)].abs();
            for i in k + 1..=last_row {
                let value = self.data[self.at(i, k)].abs();
                if value > largest {
                    largest = value;
                    pivot = i;
                }
            }
            self.pivots[k] = pivot;
            if largest == 0.0 {
                return false;
            }

            if pivot != k {
                let (a, b) = (self.at(pivot, k), self.at(k, k));
                self.data.swap(a, b);
            }

            let mult = -1.0 / self.data[self.at(k, k)];
            for i in k + 1..=last_row {
                let idx = self.at(i, k);
                self.data[idx] *= mult;
            }

            let last_col = (k + self.stored_upper).min(n - 1);
            for j in k + 1..=last_col {
                if pivot != k {
                    let (a, b) = (self.at(pivot, j), self.at(k, j));
                    self.data.swap(a, b);
                }
                let a_kj = self.data[self.at(k, j)];
                if a_kj != 0.0 {
                    for i in k + 1..=last_row {
                        let l_ik = self.data[self.at(i, k)];
                        let idx = self.at(i, j);
                        self.data[idx] += a_kj * l_ik;
                    }
                }
            }
        }
        true
    }

    pub(crate) fn solve(&self, b: &mut [f64]) {
        let n = self.size;

        for k in 0..n {
            let pivot = self.pivots[k];
            let mult = b[pivot];
            if pivot != k {
                b[pivot] = b[k];
                b[k] = mult;
            }
            for i in k + 1..=(k + self.lower).min(n - 1) {
                b[i] += mult * self.data[self.at(i, k)];
            }
        }

        for k in (0..n).rev() {
            b[k] /= self.data[self.at(k, k)];
            let mult = -b[k];
            for i in k.saturating_sub(self.stored_upper)..k {
                b[i] += mult * self.data[self.at(i, k)];
            }
        }
    }
}
