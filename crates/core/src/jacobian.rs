/// Storage layout of a [`JacobianColumns`] view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    /// Full `size × size` matrix stored column by column.
    Dense { size: usize },

    /// Banded matrix stored column by column.
    ///
    /// Each column holds `stored_upper + lower + 1` entries, where
    /// `stored_upper >= upper` leaves room for fill-in during factorization.
    /// Entry `(row, col)` lives at offset `row + stored_upper - col` within
    /// its column.
    Band {
        size: usize,
        upper: usize,
        lower: usize,
        stored_upper: usize,
    },
}

impl Layout {
    /// Number of stored entries per column.
    #[must_use]
    pub fn column_len(&self) -> usize {
        match *self {
            Self::Dense { size } => size,
            Self::Band {
                lower,
                stored_upper,
                ..
            } => stored_upper + lower + 1,
        }
    }

    /// Matrix dimension.
    #[must_use]
    pub fn size(&self) -> usize {
        match *self {
            Self::Dense { size } | Self::Band { size, .. } => size,
        }
    }
}

/// Mutable, column-major view of the iteration matrix `J = ∂F/∂y + c_j ∂F/∂y'`
/// handed to [`DaeProblem::jacobian`](crate::DaeProblem::jacobian).
///
/// Writes outside the band of a banded matrix are dropped.
#[derive(Debug)]
pub struct JacobianColumns<'a> {
    data: &'a mut [f64],
    layout: Layout,
}

impl<'a> JacobianColumns<'a> {
    /// Wraps dense column-major storage of a `size × size` matrix.
    pub fn dense(data: &'a mut [f64], size: usize) -> Self {
        debug_assert_eq!(data.len(), size * size);
        Self {
            data,
            layout: Layout::Dense { size },
        }
    }

    /// Wraps banded column-major storage.
    pub fn band(
        data: &'a mut [f64],
        size: usize,
        upper: usize,
        lower: usize,
        stored_upper: usize,
    ) -> Self {
        let layout = Layout::Band {
            size,
            upper,
            lower,
            stored_upper,
        };
        debug_assert_eq!(data.len(), size * layout.column_len());
        Self { data, layout }
    }

    #[must_use]
    pub fn layout(&self) -> Layout {
        self.layout
    }

    #[must_use]
    pub fn size(&self) -> usize {
        self.layout.size()
    }

    /// Returns `true` if `(row, col)` is stored by this view.
    #[must_use]
    pub fn contains(&self, row: usize, col: usize) -> bool {
        self.offset(row, col).is_some()
    }

    /// Returns the entry at `(row, col)`, or zero outside the stored pattern.
    #[must_use]
    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.offset(row, col).map_or(0.0, |i| self.data[i])
    }

    /// Overwrites the entry at `(row, col)`.
    pub fn set(&mut self, row: usize, col: usize, value: f64) {
        if let Some(i) = self.offset(row, col) {
            self.data[i] = value;
        }
    }

    /// Adds `value` to the entry at `(row, col)`.
    pub fn add(&mut self, row: usize, col: usize, value: f64) {
        if let Some(i) = self.offset(row, col) {
            self.data[i] += value;
        }
    }

    /// Raw storage of column `col`, laid out as described by [`Layout`].
    pub fn column_mut(&mut self, col: usize) -> &mut [f64] {
        let len = self.layout.column_len();
        &mut self.data[col * len..(col + 1) * len]
    }

    fn offset(&self, row: usize, col: usize) -> Option<usize> {
        match self.layout {
            Layout::Dense { size } => (row < size && col < size).then(|| col * size + row),
            Layout::Band {
                size,
                upper,
                lower,
                stored_upper,
            } => {
                let in_band = row < size && col < size && row + upper >= col && row <= col + lower;
                in_band.then(|| col * self.layout.column_len() + row + stored_upper - col)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dense_view_is_column_major() {
        let mut data = vec![0.0; 4];
        let mut cols = JacobianColumns::dense(&mut data, 2);
        cols.set(1, 0, 3.0);
        cols.add(1, 0, 1.0);
        cols.set(0, 1, 5.0);

        assert_eq!(cols.get(1, 0), 4.0);
        assert_eq!(data, vec![0.0, 4.0, 5.0, 0.0]);
    }

    #[test]
    fn band_view_drops_entries_outside_band() {
        // Tridiagonal 3x3 with one extra fill-in row above the diagonal.
        let mut data = vec![0.0; 3 * 4];
        let mut cols = JacobianColumns::band(&mut data, 3, 1, 1, 2);

        cols.set(0, 0, 1.0);
        cols.set(1, 0, 2.0);
        cols.set(0, 1, 3.0);
        cols.set(2, 0, 9.0);

        assert!(!cols.contains(2, 0));
        assert_eq!(cols.get(2, 0), 0.0);
        assert_eq!(cols.get(0, 1), 3.0);
        // Diagonal entry of column 0 sits at offset `stored_upper`.
        assert_eq!(cols.column_mut(0)[2], 1.0);
        assert_eq!(cols.column_mut(0)[3], 2.0);
    }
}
