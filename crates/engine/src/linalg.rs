//! Iteration-matrix storage and LU factorizations.

mod band;
mod dense;

pub use band::BandMatrix;
pub use dense::DenseMatrix;

use weft_core::JacobianColumns;

use crate::LinearSolver;

/// Newton iteration matrix `J = ∂F/∂y + cj ∂F/∂y'` handed to
/// [`Callbacks::jacobian`](crate::Callbacks::jacobian).
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum Matrix {
    Dense(DenseMatrix),
    Band(BandMatrix),
}

impl Matrix {
    pub(crate) fn zeros(solver: LinearSolver, size: usize) -> Self {
        match solver {
            LinearSolver::Dense => Self::Dense(DenseMatrix::zeros(size)),
            LinearSolver::Band { upper, lower } => {
                Self::Band(BandMatrix::zeros(size, upper, lower))
            }
        }
    }

    #[must_use]
    pub fn size(&self) -> usize {
        match self {
            Self::Dense(m) => m.size(),
            Self::Band(m) => m.size(),
        }
    }

    /// Returns the entry at `(row, col)`, or zero outside the stored pattern.
    #[must_use]
    pub fn get(&self, row: usize, col: usize) -> f64 {
        match self {
            Self::Dense(m) => m.get(row, col),
            Self::Band(m) => m.get(row, col),
        }
    }

    /// Overwrites the entry at `(row, col)`; writes outside a band are dropped.
    pub fn set(&mut self, row: usize, col: usize, value: f64) {
        match self {
            Self::Dense(m) => m.set(row, col, value),
            Self::Band(m) => m.set(row, col, value),
        }
    }

    /// Column-major view of the underlying storage.
    pub fn columns(&mut self) -> JacobianColumns<'_> {
        match self {
            Self::Dense(m) => m.columns(),
            Self::Band(m) => m.columns(),
        }
    }

    /// Rows of column `col` that the storage pattern holds.
    pub(crate) fn column_rows(&self, col: usize) -> std::ops::Range<usize> {
        match self {
            Self::Dense(m) => 0..m.size(),
            Self::Band(m) => {
                col.saturating_sub(m.upper())..(col + m.lower() + 1).min(m.size())
            }
        }
    }

    /// Factors the matrix in place, or returns `None` if it is singular.
    pub(crate) fn factor(self) -> Option<Factorization> {
        match self {
            Self::Dense(m) => m.factor().map(Factorization::Dense),
            Self::Band(m) => m.factor().map(Factorization::Band),
        }
    }
}

/// LU factorization ready to solve `J x = b`.
#[derive(Debug, Clone)]
pub(crate) enum Factorization {
    Dense(dense::DenseLu),
    Band(band::BandLu),
}

impl Factorization {
    /// Overwrites `b` with the solution of `J x = b`.
    ///
    /// Returns `false` if the solve produced non-finite values.
    pub(crate) fn solve(&self, b: &mut [f64]) -> bool {
        match self {
            Self::Dense(lu) => lu.solve(b),
            Self::Band(lu) => lu.solve(b),
        }
        b.iter().all(|x| x.is_finite())
    }
}
