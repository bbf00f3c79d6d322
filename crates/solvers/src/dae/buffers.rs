use ndarray::Array2;
use weft_core::Constraint;

/// Storage mirroring the engine's solution.
///
/// Every buffer is reallocated by `init`, sized by the equation count `n`,
/// the parameter count `ns` and the quadrature count `nq`.
#[derive(Debug, Clone)]
pub(super) struct Buffers {
    pub(super) y: Vec<f64>,
    pub(super) ydot: Vec<f64>,
    pub(super) constraints: Vec<Constraint>,
    pub(super) quadrature: Vec<f64>,
    /// `ns × n`; row `p` holds `∂y/∂p`.
    pub(super) sensitivity: Array2<f64>,
}

impl Buffers {
    pub(super) fn empty() -> Self {
        Self::allocate(0, 0, 0)
    }

    pub(super) fn allocate(n: usize, ns: usize, nq: usize) -> Self {
        Self {
            y: vec![0.0; n],
            ydot: vec![0.0; n],
            constraints: vec![Constraint::None; n],
            quadrature: vec![0.0; nq],
            sensitivity: Array2::zeros((ns, n)),
        }
    }

    pub(super) fn copy_solution(&mut self, y: &[f64], ydot: &[f64]) {
        self.y.copy_from_slice(y);
        self.ydot.copy_from_slice(ydot);
    }
}

/// Overwrites a sensitivity matrix, one row per parameter.
pub(super) fn copy_rows(matrix: &mut Array2<f64>, rows: &[Vec<f64>]) {
    for (mut row, values) in matrix.rows_mut().into_iter().zip(rows) {
        for (entry, value) in row.iter_mut().zip(values) {
            *entry = *value;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rows(matrix: &Array2<f64>) -> Vec<Vec<f64>> {
        matrix.rows().into_iter().map(|row| row.to_vec()).collect()
    }

    #[test]
    fn allocates_zeroed_buffers() {
        let buffers = Buffers::allocate(3, 2, 1);
        assert_eq!(buffers.y, vec![0.0; 3]);
        assert_eq!(buffers.constraints, vec![Constraint::None; 3]);
        assert_eq!(buffers.quadrature, vec![0.0]);
        assert_eq!(buffers.sensitivity.dim(), (2, 3));
        assert_eq!(rows(&buffers.sensitivity), vec![vec![0.0; 3]; 2]);
    }

    #[test]
    fn copies_sensitivity_rows() {
        let mut buffers = Buffers::allocate(2, 2, 0);
        copy_rows(&mut buffers.sensitivity, &[vec![1.0, 2.0], vec![3.0, 4.0]]);
        assert_eq!(buffers.sensitivity[[1, 0]], 3.0);
        assert_eq!(rows(&buffers.sensitivity), vec![vec![1.0, 2.0], vec![3.0, 4.0]]);
    }
}
