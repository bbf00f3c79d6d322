use nalgebra::{DMatrix, DVector, Dyn, LU};
use weft_core::JacobianColumns;

/// Square matrix stored column by column.
#[derive(Debug, Clone, PartialEq)]
pub struct DenseMatrix {
    size: usize,
    data: Vec<f64>,
}

impl DenseMatrix {
    pub(crate) fn zeros(size: usize) -> Self {
        Self {
            size,
            data: vec![0.0; size * size],
        }
    }

    #[must_use]
    pub fn size(&self) -> usize {
        self.size
    }

    #[must_use]
    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.data[col * self.size + row]
    }

    pub fn set(&mut self, row: usize, col: usize, value: f64) {
        self.data[col * self.size + row] = value;
    }

    pub fn columns(&mut self) -> JacobianColumns<'_> {
        JacobianColumns::dense(&mut self.data, self.size)
    }

    pub(crate) fn factor(self) -> Option<DenseLu> {
        if self.data.iter().any(|x| !x.is_finite()) {
            return None;
        }
        let lu = DMatrix::from_vec(self.size, self.size, self.data).lu();
        lu.is_invertible().then_some(DenseLu(lu))
    }
}

#[derive(Debug, Clone)]
pub(crate) struct DenseLu(LU<f64, Dyn, Dyn>);

impl DenseLu {
    pub(crate) fn solve(&self, b: &mut [f64]) {
        let mut rhs = DVector::from_column_slice(b);
        if self.0.solve_mut(&mut rhs) {
            b.copy_from_slice(rhs.as_slice());
        } else {
            b.fill(f64::NAN);
        }
    }
}
