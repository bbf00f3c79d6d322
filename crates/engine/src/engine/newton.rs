use crate::{CallbackError, Callbacks, EngineError, Matrix, linalg::Factorization};

use super::{Engine, Failure, Source, wrms};

/// Newton corrections must shrink below this weighted norm.
pub(super) const NEWTON_TOL: f64 = 1e-3;

/// Convergence-rate estimate above which the iteration is abandoned.
const MAX_RATE: f64 = 0.9;

impl Engine {
    /// Solves one implicit Euler substep of size `hs` ending at `t`.
    ///
    /// `lin` caches the factored iteration matrix for the current `cj`. A
    /// stale matrix that fails to converge is rebuilt once at the predictor.
    #[allow(clippy::too_many_arguments)]
    pub(super) fn correct(
        &mut self,
        cb: &mut dyn Callbacks,
        t: f64,
        hs: f64,
        y_old: &[f64],
        y_pred: &[f64],
        yp_pred: &[f64],
        lin: &mut Option<Factorization>,
        ewt: &[f64],
    ) -> Result<(Vec<f64>, Vec<f64>), Failure> {
        let cj = 1.0 / hs;
        loop {
            let (factor, fresh) = match lin.take() {
                Some(factor) => (factor, false),
                None => {
                    let mut r0 = vec![0.0; self.size];
                    self.eval_residual(cb, t, y_pred, yp_pred, &mut r0)?;
                    let factor = self.setup(cb, t, hs, cj, y_pred, yp_pred, &r0, ewt)?;
                    (factor, true)
                }
            };

            let mut y = y_pred.to_vec();
            let mut yp = yp_pred.to_vec();
            let result = self.newton(cb, t, hs, y_old, &mut y, &mut yp, &factor, ewt);
            *lin = Some(factor);

            match result {
                Ok(()) => return Ok((y, yp)),
                Err(Failure::NotConverged) if !fresh => *lin = None,
                Err(failure) => return Err(failure),
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn newton(
        &mut self,
        cb: &mut dyn Callbacks,
        t: f64,
        hs: f64,
        y_old: &[f64],
        y: &mut [f64],
        yp: &mut [f64],
        factor: &Factorization,
        ewt: &[f64],
    ) -> Result<(), Failure> {
        let mut delta = vec![0.0; self.size];
        let mut previous = 0.0;

        for iter in 0..self.options.max_nonlin_iters {
            self.eval_residual(cb, t, y, yp, &mut delta)?;
            if !factor.solve(&mut delta) {
                return Err(Failure::NotConverged);
            }
            for i in 0..self.size {
                y[i] -= delta[i];
                yp[i] = (y[i] - y_old[i]) / hs;
            }

            let norm = wrms(&delta, ewt);
            if !norm.is_finite() {
                return Err(Failure::NotConverged);
            }
            if norm <= NEWTON_TOL {
                return Ok(());
            }
            if iter > 0 {
                let rate = norm / previous;
                if rate > MAX_RATE {
                    return Err(Failure::NotConverged);
                }
                if rate / (1.0 - rate) * norm <= NEWTON_TOL {
                    return Ok(());
                }
            }
            previous = norm;
        }
        Err(Failure::NotConverged)
    }

    /// Builds and factors the iteration matrix at `(t, y, yp)`.
    ///
    /// `r0` is the residual at that point. `h` sizes the difference-quotient
    /// increments.
    #[allow(clippy::too_many_arguments)]
    pub(super) fn setup(
        &mut self,
        cb: &mut dyn Callbacks,
        t: f64,
        h: f64,
        cj: f64,
        y: &[f64],
        yp: &[f64],
        r0: &[f64],
        ewt: &[f64],
    ) -> Result<Factorization, Failure> {
        self.stats.linear_setups += 1;
        let mut matrix = Matrix::zeros(self.linear_solver, self.size);

        if self.options.user_jacobian {
            self.stats.jacobian_evals += 1;
            cb.jacobian(t, self.h_current, cj, y, yp, r0, &mut matrix)
                .map_err(|error| match error {
                    CallbackError::Recoverable => Failure::Recoverable(Source::Jacobian),
                    CallbackError::Fatal => Failure::Fatal(EngineError::LinearSetupFailure { t }),
                })?;
        } else {
            self.difference_matrix(cb, t, h, cj, y, yp, r0, ewt, &mut matrix)?;
        }

        matrix
            .factor()
            .ok_or(Failure::Recoverable(Source::LinearSetup))
    }

    /// Approximates the iteration matrix one column at a time by forward
    /// differences of the residual.
    #[allow(clippy::too_many_arguments)]
    fn difference_matrix(
        &mut self,
        cb: &mut dyn Callbacks,
        t: f64,
        h: f64,
        cj: f64,
        y: &[f64],
        yp: &[f64],
        r0: &[f64],
        ewt: &[f64],
        matrix: &mut Matrix,
    ) -> Result<(), Failure> {
        let srur = f64::EPSILON.sqrt();
        let mut y_perturbed = y.to_vec();
        let mut yp_perturbed = yp.to_vec();
        let mut r = vec![0.0; self.size];

        for j in 0..self.size {
            let mut inc = (srur * y[j].abs().max((h * yp[j]).abs())).max(1.0 / ewt[j]);
            if h * yp[j] < 0.0 {
                inc = -inc;
            }
            inc = (y[j] + inc) - y[j];

            y_perturbed[j] = y[j] + inc;
            yp_perturbed[j] = yp[j] + cj * inc;
            self.eval_residual(cb, t, &y_perturbed, &yp_perturbed, &mut r)?;
            for i in matrix.column_rows(j) {
                matrix.set(i, j, (r[i] - r0[i]) / inc);
            }
            y_perturbed[j] = y[j];
            yp_perturbed[j] = yp[j];
        }
        Ok(())
    }
}
