use crate::{CallbackError, Callbacks, EngineError, Tolerances, linalg::Factorization};

use super::{Engine, Failure, Source, error_weights, newton::NEWTON_TOL, wrms};

/// Corrector iterations allowed per sensitivity and substep.
const MAX_SENS_ITERS: usize = 3;

impl Engine {
    /// Error weights for each sensitivity vector in `s`.
    pub(super) fn sensitivity_weights(
        &self,
        tolerances: &Tolerances,
        s: &[Vec<f64>],
    ) -> Result<Vec<Vec<f64>>, EngineError> {
        let Some(sens) = self.sensitivity.as_ref() else {
            return Ok(Vec::new());
        };
        let atol_min = (0..self.size)
            .map(|i| tolerances.atol(i))
            .fold(f64::INFINITY, f64::min);

        s.iter()
            .enumerate()
            .map(|(index, si)| {
                let (rtol, atol) = match &sens.tolerances {
                    Some((rtol, atol)) => (*rtol, atol[index]),
                    None => (tolerances.rtol(), atol_min / sens.scales[index]),
                };
                error_weights(si, |_| (rtol, atol)).ok_or(EngineError::BadErrorWeight)
            })
            .collect()
    }

    /// Solves the sensitivity equations of one parameter at the end of an
    /// implicit Euler substep, reusing the state's factored iteration matrix.
    #[allow(clippy::too_many_arguments)]
    pub(super) fn correct_sensitivity(
        &mut self,
        cb: &mut dyn Callbacks,
        t: f64,
        hs: f64,
        (y, yp): (&[f64], &[f64]),
        (s_old, sp_old): (&[f64], &[f64]),
        index: usize,
        factor: &Factorization,
        (ewt, sens_ewt): (&[f64], &[f64]),
    ) -> Result<(Vec<f64>, Vec<f64>), Failure> {
        let mut s: Vec<f64> = s_old.iter().zip(sp_old).map(|(s, sp)| s + hs * sp).collect();
        let mut sp = sp_old.to_vec();

        for _ in 0..MAX_SENS_ITERS {
            let mut g = self.sensitivity_residual(cb, t, (y, yp), (&s, &sp), index, ewt)?;
            if !factor.solve(&mut g) {
                return Err(Failure::NotConverged);
            }
            for k in 0..self.size {
                s[k] -= g[k];
                sp[k] = (s[k] - s_old[k]) / hs;
            }
            if wrms(&g, sens_ewt) <= NEWTON_TOL {
                return Ok((s, sp));
            }
        }
        Err(Failure::NotConverged)
    }

    /// Evaluates `∂F/∂y s + ∂F/∂y' s' + ∂F/∂p` for parameter `index` by a
    /// centered directional difference along `(s, s', 1)`.
    ///
    /// The parameter is restored before returning, even on failure.
    pub(super) fn sensitivity_residual(
        &mut self,
        cb: &mut dyn Callbacks,
        t: f64,
        (y, yp): (&[f64], &[f64]),
        (s, sp): (&[f64], &[f64]),
        index: usize,
        ewt: &[f64],
    ) -> Result<Vec<f64>, Failure> {
        let (rtol, scale) = match (&self.tolerances, &self.sensitivity) {
            (Some(tolerances), Some(sens)) => (tolerances.rtol(), sens.scales[index]),
            _ => return Err(Failure::Fatal(EngineError::NoSensitivity)),
        };
        self.stats.sensitivity_residual_evals += 1;

        let delta = rtol.max(f64::EPSILON).sqrt();
        let s_norm = wrms(s, ewt);
        let sigma = if s_norm > 0.0 {
            delta * scale.min(1.0 / s_norm)
        } else {
            delta * scale
        };

        let shifted = |sign: f64, base: &[f64], dir: &[f64]| -> Vec<f64> {
            base.iter().zip(dir).map(|(b, d)| b + sign * sigma * d).collect()
        };
        let (y_plus, yp_plus) = (shifted(1.0, y, s), shifted(1.0, yp, sp));
        let (y_minus, yp_minus) = (shifted(-1.0, y, s), shifted(-1.0, yp, sp));

        let h = self.h_current;
        let p = cb.parameter(index);
        let mut r_plus = vec![0.0; self.size];
        let mut r_minus = vec![0.0; self.size];

        cb.set_parameter(index, p + sigma);
        let result = cb.residual(t, h, &y_plus, &yp_plus, &mut r_plus).and_then(|()| {
            cb.set_parameter(index, p - sigma);
            cb.residual(t, h, &y_minus, &yp_minus, &mut r_minus)
        });
        cb.set_parameter(index, p);
        self.stats.residual_evals += 2;

        result.map_err(|error| match error {
            CallbackError::Recoverable => Failure::Recoverable(Source::Sensitivity),
            CallbackError::Fatal => {
                Failure::Fatal(EngineError::SensitivityResidualFailure { t })
            }
        })?;

        Ok(r_plus
            .iter()
            .zip(&r_minus)
            .map(|(plus, minus)| (plus - minus) / (2.0 * sigma))
            .collect())
    }
}
