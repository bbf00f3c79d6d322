use log::debug;
use weft_core::ComponentKind;

use crate::{Callbacks, EngineError, IcMode, linalg::Factorization};

use super::{Engine, Failure, Source, wrms};

/// Newton iterations allowed when correcting initial conditions.
const MAX_IC_ITERS: usize = 10;

/// Sensitivity corrector iterations allowed at the initial time.
const MAX_IC_SENS_ITERS: usize = 4;

/// Initial-condition corrections must shrink below this weighted norm.
const IC_TOL: f64 = 0.0033;

impl Engine {
    /// Corrects the initial values so that `F(t0, y0, y0') = 0`.
    ///
    /// `tout1` is the first output time and sets the scale of the artificial
    /// step used by [`IcMode::AlgebraicAndDerivatives`]. Sensitivity initial
    /// values, if enabled, are corrected the same way. Read the results back
    /// with [`Engine::consistent_ic`] and [`Engine::sens_consistent_ic`].
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::IllegalInput`] after the first step, without
    /// tolerances, or without component kinds in
    /// [`IcMode::AlgebraicAndDerivatives`]; [`EngineError::NoRecovery`] if a
    /// callback keeps failing recoverably; and a convergence, setup or
    /// constraint error if the correction does not succeed.
    pub fn calc_ic(
        &mut self,
        cb: &mut dyn Callbacks,
        mode: IcMode,
        tout1: f64,
    ) -> Result<(), EngineError> {
        if self.started {
            return Err(EngineError::illegal(
                "initial conditions can only be corrected before the first step",
            ));
        }
        let tolerances = self
            .tolerances
            .clone()
            .ok_or(EngineError::illegal("tolerances have not been set"))?;
        let distance = (tout1 - self.t).abs();
        if !tout1.is_finite() || distance <= 2.0 * f64::EPSILON * self.t.abs().max(tout1.abs()) {
            return Err(EngineError::illegal("tout1 is too close to t0"));
        }

        let kinds = match mode {
            IcMode::AlgebraicAndDerivatives => Some(
                self.options
                    .component_kinds
                    .clone()
                    .ok_or(EngineError::illegal("component kinds are required"))?,
            ),
            IcMode::States => None,
        };

        let ewt = self.state_weights(&tolerances, &self.y)?;
        let h = match &kinds {
            Some(kinds) => {
                let differential: Vec<f64> = self
                    .yp
                    .iter()
                    .zip(kinds)
                    .map(|(yp, kind)| match kind {
                        ComponentKind::Differential => *yp,
                        ComponentKind::Algebraic => 0.0,
                    })
                    .collect();
                let yp_norm = wrms(&differential, &ewt);
                let h = 0.001 * distance;
                if yp_norm * h > 0.5 { 0.5 / yp_norm } else { h }
            }
            None => 0.0,
        };
        let cj = if h > 0.0 { 1.0 / h } else { 0.0 };
        self.h_current = if h > 0.0 { h } else { 0.001 * distance };

        let t = self.t;
        let mut y = self.y.clone();
        let mut yp = self.yp.clone();
        let mut r = vec![0.0; self.size];
        let mut converged = false;

        for _ in 0..MAX_IC_ITERS {
            self.eval_residual(cb, t, &y, &yp, &mut r)
                .map_err(|failure| ic_error(failure, t, h))?;
            let factor = self
                .setup(cb, t, h, cj, &y, &yp, &r, &ewt)
                .map_err(|failure| ic_error(failure, t, h))?;
            if !factor.solve(&mut r) {
                return Err(EngineError::LinearSolveFailure { t });
            }
            apply_correction(&r, kinds.as_deref(), cj, &mut y, &mut yp);

            if wrms(&r, &ewt) <= IC_TOL {
                converged = true;
                break;
            }
        }
        if !converged {
            return Err(EngineError::ConvergenceFailure { t, h });
        }
        if self.violates_constraints(&y) {
            return Err(EngineError::ConstraintFailure { t });
        }

        self.y = y;
        self.yp = yp;
        debug!("corrected initial conditions at t0 = {t}");

        if self.sensitivity.is_some() {
            self.correct_initial_sensitivities(cb, kinds.as_deref(), (h, cj), &ewt)?;
        }
        Ok(())
    }

    fn correct_initial_sensitivities(
        &mut self,
        cb: &mut dyn Callbacks,
        kinds: Option<&[ComponentKind]>,
        (h, cj): (f64, f64),
        ewt: &[f64],
    ) -> Result<(), EngineError> {
        let t = self.t;
        let (y, yp) = (self.y.clone(), self.yp.clone());
        let Some(tolerances) = self.tolerances.clone() else {
            return Err(EngineError::illegal("tolerances have not been set"));
        };
        let (mut s, mut sp) = match &self.sensitivity {
            Some(sens) => (sens.s.clone(), sens.sp.clone()),
            None => return Err(EngineError::NoSensitivity),
        };
        let sens_weights = self.sensitivity_weights(&tolerances, &s)?;

        let mut r = vec![0.0; self.size];
        self.eval_residual(cb, t, &y, &yp, &mut r)
            .map_err(|failure| ic_error(failure, t, h))?;
        let factor: Factorization = self
            .setup(cb, t, h, cj, &y, &yp, &r, ewt)
            .map_err(|failure| ic_error(failure, t, h))?;

        for index in 0..s.len() {
            let mut converged = false;
            for _ in 0..MAX_IC_SENS_ITERS {
                let mut g = self
                    .sensitivity_residual(cb, t, (&y, &yp), (&s[index], &sp[index]), index, ewt)
                    .map_err(|failure| ic_error(failure, t, h))?;
                if !factor.solve(&mut g) {
                    return Err(EngineError::LinearSolveFailure { t });
                }
                apply_correction(&g, kinds, cj, &mut s[index], &mut sp[index]);
                if wrms(&g, &sens_weights[index]) <= IC_TOL {
                    converged = true;
                    break;
                }
            }
            if !converged {
                return Err(EngineError::ConvergenceFailure { t, h });
            }
        }

        if let Some(sens) = self.sensitivity.as_mut() {
            sens.ic_s.clone_from(&s);
            sens.ic_sp.clone_from(&sp);
            sens.s = s;
            sens.sp = sp;
        }
        debug!("corrected initial sensitivities at t0 = {t}");
        Ok(())
    }
}

/// Applies a Newton correction to the unknowns selected by the IC mode.
///
/// Without component kinds every state is corrected. With them, algebraic
/// states and differential derivatives are corrected.
fn apply_correction(
    delta: &[f64],
    kinds: Option<&[ComponentKind]>,
    cj: f64,
    y: &mut [f64],
    yp: &mut [f64],
) {
    match kinds {
        None => y.iter_mut().zip(delta).for_each(|(yi, di)| *yi -= di),
        Some(kinds) => {
            for (i, kind) in kinds.iter().enumerate() {
                match kind {
                    ComponentKind::Algebraic => y[i] -= delta[i],
                    ComponentKind::Differential => yp[i] -= cj * delta[i],
                }
            }
        }
    }
}

fn ic_error(failure: Failure, t: f64, h: f64) -> EngineError {
    match failure {
        Failure::Fatal(error) => error,
        Failure::Recoverable(Source::LinearSetup) => EngineError::LinearSetupFailure { t },
        Failure::Recoverable(_) => EngineError::NoRecovery,
        Failure::NotConverged | Failure::ConstraintViolated => {
            EngineError::ConvergenceFailure { t, h }
        }
    }
}
