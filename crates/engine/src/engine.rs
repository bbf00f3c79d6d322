mod ic;
mod newton;
mod sensitivity;
mod step;


use log::debug;
use weft_core::{ComponentKind, Constraint};

use crate::{
    CallbackError, Callbacks, EngineError, LinearSolver, MAX_ORDER, SensitivityMethod, Stats,
    Tolerances, Workspace, options::Options,
};

/// Stateful implicit integrator for `F(t, y, y') = 0`.
///
/// Each step is an extrapolated implicit Euler method: the macro step is
/// integrated with 1, 2, … substeps, the results are combined in an
/// Aitken–Neville tableau, and the difference between the two highest
/// tableau entries drives step-size control. Every substep is solved with a
/// modified Newton iteration on `∂F/∂y + cj ∂F/∂y'`, using either a dense or a
/// banded LU factorization.
///
/// Quadratures are accumulated with the same scheme, and forward
/// sensitivities are corrected after the state has converged at each
/// substep, with directional differences of the residual standing in for the
/// sensitivity right-hand side.
#[derive(Debug)]
pub struct Engine {
    size: usize,
    t0: f64,
    t: f64,
    y: Vec<f64>,
    yp: Vec<f64>,
    /// Step size to attempt next; zero until the first call to `solve`.
    h_next: f64,
    /// Step size of the attempt in progress, handed to callbacks.
    h_current: f64,
    h_last: f64,
    started: bool,
    tolerances: Option<Tolerances>,
    linear_solver: LinearSolver,
    options: Options,
    sensitivity: Option<Sensitivity>,
    quadrature: Option<Quadrature>,
    stats: Stats,
}

#[derive(Debug)]
struct Sensitivity {
    method: SensitivityMethod,
    s: Vec<Vec<f64>>,
    sp: Vec<Vec<f64>>,
    ic_s: Vec<Vec<f64>>,
    ic_sp: Vec<Vec<f64>>,
    scales: Vec<f64>,
    tolerances: Option<(f64, Vec<f64>)>,
}

#[derive(Debug)]
struct Quadrature {
    q: Vec<f64>,
    tolerances: Option<(f64, f64)>,
}

/// Where a recoverable failure came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Source {
    Residual,
    Jacobian,
    LinearSetup,
    Quadrature,
    Sensitivity,
}

/// Internal failure of a step attempt.
#[derive(Debug)]
enum Failure {
    Recoverable(Source),
    NotConverged,
    ConstraintViolated,
    Fatal(EngineError),
}

impl From<EngineError> for Failure {
    fn from(error: EngineError) -> Self {
        Self::Fatal(error)
    }
}

impl Engine {
    /// Creates an engine at `t0` with initial state `y0` and derivative `yp0`.
    ///
    /// Tolerances must be set with [`Engine::set_tolerances`] before the first
    /// call to [`Engine::solve`] or [`Engine::calc_ic`].
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::IllegalInput`] if the system is empty, the
    /// vectors differ in length, or `t0` is not finite.
    pub fn new(t0: f64, y0: Vec<f64>, yp0: Vec<f64>) -> Result<Self, EngineError> {
        if y0.is_empty() {
            return Err(EngineError::illegal("the system has no equations"));
        }
        if y0.len() != yp0.len() {
            return Err(EngineError::illegal("y0 and yp0 differ in length"));
        }
        if !t0.is_finite() {
            return Err(EngineError::illegal("t0 must be finite"));
        }

        debug!("creating engine for {} equations at t0 = {t0}", y0.len());
        Ok(Self {
            size: y0.len(),
            t0,
            t: t0,
            y: y0,
            yp: yp0,
            h_next: 0.0,
            h_current: 0.0,
            h_last: 0.0,
            started: false,
            tolerances: None,
            linear_solver: LinearSolver::Dense,
            options: Options::default(),
            sensitivity: None,
            quadrature: None,
            stats: Stats::default(),
        })
    }

    #[must_use]
    pub fn size(&self) -> usize {
        self.size
    }

    /// Sets the state error-control tolerances.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::IllegalInput`] for negative or non-finite
    /// tolerances or an absolute-tolerance vector of the wrong length.
    pub fn set_tolerances(&mut self, tolerances: Tolerances) -> Result<(), EngineError> {
        if !tolerances.is_valid_for(self.size) {
            return Err(EngineError::illegal("invalid state tolerances"));
        }
        self.tolerances = Some(tolerances);
        Ok(())
    }

    /// Selects the linear solver for the iteration matrix.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::IllegalInput`] if a bandwidth is not smaller
    /// than the system size.
    pub fn set_linear_solver(&mut self, solver: LinearSolver) -> Result<(), EngineError> {
        if let LinearSolver::Band { upper, lower } = solver {
            if upper >= self.size || lower >= self.size {
                return Err(EngineError::illegal("bandwidth must be smaller than the system size"));
            }
        }
        self.linear_solver = solver;
        Ok(())
    }

    #[must_use]
    pub fn linear_solver(&self) -> LinearSolver {
        self.linear_solver
    }

    /// Chooses between [`Callbacks::jacobian`] and a difference-quotient
    /// approximation of the iteration matrix.
    pub fn set_user_jacobian(&mut self, enabled: bool) {
        self.options.user_jacobian = enabled;
    }

    /// Sets the extrapolation order, from 1 to [`MAX_ORDER`].
    ///
    /// Orders below 2 still build two tableau rows so the local error can be
    /// estimated.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::IllegalInput`] for an order outside that range.
    pub fn set_max_order(&mut self, order: usize) -> Result<(), EngineError> {
        if !(1..=MAX_ORDER).contains(&order) {
            return Err(EngineError::illegal("max order must be between 1 and 5"));
        }
        self.options.max_order = order;
        Ok(())
    }

    /// Sets the maximum number of steps per call to [`Engine::solve`].
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::IllegalInput`] if `steps` is zero.
    pub fn set_max_num_steps(&mut self, steps: usize) -> Result<(), EngineError> {
        if steps == 0 {
            return Err(EngineError::illegal("max steps must be positive"));
        }
        self.options.max_num_steps = steps;
        Ok(())
    }

    /// Sets the size of the first step.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::IllegalInput`] unless `h0` is positive and finite.
    pub fn set_init_step(&mut self, h0: f64) -> Result<(), EngineError> {
        if !(h0.is_finite() && h0 > 0.0) {
            return Err(EngineError::illegal("initial step must be positive"));
        }
        self.options.init_step = Some(h0);
        Ok(())
    }

    /// Sets an upper bound on the step size.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::IllegalInput`] unless `h_max` is positive.
    pub fn set_max_step(&mut self, h_max: f64) -> Result<(), EngineError> {
        if !(h_max.is_finite() && h_max > 0.0) {
            return Err(EngineError::illegal("max step must be positive"));
        }
        self.options.max_step = Some(h_max);
        Ok(())
    }

    /// Sets a time the integration must not step past.
    ///
    /// The stop time is cleared once it has been reached.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::IllegalInput`] if `tstop` is not finite or lies
    /// behind the current time.
    pub fn set_stop_time(&mut self, tstop: f64) -> Result<(), EngineError> {
        if !tstop.is_finite() || (self.started && tstop < self.t) {
            return Err(EngineError::illegal("stop time is behind the current time"));
        }
        self.options.stop_time = Some(tstop);
        Ok(())
    }

    #[must_use]
    pub fn stop_time(&self) -> Option<f64> {
        self.options.stop_time
    }

    /// Sets the number of error-test failures allowed in one step.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::IllegalInput`] if `fails` is zero.
    pub fn set_max_err_test_fails(&mut self, fails: usize) -> Result<(), EngineError> {
        if fails == 0 {
            return Err(EngineError::illegal("max error test failures must be positive"));
        }
        self.options.max_err_test_fails = fails;
        Ok(())
    }

    /// Sets the Newton iteration limit per substep.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::IllegalInput`] if `iters` is zero.
    pub fn set_max_nonlin_iters(&mut self, iters: usize) -> Result<(), EngineError> {
        if iters == 0 {
            return Err(EngineError::illegal("max nonlinear iterations must be positive"));
        }
        self.options.max_nonlin_iters = iters;
        Ok(())
    }

    /// Sets the number of convergence failures allowed in one step.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::IllegalInput`] if `fails` is zero.
    pub fn set_max_conv_fails(&mut self, fails: usize) -> Result<(), EngineError> {
        if fails == 0 {
            return Err(EngineError::illegal("max convergence failures must be positive"));
        }
        self.options.max_conv_fails = fails;
        Ok(())
    }

    /// Excludes algebraic components from the local error test.
    ///
    /// Requires component kinds by the time the first step is taken.
    pub fn set_suppress_alg(&mut self, suppress: bool) {
        self.options.suppress_alg = suppress;
    }

    /// Declares which components are differential and which algebraic.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::IllegalInput`] if `kinds` has the wrong length.
    pub fn set_component_kinds(&mut self, kinds: Vec<ComponentKind>) -> Result<(), EngineError> {
        if kinds.len() != self.size {
            return Err(EngineError::illegal("component kinds have the wrong length"));
        }
        self.options.component_kinds = Some(kinds);
        Ok(())
    }

    /// Imposes inequality constraints on the state.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::IllegalInput`] if `constraints` has the wrong
    /// length.
    pub fn set_constraints(&mut self, constraints: Vec<Constraint>) -> Result<(), EngineError> {
        if constraints.len() != self.size {
            return Err(EngineError::illegal("constraints have the wrong length"));
        }
        self.options.constraints = Some(constraints);
        Ok(())
    }

    /// Enables forward sensitivity analysis for `s0.len()` parameters.
    ///
    /// Parameter scales default to one; sensitivity tolerances default to the
    /// state tolerances divided by the parameter scale.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::IllegalInput`] if no parameters are given or any
    /// initial sensitivity has the wrong length.
    pub fn sens_init(
        &mut self,
        method: SensitivityMethod,
        s0: Vec<Vec<f64>>,
        sp0: Vec<Vec<f64>>,
    ) -> Result<(), EngineError> {
        if s0.is_empty() || s0.len() != sp0.len() {
            return Err(EngineError::illegal("invalid number of sensitivity vectors"));
        }
        if s0.iter().chain(&sp0).any(|v| v.len() != self.size) {
            return Err(EngineError::illegal("sensitivity vectors have the wrong length"));
        }

        debug!("initializing {} forward sensitivities", s0.len());
        self.sensitivity = Some(Sensitivity {
            method,
            scales: vec![1.0; s0.len()],
            ic_s: s0.clone(),
            ic_sp: sp0.clone(),
            s: s0,
            sp: sp0,
            tolerances: None,
        });
        Ok(())
    }

    /// Sets the sensitivity tolerances, one absolute tolerance per parameter.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::NoSensitivity`] before [`Engine::sens_init`] and
    /// [`EngineError::IllegalInput`] for invalid tolerances.
    pub fn set_sens_tolerances(&mut self, rtol: f64, atol: Vec<f64>) -> Result<(), EngineError> {
        let sens = self.sensitivity.as_mut().ok_or(EngineError::NoSensitivity)?;
        let valid = rtol.is_finite()
            && rtol >= 0.0
            && atol.len() == sens.s.len()
            && atol.iter().all(|a| a.is_finite() && *a >= 0.0);
        if !valid {
            return Err(EngineError::illegal("invalid sensitivity tolerances"));
        }
        sens.tolerances = Some((rtol, atol));
        Ok(())
    }

    /// Sets the typical magnitude of each sensitivity parameter.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::NoSensitivity`] before [`Engine::sens_init`] and
    /// [`EngineError::IllegalInput`] unless every scale is positive.
    pub fn set_sens_scales(&mut self, scales: Vec<f64>) -> Result<(), EngineError> {
        let sens = self.sensitivity.as_mut().ok_or(EngineError::NoSensitivity)?;
        if scales.len() != sens.s.len() || scales.iter().any(|p| !(p.is_finite() && *p > 0.0)) {
            return Err(EngineError::illegal("parameter scales must be positive"));
        }
        sens.scales = scales;
        Ok(())
    }

    #[must_use]
    pub fn sensitivity_count(&self) -> usize {
        self.sensitivity.as_ref().map_or(0, |sens| sens.s.len())
    }

    #[must_use]
    pub fn sensitivity_method(&self) -> Option<SensitivityMethod> {
        self.sensitivity.as_ref().map(|sens| sens.method)
    }

    /// Enables integration of `q0.len()` quadratures starting from `q0`.
    ///
    /// Quadratures are excluded from the error test until
    /// [`Engine::set_quad_tolerances`] is called.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::IllegalInput`] if `q0` is empty.
    pub fn quad_init(&mut self, q0: Vec<f64>) -> Result<(), EngineError> {
        if q0.is_empty() {
            return Err(EngineError::illegal("no quadratures to integrate"));
        }
        self.quadrature = Some(Quadrature {
            q: q0,
            tolerances: None,
        });
        Ok(())
    }

    /// Includes quadratures in the error test with the given tolerances.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::NoQuadrature`] before [`Engine::quad_init`] and
    /// [`EngineError::IllegalInput`] for negative tolerances.
    pub fn set_quad_tolerances(&mut self, rtol: f64, atol: f64) -> Result<(), EngineError> {
        let quad = self.quadrature.as_mut().ok_or(EngineError::NoQuadrature)?;
        if !(rtol.is_finite() && rtol >= 0.0 && atol.is_finite() && atol >= 0.0) {
            return Err(EngineError::illegal("invalid quadrature tolerances"));
        }
        quad.tolerances = Some((rtol, atol));
        Ok(())
    }

    /// Corrected initial values after [`Engine::calc_ic`].
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::IllegalInput`] once integration has started.
    pub fn consistent_ic(&self) -> Result<(&[f64], &[f64]), EngineError> {
        if self.started {
            return Err(EngineError::illegal("integration has already started"));
        }
        Ok((&self.y, &self.yp))
    }

    /// Corrected initial sensitivities after [`Engine::calc_ic`].
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::NoSensitivity`] if sensitivities are disabled.
    pub fn sens_consistent_ic(&self) -> Result<(&[Vec<f64>], &[Vec<f64>]), EngineError> {
        let sens = self.sensitivity.as_ref().ok_or(EngineError::NoSensitivity)?;
        Ok((&sens.ic_s, &sens.ic_sp))
    }

    /// Current time, state and derivative.
    #[must_use]
    pub fn solution(&self) -> (f64, &[f64], &[f64]) {
        (self.t, &self.y, &self.yp)
    }

    #[must_use]
    pub fn time(&self) -> f64 {
        self.t
    }

    #[must_use]
    pub fn initial_time(&self) -> f64 {
        self.t0
    }

    /// Step size the engine will attempt next.
    #[must_use]
    pub fn current_step(&self) -> f64 {
        self.h_next
    }

    /// Step size of the last accepted step.
    #[must_use]
    pub fn last_step(&self) -> f64 {
        self.h_last
    }

    /// Current quadrature values.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::NoQuadrature`] if quadratures are disabled.
    pub fn quadrature(&self) -> Result<(f64, &[f64]), EngineError> {
        let quad = self.quadrature.as_ref().ok_or(EngineError::NoQuadrature)?;
        Ok((self.t, &quad.q))
    }

    /// Current sensitivity vectors, one per parameter.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::NoSensitivity`] if sensitivities are disabled.
    pub fn sensitivities(&self) -> Result<(f64, &[Vec<f64>]), EngineError> {
        let sens = self.sensitivity.as_ref().ok_or(EngineError::NoSensitivity)?;
        Ok((self.t, &sens.s))
    }

    #[must_use]
    pub fn stats(&self) -> Stats {
        self.stats
    }

    /// Approximate storage held by the engine.
    #[must_use]
    pub fn workspace(&self) -> Workspace {
        let n = self.size;
        let rows = self.options.max_order.max(2);
        let nq = self.quadrature.as_ref().map_or(0, |quad| quad.q.len());
        let ns = self.sensitivity_count();

        let packed = 2 * n + nq + 2 * ns * n;
        let tableau = rows * (rows + 1) / 2 * packed;
        let matrix = match self.linear_solver {
            LinearSolver::Dense => n * n,
            LinearSolver::Band { upper, lower } => {
                n * ((upper + lower).min(n.saturating_sub(1)) + lower + 1)
            }
        };
        let vectors = 4 * n
            + self.options.constraints.as_ref().map_or(0, Vec::len)
            + self.options.component_kinds.as_ref().map_or(0, Vec::len)
            + 4 * ns * n
            + 2 * nq;

        Workspace {
            real: vectors + tableau + matrix,
            integer: n + ns,
        }
    }

    fn eval_residual(
        &mut self,
        cb: &mut dyn Callbacks,
        t: f64,
        y: &[f64],
        yp: &[f64],
        r: &mut [f64],
    ) -> Result<(), Failure> {
        self.stats.residual_evals += 1;
        cb.residual(t, self.h_current, y, yp, r)
            .map_err(|error| match error {
                CallbackError::Recoverable => Failure::Recoverable(Source::Residual),
                CallbackError::Fatal => Failure::Fatal(EngineError::ResidualFailure { t }),
            })
    }

    fn eval_quadrature(
        &mut self,
        cb: &mut dyn Callbacks,
        t: f64,
        y: &[f64],
        yp: &[f64],
        rate: &mut [f64],
    ) -> Result<(), Failure> {
        self.stats.quadrature_evals += 1;
        cb.quadrature(t, self.h_current, y, yp, rate)
            .map_err(|error| match error {
                CallbackError::Recoverable => Failure::Recoverable(Source::Quadrature),
                CallbackError::Fatal => Failure::Fatal(EngineError::QuadratureFailure { t }),
            })
    }

    fn state_weights(&self, tolerances: &Tolerances, y: &[f64]) -> Result<Vec<f64>, EngineError> {
        error_weights(y, |i| (tolerances.rtol(), tolerances.atol(i)))
            .ok_or(EngineError::BadErrorWeight)
    }

    fn violates_constraints(&self, y: &[f64]) -> bool {
        self.options.constraints.as_ref().is_some_and(|constraints| {
            constraints
                .iter()
                .zip(y)
                .any(|(c, value)| !c.is_satisfied_by(*value))
        })
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        debug!(
            "releasing engine at t = {} after {} steps",
            self.t, self.stats.steps
        );
    }
}

/// Inverse error weights `1 / (rtol |v_i| + atol_i)`.
///
/// Returns `None` if any weight would be non-positive or infinite.
fn error_weights(v: &[f64], tolerance: impl Fn(usize) -> (f64, f64)) -> Option<Vec<f64>> {
    v.iter()
        .enumerate()
        .map(|(i, value)| {
            let (rtol, atol) = tolerance(i);
            let scale = rtol * value.abs() + atol;
            (scale > 0.0 && scale.is_finite()).then(|| 1.0 / scale)
        })
        .collect()
}

/// Weighted root-mean-square norm.
fn wrms(v: &[f64], weights: &[f64]) -> f64 {
    if v.is_empty() {
        return 0.0;
    }
    let sum: f64 = v.iter().zip(weights).map(|(x, w)| (x * w).powi(2)).sum();
    (sum / v.len() as f64).sqrt()
}
