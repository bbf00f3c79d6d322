use weft_core::ComponentKind;
use weft_engine::{EngineError, LinearSolver, Tolerances};

pub const DEFAULT_RTOL: f64 = 1e-8;
pub const DEFAULT_ATOL: f64 = 1e-10;
pub const DEFAULT_SENS_RTOL: f64 = 1e-5;
pub const DEFAULT_SENS_ATOL: f64 = 1e-7;
pub const DEFAULT_MAX_NUM_STEPS: usize = 20_000;

/// Offset from `t0` of the probe time used by initial-condition correction
/// when neither an output time nor an initial step size is given.
pub const DEFAULT_IC_PROBE_STEP: f64 = 1e-5;

/// Settings staged on a [`Session`](super::Session) and applied by
/// [`Session::init`](super::Session::init).
///
/// Values are not validated when staged; the engine rejects invalid ones when
/// they are applied. Optional limits left at `None` keep the engine's own
/// defaults.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub(super) tolerances: Tolerances,
    pub(super) sens_rtol: f64,
    pub(super) sens_atol: f64,
    pub(super) quad_tolerances: Option<(f64, f64)>,
    pub(super) linear_solver_type: i32,
    pub(super) bandwidths: (usize, usize),
    pub(super) max_order: Option<usize>,
    pub(super) max_num_steps: usize,
    pub(super) init_step: Option<f64>,
    pub(super) stop_time: Option<f64>,
    pub(super) max_err_test_fails: Option<usize>,
    pub(super) max_nonlin_iters: Option<usize>,
    pub(super) max_conv_fails: Option<usize>,
    pub(super) suppress_alg: bool,
    pub(super) component_kinds: Option<Vec<ComponentKind>>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            tolerances: Tolerances::Scalar {
                rtol: DEFAULT_RTOL,
                atol: DEFAULT_ATOL,
            },
            sens_rtol: DEFAULT_SENS_RTOL,
            sens_atol: DEFAULT_SENS_ATOL,
            quad_tolerances: None,
            linear_solver_type: 0,
            bandwidths: (0, 0),
            max_order: None,
            max_num_steps: DEFAULT_MAX_NUM_STEPS,
            init_step: None,
            stop_time: None,
            max_err_test_fails: None,
            max_nonlin_iters: None,
            max_conv_fails: None,
            suppress_alg: false,
            component_kinds: None,
        }
    }
}

impl Config {
    #[must_use]
    pub fn tolerances(&self) -> &Tolerances {
        &self.tolerances
    }

    /// Relative and absolute sensitivity tolerances.
    #[must_use]
    pub fn sensitivity_tolerances(&self) -> (f64, f64) {
        (self.sens_rtol, self.sens_atol)
    }

    #[must_use]
    pub fn quadrature_tolerances(&self) -> Option<(f64, f64)> {
        self.quad_tolerances
    }

    /// Linear solver selector: `0` or `1` for dense, `2` for banded.
    #[must_use]
    pub fn linear_solver_type(&self) -> i32 {
        self.linear_solver_type
    }

    /// Upper and lower bandwidths used by the banded solver.
    #[must_use]
    pub fn bandwidths(&self) -> (usize, usize) {
        self.bandwidths
    }

    #[must_use]
    pub fn max_order(&self) -> Option<usize> {
        self.max_order
    }

    #[must_use]
    pub fn max_num_steps(&self) -> usize {
        self.max_num_steps
    }

    #[must_use]
    pub fn initial_step_size(&self) -> Option<f64> {
        self.init_step
    }

    #[must_use]
    pub fn stop_time(&self) -> Option<f64> {
        self.stop_time
    }

    #[must_use]
    pub fn max_error_test_failures(&self) -> Option<usize> {
        self.max_err_test_fails
    }

    #[must_use]
    pub fn max_nonlinear_iterations(&self) -> Option<usize> {
        self.max_nonlin_iters
    }

    #[must_use]
    pub fn max_nonlinear_convergence_failures(&self) -> Option<usize> {
        self.max_conv_fails
    }

    /// Whether algebraic components take part in the local error test.
    #[must_use]
    pub fn includes_algebraic_in_error_test(&self) -> bool {
        !self.suppress_alg
    }

    #[must_use]
    pub fn component_kinds(&self) -> Option<&[ComponentKind]> {
        self.component_kinds.as_deref()
    }

    /// Resolves the linear solver selector.
    pub(super) fn linear_solver(&self) -> Result<LinearSolver, EngineError> {
        match self.linear_solver_type {
            0 | 1 => Ok(LinearSolver::Dense),
            2 => Ok(LinearSolver::Band {
                upper: self.bandwidths.0,
                lower: self.bandwidths.1,
            }),
            _ => Err(EngineError::IllegalInput {
                reason: "unsupported linear solver type",
            }),
        }
    }

    /// Time at which initial conditions are corrected when no output time is
    /// given.
    pub(super) fn ic_probe_time(&self, t0: f64) -> f64 {
        t0 + self.init_step.unwrap_or(DEFAULT_IC_PROBE_STEP)
    }
}
