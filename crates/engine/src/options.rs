use weft_core::{ComponentKind, Constraint};

/// Highest extrapolation order the engine supports.
pub const MAX_ORDER: usize = 5;

/// Error-control tolerances for the state.
#[derive(Debug, Clone, PartialEq)]
pub enum Tolerances {
    /// One relative and one absolute tolerance for every component.
    Scalar { rtol: f64, atol: f64 },
    /// One relative tolerance and a per-component absolute tolerance.
    Vector { rtol: f64, atol: Vec<f64> },
}

impl Tolerances {
    #[must_use]
    pub fn rtol(&self) -> f64 {
        match self {
            Self::Scalar { rtol, .. } | Self::Vector { rtol, .. } => *rtol,
        }
    }

    #[must_use]
    pub fn atol(&self, index: usize) -> f64 {
        match self {
            Self::Scalar { atol, .. } => *atol,
            Self::Vector { atol, .. } => atol[index],
        }
    }

    pub(crate) fn is_valid_for(&self, size: usize) -> bool {
        let rtol = self.rtol();
        let rtol_ok = rtol.is_finite() && rtol >= 0.0;
        let atol_ok = match self {
            Self::Scalar { atol, .. } => atol.is_finite() && *atol >= 0.0,
            Self::Vector { atol, .. } => {
                atol.len() == size && atol.iter().all(|a| a.is_finite() && *a >= 0.0)
            }
        };
        rtol_ok && atol_ok
    }
}

/// Linear solver used for the Newton iteration matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LinearSolver {
    #[default]
    Dense,
    /// Banded matrix with `upper` super-diagonals and `lower` sub-diagonals.
    Band { upper: usize, lower: usize },
}

/// How far a call to [`Engine::solve`](crate::Engine::solve) advances.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Task {
    /// Integrate until the output time is reached exactly.
    Normal,
    /// Take a single internal step toward the output time.
    OneStep,
}

/// Which unknowns initial-condition calculation solves for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IcMode {
    /// Algebraic states and differential derivatives, given the differential
    /// states. Requires component kinds.
    AlgebraicAndDerivatives,
    /// All states, given all derivatives.
    States,
}

/// Forward sensitivity corrector strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[non_exhaustive]
pub enum SensitivityMethod {
    /// Sensitivities are corrected after the state has converged.
    #[default]
    Staggered,
}

/// Step-control limits.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Options {
    pub max_order: usize,
    pub max_num_steps: usize,
    pub init_step: Option<f64>,
    pub max_step: Option<f64>,
    pub stop_time: Option<f64>,
    pub max_err_test_fails: usize,
    pub max_nonlin_iters: usize,
    pub max_conv_fails: usize,
    pub suppress_alg: bool,
    pub user_jacobian: bool,
    pub component_kinds: Option<Vec<ComponentKind>>,
    pub constraints: Option<Vec<Constraint>>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            max_order: MAX_ORDER,
            max_num_steps: 500,
            init_step: None,
            max_step: None,
            stop_time: None,
            max_err_test_fails: 10,
            max_nonlin_iters: 4,
            max_conv_fails: 10,
            suppress_alg: false,
            user_jacobian: false,
            component_kinds: None,
            constraints: None,
        }
    }
}

/// Cumulative counters kept by the engine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Stats {
    pub steps: usize,
    pub residual_evals: usize,
    pub jacobian_evals: usize,
    pub linear_setups: usize,
    pub error_test_failures: usize,
    pub convergence_failures: usize,
    pub quadrature_evals: usize,
    pub sensitivity_residual_evals: usize,
}

/// Approximate storage held by the engine, in words.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Workspace {
    pub real: usize,
    pub integer: usize,
}
