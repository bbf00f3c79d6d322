use thiserror::Error;

/// Non-failing result of an [`Engine::solve`](crate::Engine::solve) call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The requested output time (or single step) was reached.
    Success,
    /// Integration stopped at the configured stop time.
    StopTimeReached,
    /// The call succeeded but the step size became negligible relative to `t`.
    Warning,
}

impl Outcome {
    /// Conventional numeric status of this outcome.
    #[must_use]
    pub fn code(self) -> i32 {
        match self {
            Self::Success => 0,
            Self::StopTimeReached => 1,
            Self::Warning => 99,
        }
    }
}

/// Failure reported by a [`Callbacks`](crate::Callbacks) evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CallbackError {
    /// The engine may retry with a smaller step.
    #[error("recoverable callback failure")]
    Recoverable,
    /// The engine must abort.
    #[error("fatal callback failure")]
    Fatal,
}

/// Errors returned by the integration engine.
///
/// Every variant carries a conventional negative status code, available via
/// [`EngineError::code`].
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    #[error("reached the maximum of {max_steps} steps before tout")]
    TooMuchWork { max_steps: usize },

    #[error("tolerances too small for machine precision at t = {t}")]
    TooMuchAccuracy { t: f64 },

    #[error("error test failed repeatedly at t = {t} with h = {h}")]
    ErrorTestFailure { t: f64, h: f64 },

    #[error("nonlinear solver failed to converge at t = {t} with h = {h}")]
    ConvergenceFailure { t: f64, h: f64 },

    #[error("linear solver setup failed at t = {t}")]
    LinearSetupFailure { t: f64 },

    #[error("linear solve failed at t = {t}")]
    LinearSolveFailure { t: f64 },

    #[error("residual evaluation failed unrecoverably at t = {t}")]
    ResidualFailure { t: f64 },

    #[error("residual evaluation failed repeatedly at t = {t}")]
    RepeatedResidualError { t: f64 },

    #[error("constraints could not be satisfied at t = {t}")]
    ConstraintFailure { t: f64 },

    #[error("first residual evaluation failed")]
    FirstResidualFailure,

    #[error("unable to recover from a recoverable callback failure")]
    NoRecovery,

    #[error("illegal input: {reason}")]
    IllegalInput { reason: &'static str },

    #[error("non-positive error weight")]
    BadErrorWeight,

    #[error("quadrature integration was not initialized")]
    NoQuadrature,

    #[error("quadrature evaluation failed at t = {t}")]
    QuadratureFailure { t: f64 },

    #[error("sensitivity analysis was not initialized")]
    NoSensitivity,

    #[error("sensitivity residual evaluation failed at t = {t}")]
    SensitivityResidualFailure { t: f64 },
}

impl EngineError {
    /// Conventional numeric status of this error (always negative).
    #[must_use]
    pub fn code(&self) -> i32 {
        match self {
            Self::TooMuchWork { .. } => -1,
            Self::TooMuchAccuracy { .. } => -2,
            Self::ErrorTestFailure { .. } => -3,
            Self::ConvergenceFailure { .. } => -4,
            Self::LinearSetupFailure { .. } => -6,
            Self::LinearSolveFailure { .. } => -7,
            Self::ResidualFailure { .. } => -8,
            Self::RepeatedResidualError { .. } => -9,
            Self::ConstraintFailure { .. } => -11,
            Self::FirstResidualFailure => -12,
            Self::NoRecovery => -14,
            Self::IllegalInput { .. } => -22,
            Self::BadErrorWeight => -24,
            Self::NoQuadrature => -30,
            Self::QuadratureFailure { .. } => -31,
            Self::NoSensitivity => -40,
            Self::SensitivityResidualFailure { .. } => -41,
        }
    }

    pub(crate) fn illegal(reason: &'static str) -> Self {
        Self::IllegalInput { reason }
    }
}
