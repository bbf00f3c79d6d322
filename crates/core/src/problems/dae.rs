use crate::{Constraint, EvalError, JacobianColumns};

/// Defines a differential-algebraic problem `F(t, y, y') = 0`.
///
/// A DAE problem supplies consistent-enough initial values, evaluates the
/// residual, and optionally provides an analytic iteration matrix, quadrature
/// integrands, sensitivity parameters and component constraints. Integration
/// sessions call these methods through the engine's callback interface; they
/// must not call back into the session that drives them.
///
/// Every evaluation returns [`EvalError::Recoverable`] when a retry with a
/// smaller step could succeed, and [`EvalError::Fatal`] when it cannot.
pub trait DaeProblem {
    /// Number of equations (and state components).
    fn equation_count(&self) -> usize;

    /// Writes the initial state and derivative at `t0`.
    ///
    /// Both slices have length [`Self::equation_count`] and arrive zeroed.
    fn initial_conditions(&mut self, t0: f64, y: &mut [f64], ydot: &mut [f64]);

    /// Evaluates the residual `r = F(t, y, y')`.
    ///
    /// `dt` is the step size the engine is currently working with, for
    /// evaluators whose closure relations depend on it.
    ///
    /// # Errors
    ///
    /// Returns an [`EvalError`] if the residual cannot be evaluated.
    fn residual(
        &mut self,
        t: f64,
        dt: f64,
        y: &[f64],
        ydot: &[f64],
        r: &mut [f64],
    ) -> Result<(), EvalError>;

    /// Whether [`Self::jacobian`] is implemented.
    ///
    /// When `false` the engine approximates the iteration matrix by finite
    /// differences of the residual.
    fn supplies_jacobian(&self) -> bool {
        false
    }

    /// Fills the iteration matrix `J = ∂F/∂y + c_j ∂F/∂y'`.
    ///
    /// `r` holds the residual at `(t, y, ydot)`. The view arrives zeroed.
    ///
    /// # Errors
    ///
    /// Returns an [`EvalError`] if the matrix cannot be evaluated. The default
    /// implementation reports a fatal error; it is never called unless
    /// [`Self::supplies_jacobian`] returns `true`.
    #[allow(clippy::too_many_arguments)]
    fn jacobian(
        &mut self,
        _t: f64,
        _dt: f64,
        _c_j: f64,
        _y: &[f64],
        _ydot: &[f64],
        _r: &[f64],
        _jac: &mut JacobianColumns<'_>,
    ) -> Result<(), EvalError> {
        Err(EvalError::fatal("problem does not supply a Jacobian"))
    }

    /// Number of quadrature integrands accumulated alongside the state.
    fn quadrature_count(&self) -> usize {
        0
    }

    /// Evaluates the quadrature integrands `q = g(t, y, y')`.
    ///
    /// # Errors
    ///
    /// Returns an [`EvalError`] if the integrands cannot be evaluated.
    fn quadrature_rate(
        &mut self,
        _t: f64,
        _y: &[f64],
        _ydot: &[f64],
        _q: &mut [f64],
    ) -> Result<(), EvalError> {
        Ok(())
    }

    /// Number of parameters tracked by forward sensitivity analysis.
    fn parameter_count(&self) -> usize {
        self.parameters().len()
    }

    /// Current values of the sensitivity parameters.
    fn parameters(&self) -> &[f64] {
        &[]
    }

    /// Overwrites one sensitivity parameter.
    ///
    /// The engine perturbs parameters through this method to difference the
    /// residual and restores the original value afterwards.
    fn set_parameter(&mut self, _index: usize, _value: f64) {}

    /// Typical magnitude of each sensitivity parameter.
    ///
    /// Used both to size parameter perturbations and to scale the absolute
    /// sensitivity tolerance, so that sensitivities with respect to
    /// parameters of very different magnitude share one relative tolerance.
    fn parameter_scales(&self) -> Vec<f64> {
        vec![1.0; self.parameter_count()]
    }

    /// Number of components with a declared constraint.
    ///
    /// When zero, [`Self::constraint`] is not consulted.
    fn constraint_count(&self) -> usize {
        0
    }

    /// Constraint on state component `index`.
    fn constraint(&self, _index: usize) -> Constraint {
        Constraint::None
    }
}
