use crate::{CallbackError, Matrix};

/// Evaluations the engine requests while integrating.
///
/// Every method receives the step size `h` the engine is currently working
/// with. Implementations must not call back into the engine.
pub trait Callbacks {
    /// Evaluates the residual `r = F(t, y, y')`.
    ///
    /// # Errors
    ///
    /// Returns a [`CallbackError`] if the residual cannot be evaluated.
    fn residual(
        &mut self,
        t: f64,
        h: f64,
        y: &[f64],
        yp: &[f64],
        r: &mut [f64],
    ) -> Result<(), CallbackError>;

    /// Fills `matrix` with `∂F/∂y + cj ∂F/∂y'`.
    ///
    /// Only called when the user Jacobian is enabled on the engine. The
    /// matrix arrives zeroed and `r` holds the residual at `(t, y, yp)`.
    ///
    /// # Errors
    ///
    /// Returns a [`CallbackError`] if the matrix cannot be evaluated.
    #[allow(clippy::too_many_arguments)]
    fn jacobian(
        &mut self,
        _t: f64,
        _h: f64,
        _cj: f64,
        _y: &[f64],
        _yp: &[f64],
        _r: &[f64],
        _matrix: &mut Matrix,
    ) -> Result<(), CallbackError> {
        Err(CallbackError::Fatal)
    }

    /// Evaluates the quadrature integrands at `(t, y, yp)`.
    ///
    /// # Errors
    ///
    /// Returns a [`CallbackError`] if the integrands cannot be evaluated.
    fn quadrature(
        &mut self,
        _t: f64,
        _h: f64,
        _y: &[f64],
        _yp: &[f64],
        _q: &mut [f64],
    ) -> Result<(), CallbackError> {
        Err(CallbackError::Fatal)
    }

    /// Current value of sensitivity parameter `index`.
    fn parameter(&self, _index: usize) -> f64 {
        0.0
    }

    /// Overwrites sensitivity parameter `index`.
    fn set_parameter(&mut self, _index: usize, _value: f64) {}
}
