use log::{debug, warn};
use weft_core::{DaeProblem, EvalError};
use weft_engine::{CallbackError, Callbacks, Matrix};

/// Adapts a [`DaeProblem`] to the engine's [`Callbacks`] for one engine call.
pub(super) struct Bridge<'a, P> {
    provider: &'a mut P,
}

impl<'a, P: DaeProblem> Bridge<'a, P> {
    pub(super) fn new(provider: &'a mut P) -> Self {
        Self { provider }
    }
}

impl<P: DaeProblem> Callbacks for Bridge<'_, P> {
    fn residual(
        &mut self,
        t: f64,
        h: f64,
        y: &[f64],
        yp: &[f64],
        r: &mut [f64],
    ) -> Result<(), CallbackError> {
        self.provider
            .residual(t, h, y, yp, r)
            .map_err(|error| translate("residual", t, &error))
    }

    fn jacobian(
        &mut self,
        t: f64,
        h: f64,
        cj: f64,
        y: &[f64],
        yp: &[f64],
        r: &[f64],
        matrix: &mut Matrix,
    ) -> Result<(), CallbackError> {
        let mut columns = match matrix {
            Matrix::Dense(dense) => dense.columns(),
            Matrix::Band(band) => band.columns(),
            _ => {
                debug!("unsupported Jacobian storage at t = {t}");
                return Err(CallbackError::Recoverable);
            }
        };
        self.provider
            .jacobian(t, h, cj, y, yp, r, &mut columns)
            .map_err(|error| translate("Jacobian", t, &error))
    }

    fn quadrature(
        &mut self,
        t: f64,
        _h: f64,
        y: &[f64],
        yp: &[f64],
        q: &mut [f64],
    ) -> Result<(), CallbackError> {
        self.provider
            .quadrature_rate(t, y, yp, q)
            .map_err(|error| translate("quadrature", t, &error))
    }

    fn parameter(&self, index: usize) -> f64 {
        self.provider
            .parameters()
            .get(index)
            .copied()
            .unwrap_or_default()
    }

    fn set_parameter(&mut self, index: usize, value: f64) {
        self.provider.set_parameter(index, value);
    }
}

fn translate(what: &str, t: f64, error: &EvalError) -> CallbackError {
    match error {
        EvalError::Recoverable { .. } => {
            debug!("{what} evaluation at t = {t}: {error}");
            CallbackError::Recoverable
        }
        EvalError::Fatal { .. } => {
            warn!("{what} evaluation at t = {t}: {error}");
            CallbackError::Fatal
        }
    }
}

#[cfg(test)]
mod tests {
    use weft_core::JacobianColumns;

    use super::*;

    /// Residual fails recoverably for negative states and fatally for NaN.
    struct Picky {
        gain: f64,
    }

    impl DaeProblem for Picky {
        fn equation_count(&self) -> usize {
            2
        }

        fn initial_conditions(&mut self, _t0: f64, _y: &mut [f64], _ydot: &mut [f64]) {}

        fn residual(
            &mut self,
            _t: f64,
            dt: f64,
            y: &[f64],
            ydot: &[f64],
            r: &mut [f64],
        ) -> Result<(), EvalError> {
            if y[0].is_nan() {
                return Err(EvalError::fatal("state is NaN"));
            }
            if y[0] < 0.0 {
                return Err(EvalError::recoverable("negative state"));
            }
            r[0] = ydot[0] + self.gain * y[0];
            r[1] = dt;
            Ok(())
        }

        fn supplies_jacobian(&self) -> bool {
            true
        }

        fn jacobian(
            &mut self,
            _t: f64,
            _dt: f64,
            c_j: f64,
            _y: &[f64],
            _ydot: &[f64],
            _r: &[f64],
            jac: &mut JacobianColumns<'_>,
        ) -> Result<(), EvalError> {
            jac.set(0, 0, c_j + self.gain);
            jac.set(1, 1, 1.0);
            Ok(())
        }

        fn parameters(&self) -> &[f64] {
            std::slice::from_ref(&self.gain)
        }

        fn set_parameter(&mut self, _index: usize, value: f64) {
            self.gain = value;
        }
    }

    #[test]
    fn forwards_residual_with_step_size() {
        let mut picky = Picky { gain: 2.0 };
        let mut bridge = Bridge::new(&mut picky);
        let mut r = [0.0; 2];

        bridge
            .residual(0.0, 0.25, &[1.0, 0.0], &[-1.0, 0.0], &mut r)
            .expect("should evaluate");
        assert_eq!(r, [1.0, 0.25]);
    }

    #[test]
    fn keeps_recoverable_and_fatal_apart() {
        let mut picky = Picky { gain: 1.0 };
        let mut bridge = Bridge::new(&mut picky);
        let mut r = [0.0; 2];

        let recoverable = bridge.residual(0.0, 0.1, &[-1.0, 0.0], &[0.0, 0.0], &mut r);
        assert_eq!(recoverable, Err(CallbackError::Recoverable));

        let fatal = bridge.residual(0.0, 0.1, &[f64::NAN, 0.0], &[0.0, 0.0], &mut r);
        assert_eq!(fatal, Err(CallbackError::Fatal));
    }

    #[test]
    fn passes_parameters_through() {
        let mut picky = Picky { gain: 1.5 };
        let mut bridge = Bridge::new(&mut picky);

        assert_eq!(bridge.parameter(0), 1.5);
        bridge.set_parameter(0, 3.0);
        assert_eq!(bridge.parameter(0), 3.0);
        assert_eq!(bridge.parameter(7), 0.0);
    }

    #[test]
    fn quadrature_defaults_to_success() {
        let mut picky = Picky { gain: 1.0 };
        let mut bridge = Bridge::new(&mut picky);
        let mut q: [f64; 0] = [];
        assert!(bridge.quadrature(0.0, 0.1, &[1.0, 0.0], &[0.0, 0.0], &mut q).is_ok());
    }
}
