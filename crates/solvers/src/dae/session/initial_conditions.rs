use log::debug;
use weft_core::{ComponentKind, DaeProblem};
use weft_engine::{EngineError, IcMode};

use super::Session;
use crate::dae::{bridge::Bridge, error::Error};

impl<P: DaeProblem> Session<P> {
    /// Corrects every state component so that the residual vanishes at the
    /// initial time, keeping the derivatives fixed.
    ///
    /// The correction uses the engine's step-size scale at `tout`, or at the
    /// initial time plus the initial step size (default
    /// [`DEFAULT_IC_PROBE_STEP`](crate::dae::DEFAULT_IC_PROBE_STEP)) when
    /// `tout` is `None`. The corrected values are written to the session and
    /// to `y` and `ydot`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DimensionMismatch`] for output slices of the wrong
    /// length, [`Error::NotInitialized`] before [`Session::init`] and
    /// [`Error::IcCorrection`] if the correction fails.
    pub fn correct_initial_y_given_yp(
        &mut self,
        y: &mut [f64],
        ydot: &mut [f64],
        tout: Option<f64>,
    ) -> Result<(), Error> {
        self.correct_initial(IcMode::States, y, ydot, tout)
    }

    /// Corrects the algebraic states and the differential derivatives,
    /// keeping the differential states fixed.
    ///
    /// `kinds` marks each component and is kept for later integration.
    ///
    /// # Errors
    ///
    /// As [`Session::correct_initial_y_given_yp`], plus
    /// [`Error::DimensionMismatch`] if `kinds` has the wrong length.
    pub fn correct_initial_ya_yp_given_yd(
        &mut self,
        kinds: &[ComponentKind],
        y: &mut [f64],
        ydot: &mut [f64],
        tout: Option<f64>,
    ) -> Result<(), Error> {
        self.check_outputs(&[kinds.len(), y.len(), ydot.len()])?;
        let engine = self.engine.as_mut().ok_or(Error::NotInitialized)?;
        engine
            .set_component_kinds(kinds.to_vec())
            .map_err(ic_error)?;
        self.config.component_kinds = Some(kinds.to_vec());

        self.correct_initial(IcMode::AlgebraicAndDerivatives, y, ydot, tout)
    }

    fn correct_initial(
        &mut self,
        mode: IcMode,
        y: &mut [f64],
        ydot: &mut [f64],
        tout: Option<f64>,
    ) -> Result<(), Error> {
        self.check_outputs(&[y.len(), ydot.len()])?;
        let engine = self.engine.as_mut().ok_or(Error::NotInitialized)?;
        let tout1 = tout.unwrap_or_else(|| self.config.ic_probe_time(self.times.t0));

        engine
            .calc_ic(&mut Bridge::new(&mut self.provider), mode, tout1)
            .map_err(ic_error)?;
        let (y_ic, ydot_ic) = engine.consistent_ic().map_err(ic_error)?;
        self.buffers.copy_solution(y_ic, ydot_ic);
        self.sens_ok = false;

        y.copy_from_slice(&self.buffers.y);
        ydot.copy_from_slice(&self.buffers.ydot);
        debug!("corrected initial conditions ({mode:?}) using tout1 = {tout1}");
        Ok(())
    }

    fn check_outputs(&self, lengths: &[usize]) -> Result<(), Error> {
        match lengths.iter().find(|&&len| len != self.n) {
            Some(&actual) => Err(Error::DimensionMismatch {
                expected: self.n,
                actual,
            }),
            None => Ok(()),
        }
    }
}

fn ic_error(source: EngineError) -> Error {
    Error::IcCorrection { source }
}
