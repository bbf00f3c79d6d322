mod configure;
mod initial_conditions;

use log::{info, warn};
use ndarray::Array2;
use weft_core::{Constraint, DaeProblem};
use weft_engine::{Engine, EngineError, Outcome, Stats, Task, Workspace};

use super::{
    bridge::Bridge,
    buffers::{self, Buffers},
    config::Config,
    error::Error,
    sensitivity,
};

/// Time bookkeeping of a [`Session`].
///
/// `current` never decreases between calls to [`Session::init`].
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Times {
    /// Initial time passed to [`Session::init`].
    pub t0: f64,
    /// Time the engine last returned.
    pub current: f64,
    /// Value of `current` before the last `solve` or `step` call.
    pub previous: f64,
    /// Value of `previous` before the last `solve` or `step` call.
    pub previous_previous: f64,
    /// `current - previous`.
    pub step_size: f64,
}

impl Times {
    fn starting_at(t0: f64) -> Self {
        Self {
            t0,
            current: t0,
            previous: t0,
            previous_previous: t0,
            step_size: 0.0,
        }
    }

    fn shift(&mut self) {
        self.previous_previous = self.previous;
        self.previous = self.current;
    }

    fn land(&mut self, t: f64) {
        self.current = t;
        self.step_size = self.current - self.previous;
    }
}

/// A stateful integration of one [`DaeProblem`].
///
/// See the [module documentation](super) for the lifecycle.
pub struct Session<P> {
    provider: P,
    n: usize,
    ns: usize,
    nq: usize,
    config: Config,
    /// Caller-staged constraints, overriding the provider's per component.
    staged_constraints: Vec<Option<Constraint>>,
    times: Times,
    buffers: Buffers,
    engine: Option<Engine>,
    sens_ok: bool,
}

impl<P: DaeProblem> Session<P> {
    /// Creates an uninitialized session that owns `provider`.
    ///
    /// The equation count is read from the provider once, here.
    pub fn new(provider: P) -> Self {
        let n = provider.equation_count();
        let ns = provider.parameter_count();
        let nq = provider.quadrature_count();
        Self {
            provider,
            n,
            ns,
            nq,
            config: Config::default(),
            staged_constraints: vec![None; n],
            times: Times::default(),
            buffers: Buffers::empty(),
            engine: None,
            sens_ok: false,
        }
    }

    /// Starts (or restarts) the integration at `t0`.
    ///
    /// Any previous engine and every buffer are discarded. The provider is
    /// asked for initial conditions, a fresh engine is created from them and
    /// all staged configuration is applied.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EngineInit`] if the engine rejects the problem or a
    /// staged setting, and [`Error::SensitivityInit`] if sensitivities cannot
    /// be enabled. The session is left uninitialized on failure.
    pub fn init(&mut self, t0: f64) -> Result<(), Error> {
        self.times = Times::starting_at(t0);
        self.sens_ok = false;
        self.engine = None;

        self.ns = self.provider.parameter_count();
        self.nq = self.provider.quadrature_count();
        self.buffers = Buffers::allocate(self.n, self.ns, self.nq);

        self.provider
            .initial_conditions(t0, &mut self.buffers.y, &mut self.buffers.ydot);
        let mut engine = Engine::new(t0, self.buffers.y.clone(), self.buffers.ydot.clone())
            .map_err(init_error("creation"))?;

        engine
            .set_tolerances(self.config.tolerances.clone())
            .map_err(init_error("tolerances"))?;
        let solver = self
            .config
            .linear_solver()
            .map_err(init_error("linear solver"))?;
        engine
            .set_linear_solver(solver)
            .map_err(init_error("linear solver"))?;
        engine.set_user_jacobian(self.provider.supplies_jacobian());

        if self.ns > 0 {
            sensitivity::initialize(
                &mut engine,
                self.ns,
                self.provider.parameter_scales(),
                self.config.sensitivity_tolerances(),
            )
            .map_err(|source| Error::SensitivityInit { source })?;
        }

        self.apply_options(&mut engine)?;

        let constraints = self.effective_constraints();
        if constraints.iter().any(|c| c.is_active()) {
            engine
                .set_constraints(constraints.clone())
                .map_err(init_error("constraints"))?;
        }
        self.buffers.constraints = constraints;

        if let Some(kinds) = &self.config.component_kinds {
            engine
                .set_component_kinds(kinds.clone())
                .map_err(init_error("component kinds"))?;
        }

        if self.nq > 0 {
            engine
                .quad_init(vec![0.0; self.nq])
                .map_err(init_error("quadrature"))?;
            if let Some((rtol, atol)) = self.config.quad_tolerances {
                engine
                    .set_quad_tolerances(rtol, atol)
                    .map_err(init_error("quadrature tolerances"))?;
            }
        }

        info!(
            "initialized {} equations at t0 = {t0} ({} parameters, {} quadratures)",
            self.n, self.ns, self.nq
        );
        self.engine = Some(engine);
        Ok(())
    }

    /// Integrates exactly to `tout`.
    ///
    /// If `tout` is not ahead of the current time nothing happens and
    /// [`Outcome::Success`] is returned. A staged stop time between the
    /// current time and `tout` ends the call early with
    /// [`Outcome::StopTimeReached`]. [`Outcome::Warning`] is logged and
    /// returned without failing.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotInitialized`] before [`Session::init`] and
    /// [`Error::Integration`] if the engine fails. After a failure the
    /// session reflects the last step the engine accepted.
    pub fn solve(&mut self, tout: f64) -> Result<Outcome, Error> {
        let engine = self.engine.as_mut().ok_or(Error::NotInitialized)?;
        self.sens_ok = false;

        if tout <= self.times.current {
            info!(
                "simulation end time reached (t = {}, tout = {tout})",
                self.times.current
            );
            return Ok(Outcome::Success);
        }

        let current = self.times.current;
        let staged_stop = self
            .config
            .stop_time
            .filter(|tstop| *tstop > current && *tstop < tout);

        let mut outcome = Outcome::Success;
        while self.times.current < tout {
            engine
                .set_stop_time(staged_stop.unwrap_or(tout))
                .map_err(|source| Error::EngineConfig {
                    setting: "stop time",
                    source,
                })?;

            self.times.shift();
            let result = engine.solve(&mut Bridge::new(&mut self.provider), tout, Task::Normal);
            let (reached, y, ydot) = engine.solution();
            self.times.land(reached);
            self.buffers.copy_solution(y, ydot);
            let (status, reached) = result.map_err(|source| Error::integration(reached, source))?;

            outcome = status;
            match status {
                Outcome::Warning => warn!("step size is negligible at t = {reached}"),
                Outcome::StopTimeReached if reached < tout => {
                    info!("stop time reached at t = {reached} before tout = {tout}");
                    break;
                }
                _ => {}
            }
        }
        Ok(outcome)
    }

    /// Takes one internal step toward `tout` and returns the time reached.
    ///
    /// The step may end before or after `tout`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotInitialized`] before [`Session::init`],
    /// [`Error::InvalidTimeOrder`] unless `tout` is ahead of the current time,
    /// and [`Error::Integration`] if the engine fails or reports a warning.
    pub fn step(&mut self, tout: f64) -> Result<f64, Error> {
        let engine = self.engine.as_mut().ok_or(Error::NotInitialized)?;
        if tout <= self.times.current {
            return Err(Error::InvalidTimeOrder {
                tout,
                current: self.times.current,
            });
        }
        self.sens_ok = false;

        self.times.shift();
        let result = engine.solve(&mut Bridge::new(&mut self.provider), tout, Task::OneStep);
        let (reached, y, ydot) = engine.solution();
        self.times.land(reached);
        self.buffers.copy_solution(y, ydot);
        let (status, reached) = result.map_err(|source| Error::integration(reached, source))?;

        if status == Outcome::Warning {
            warn!("step size is negligible at t = {reached}");
            return Err(Error::Integration {
                t: reached,
                code: status.code(),
                source: None,
            });
        }
        Ok(reached)
    }

    /// Sensitivity `∂y[k]/∂p[p]` at the current time.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IndexOutOfRange`] for an invalid component or
    /// parameter, [`Error::NotInitialized`] before [`Session::init`] and
    /// [`Error::Query`] if the engine cannot provide sensitivities.
    pub fn sensitivity(&mut self, k: usize, p: usize) -> Result<f64, Error> {
        if k >= self.n {
            return Err(Error::IndexOutOfRange {
                what: "component",
                index: k,
                len: self.n,
            });
        }
        if p >= self.ns {
            return Err(Error::IndexOutOfRange {
                what: "parameter",
                index: p,
                len: self.ns,
            });
        }
        self.refresh_sensitivities()?;
        Ok(self.buffers.sensitivity[[p, k]])
    }

    /// All sensitivities at the current time, one row per parameter.
    ///
    /// # Errors
    ///
    /// Same as [`Session::sensitivity`], apart from index checks.
    pub fn sensitivities(&mut self) -> Result<&Array2<f64>, Error> {
        if self.ns > 0 {
            self.refresh_sensitivities()?;
        }
        Ok(&self.buffers.sensitivity)
    }

    fn refresh_sensitivities(&mut self) -> Result<(), Error> {
        let engine = self.engine.as_ref().ok_or(Error::NotInitialized)?;
        if self.sens_ok {
            return Ok(());
        }
        let at_initial_time = self.times.current == self.times.t0;
        let s = sensitivity::latest(engine, at_initial_time).map_err(|source| Error::Query {
            what: "sensitivities",
            source,
        })?;
        buffers::copy_rows(&mut self.buffers.sensitivity, s);
        self.sens_ok = true;
        Ok(())
    }

    /// Quadrature values at the current time; empty without quadratures.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotInitialized`] before [`Session::init`] and
    /// [`Error::Query`] if the engine cannot provide them.
    pub fn quadrature(&mut self) -> Result<&[f64], Error> {
        if self.nq == 0 {
            return Ok(&[]);
        }
        let engine = self.engine.as_ref().ok_or(Error::NotInitialized)?;
        let (_, q) = engine.quadrature().map_err(|source| Error::Query {
            what: "quadratures",
            source,
        })?;
        self.buffers.quadrature.copy_from_slice(q);
        Ok(&self.buffers.quadrature)
    }

    /// State at the current time.
    #[must_use]
    pub fn solution(&self) -> &[f64] {
        &self.buffers.y
    }

    /// Time derivative of the state at the current time.
    #[must_use]
    pub fn derivative(&self) -> &[f64] {
        &self.buffers.ydot
    }

    /// Constraints applied by the last [`Session::init`] or constraint setter.
    #[must_use]
    pub fn constraints(&self) -> &[Constraint] {
        &self.buffers.constraints
    }

    #[must_use]
    pub fn times(&self) -> Times {
        self.times
    }

    #[must_use]
    pub fn initial_time(&self) -> f64 {
        self.times.t0
    }

    #[must_use]
    pub fn current_time(&self) -> f64 {
        self.times.current
    }

    #[must_use]
    pub fn previous_time(&self) -> f64 {
        self.times.previous
    }

    /// Span covered by the last `solve` or `step` call.
    #[must_use]
    pub fn step_size(&self) -> f64 {
        self.times.step_size
    }

    /// Step size the engine will attempt next.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotInitialized`] before [`Session::init`].
    pub fn current_step_from_engine(&self) -> Result<f64, Error> {
        Ok(self.engine()?.current_step())
    }

    /// Storage held by the engine.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotInitialized`] before [`Session::init`].
    pub fn workspace_size(&self) -> Result<Workspace, Error> {
        Ok(self.engine()?.workspace())
    }

    /// Engine counters since the last [`Session::init`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotInitialized`] before [`Session::init`].
    pub fn statistics(&self) -> Result<Stats, Error> {
        Ok(self.engine()?.stats())
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    #[must_use]
    pub fn equation_count(&self) -> usize {
        self.n
    }

    #[must_use]
    pub fn parameter_count(&self) -> usize {
        self.ns
    }

    #[must_use]
    pub fn quadrature_count(&self) -> usize {
        self.nq
    }

    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.engine.is_some()
    }

    #[must_use]
    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// Mutable access to the provider between engine calls.
    ///
    /// Changes take effect on the next engine evaluation; changes to initial
    /// conditions take effect on the next [`Session::init`].
    pub fn provider_mut(&mut self) -> &mut P {
        &mut self.provider
    }

    #[must_use]
    pub fn into_provider(self) -> P {
        self.provider
    }

    fn engine(&self) -> Result<&Engine, Error> {
        self.engine.as_ref().ok_or(Error::NotInitialized)
    }
}

fn init_error(context: &'static str) -> impl FnOnce(EngineError) -> Error {
    move |source| Error::EngineInit { context, source }
}
