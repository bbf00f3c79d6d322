use log::debug;
use weft_core::{ComponentKind, Constraint, DaeProblem};
use weft_engine::{Engine, EngineError, Tolerances};

use super::{Session, init_error};
use crate::dae::error::Error;

impl<P: DaeProblem> Session<P> {
    /// Uses one relative and one absolute tolerance for every component.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EngineConfig`] if the engine exists and rejects them.
    pub fn set_tolerances(&mut self, rtol: f64, atol: f64) -> Result<(), Error> {
        self.stage_tolerances(Tolerances::Scalar { rtol, atol })
    }

    /// Uses one relative tolerance and a per-component absolute tolerance.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DimensionMismatch`] unless `atol` has one entry per
    /// equation, and [`Error::EngineConfig`] if the engine rejects them.
    pub fn set_tolerance_vector(&mut self, rtol: f64, atol: &[f64]) -> Result<(), Error> {
        self.check_len(atol.len())?;
        self.stage_tolerances(Tolerances::Vector {
            rtol,
            atol: atol.to_vec(),
        })
    }

    fn stage_tolerances(&mut self, tolerances: Tolerances) -> Result<(), Error> {
        if let Some(engine) = self.engine.as_mut() {
            engine
                .set_tolerances(tolerances.clone())
                .map_err(config_error("tolerances"))?;
        }
        self.config.tolerances = tolerances;
        Ok(())
    }

    /// Sensitivity tolerances, applied on the next [`Session::init`].
    ///
    /// Each parameter's absolute tolerance is `atol` divided by its scale.
    pub fn set_sensitivity_tolerances(&mut self, rtol: f64, atol: f64) {
        self.config.sens_rtol = rtol;
        self.config.sens_atol = atol;
    }

    /// Includes quadratures in the error test from the next
    /// [`Session::init`] on.
    pub fn set_quadrature_tolerances(&mut self, rtol: f64, atol: f64) {
        self.config.quad_tolerances = Some((rtol, atol));
    }

    /// Selects the linear solver by code: `0` or `1` dense, `2` banded.
    ///
    /// Other codes make the next [`Session::init`] fail.
    pub fn set_linear_solver_type(&mut self, code: i32) {
        self.config.linear_solver_type = code;
    }

    pub fn set_dense_linear_solver(&mut self) {
        self.config.linear_solver_type = 1;
    }

    /// Selects the banded solver with the given bandwidths.
    pub fn set_banded_linear_solver(&mut self, upper: usize, lower: usize) {
        self.config.linear_solver_type = 2;
        self.config.bandwidths = (upper, lower);
    }

    pub fn set_max_order(&mut self, order: usize) {
        self.config.max_order = Some(order);
    }

    pub fn set_max_num_steps(&mut self, steps: usize) {
        self.config.max_num_steps = steps;
    }

    /// Initial step size; also offsets the default probe time of
    /// initial-condition correction.
    pub fn set_initial_step_size(&mut self, h0: f64) {
        self.config.init_step = Some(h0);
    }

    pub fn set_stop_time(&mut self, tstop: f64) {
        self.config.stop_time = Some(tstop);
    }

    pub fn set_max_error_test_failures(&mut self, fails: usize) {
        self.config.max_err_test_fails = Some(fails);
    }

    pub fn set_max_nonlinear_iterations(&mut self, iters: usize) {
        self.config.max_nonlin_iters = Some(iters);
    }

    pub fn set_max_nonlinear_convergence_failures(&mut self, fails: usize) {
        self.config.max_conv_fails = Some(fails);
    }

    /// Whether algebraic components take part in the local error test.
    ///
    /// Excluding them requires component kinds.
    pub fn include_algebraic_in_error_test(&mut self, include: bool) {
        self.config.suppress_alg = !include;
    }

    /// Marks each component as differential or algebraic.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DimensionMismatch`] unless there is one kind per
    /// equation, and [`Error::EngineConfig`] if the engine rejects them.
    pub fn set_component_kinds(&mut self, kinds: &[ComponentKind]) -> Result<(), Error> {
        self.check_len(kinds.len())?;
        if let Some(engine) = self.engine.as_mut() {
            engine
                .set_component_kinds(kinds.to_vec())
                .map_err(config_error("component kinds"))?;
        }
        self.config.component_kinds = Some(kinds.to_vec());
        Ok(())
    }

    /// Constrains component `k` by numeric code (`0, 1, 2, -1, -2`).
    ///
    /// The staged constraint overrides the provider's own for that component.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IndexOutOfRange`] for an invalid component,
    /// [`Error::InvalidConstraint`] for an invalid code and
    /// [`Error::EngineConfig`] if the engine rejects the constraints.
    pub fn set_constraint(&mut self, k: usize, code: i32) -> Result<(), Error> {
        if k >= self.n {
            return Err(Error::IndexOutOfRange {
                what: "component",
                index: k,
                len: self.n,
            });
        }
        let constraint =
            Constraint::from_code(code).map_err(|_| Error::InvalidConstraint { index: k, code })?;
        self.staged_constraints[k] = Some(constraint);
        self.refresh_constraints()
    }

    /// Constrains every component by numeric code.
    ///
    /// Nothing changes unless every code is valid.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DimensionMismatch`] unless there is one code per
    /// equation, [`Error::InvalidConstraint`] for the first invalid code and
    /// [`Error::EngineConfig`] if the engine rejects the constraints.
    pub fn set_constraints(&mut self, codes: &[i32]) -> Result<(), Error> {
        self.check_len(codes.len())?;
        let constraints = codes
            .iter()
            .enumerate()
            .map(|(index, &code)| {
                Constraint::from_code(code).map_err(|_| Error::InvalidConstraint { index, code })
            })
            .collect::<Result<Vec<_>, _>>()?;

        for (staged, constraint) in self.staged_constraints.iter_mut().zip(constraints) {
            *staged = Some(constraint);
        }
        self.refresh_constraints()
    }

    /// Provider constraints overlaid with the staged ones.
    pub(super) fn effective_constraints(&self) -> Vec<Constraint> {
        let declared = self.provider.constraint_count() > 0;
        let constraints: Vec<Constraint> = (0..self.n)
            .map(|k| {
                self.staged_constraints[k].unwrap_or_else(|| {
                    if declared {
                        self.provider.constraint(k)
                    } else {
                        Constraint::None
                    }
                })
            })
            .collect();

        for (k, constraint) in constraints.iter().enumerate() {
            debug!("constraint on component {k}: {constraint:?}");
        }
        constraints
    }

    fn refresh_constraints(&mut self) -> Result<(), Error> {
        if self.engine.is_none() {
            return Ok(());
        }
        let constraints = self.effective_constraints();
        if let Some(engine) = self.engine.as_mut() {
            engine
                .set_constraints(constraints.clone())
                .map_err(config_error("constraints"))?;
        }
        self.buffers.constraints = constraints;
        Ok(())
    }

    /// Applies the staged step-control limits to a new engine.
    pub(super) fn apply_options(&self, engine: &mut Engine) -> Result<(), Error> {
        let config = &self.config;
        if let Some(order) = config.max_order {
            engine
                .set_max_order(order)
                .map_err(init_error("max order"))?;
        }
        engine
            .set_max_num_steps(config.max_num_steps)
            .map_err(init_error("max steps"))?;
        if let Some(h0) = config.init_step {
            engine
                .set_init_step(h0)
                .map_err(init_error("initial step size"))?;
        }
        if let Some(tstop) = config.stop_time {
            engine
                .set_stop_time(tstop)
                .map_err(init_error("stop time"))?;
        }
        if let Some(fails) = config.max_err_test_fails {
            engine
                .set_max_err_test_fails(fails)
                .map_err(init_error("max error test failures"))?;
        }
        if let Some(iters) = config.max_nonlin_iters {
            engine
                .set_max_nonlin_iters(iters)
                .map_err(init_error("max nonlinear iterations"))?;
        }
        if let Some(fails) = config.max_conv_fails {
            engine
                .set_max_conv_fails(fails)
                .map_err(init_error("max convergence failures"))?;
        }
        if config.suppress_alg {
            engine.set_suppress_alg(true);
        }
        Ok(())
    }

    fn check_len(&self, actual: usize) -> Result<(), Error> {
        if actual == self.n {
            Ok(())
        } else {
            Err(Error::DimensionMismatch {
                expected: self.n,
                actual,
            })
        }
    }
}

fn config_error(setting: &'static str) -> impl FnOnce(EngineError) -> Error {
    move |source| Error::EngineConfig { setting, source }
}
