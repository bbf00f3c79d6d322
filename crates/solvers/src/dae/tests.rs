use approx::assert_relative_eq;
use weft_core::{Constraint, DaeProblem, EvalError};

use super::*;

/// `y' = -k y` with `∫ y dt` as a quadrature and `k` as the parameter.
#[derive(Debug, Clone)]
struct Decay {
    rate: f64,
    scale: f64,
    residual_calls: usize,
    constraint: Constraint,
}

impl Decay {
    fn new(rate: f64) -> Self {
        Self {
            rate,
            scale: 1.0,
            residual_calls: 0,
            constraint: Constraint::None,
        }
    }
}

impl DaeProblem for Decay {
    fn equation_count(&self) -> usize {
        1
    }

    fn initial_conditions(&mut self, _t0: f64, y: &mut [f64], ydot: &mut [f64]) {
        y[0] = 1.0;
        ydot[0] = -self.rate;
    }

    fn residual(
        &mut self,
        _t: f64,
        _dt: f64,
        y: &[f64],
        ydot: &[f64],
        r: &mut [f64],
    ) -> Result<(), EvalError> {
        self.residual_calls += 1;
        r[0] = ydot[0] + self.rate * y[0];
        Ok(())
    }

    fn quadrature_count(&self) -> usize {
        1
    }

    fn quadrature_rate(
        &mut self,
        _t: f64,
        y: &[f64],
        _ydot: &[f64],
        q: &mut [f64],
    ) -> Result<(), EvalError> {
        q[0] = y[0];
        Ok(())
    }

    fn parameters(&self) -> &[f64] {
        std::slice::from_ref(&self.rate)
    }

    fn set_parameter(&mut self, _index: usize, value: f64) {
        self.rate = value;
    }

    fn parameter_scales(&self) -> Vec<f64> {
        vec![self.scale]
    }

    fn constraint_count(&self) -> usize {
        usize::from(self.constraint.is_active())
    }

    fn constraint(&self, _index: usize) -> Constraint {
        self.constraint
    }
}

/// `y' = -y` with no optional features.
struct Plain;

impl DaeProblem for Plain {
    fn equation_count(&self) -> usize {
        1
    }

    fn initial_conditions(&mut self, _t0: f64, y: &mut [f64], ydot: &mut [f64]) {
        y[0] = 1.0;
        ydot[0] = -1.0;
    }

    fn residual(
        &mut self,
        _t: f64,
        _dt: f64,
        y: &[f64],
        ydot: &[f64],
        r: &mut [f64],
    ) -> Result<(), EvalError> {
        r[0] = ydot[0] + y[0];
        Ok(())
    }
}

/// `y0' = -y0`, `y1' = -2 y1`.
struct Pair;

impl DaeProblem for Pair {
    fn equation_count(&self) -> usize {
        2
    }

    fn initial_conditions(&mut self, _t0: f64, y: &mut [f64], ydot: &mut [f64]) {
        y.copy_from_slice(&[1.0, 1.0]);
        ydot.copy_from_slice(&[-1.0, -2.0]);
    }

    fn residual(
        &mut self,
        _t: f64,
        _dt: f64,
        y: &[f64],
        ydot: &[f64],
        r: &mut [f64],
    ) -> Result<(), EvalError> {
        r[0] = ydot[0] + y[0];
        r[1] = ydot[1] + 2.0 * y[1];
        Ok(())
    }
}

/// `y' = -1e-12 y`, slow enough that steps are tiny next to large times.
struct Slow;

impl DaeProblem for Slow {
    fn equation_count(&self) -> usize {
        1
    }

    fn initial_conditions(&mut self, _t0: f64, y: &mut [f64], ydot: &mut [f64]) {
        y[0] = 1.0;
        ydot[0] = -1e-12;
    }

    fn residual(
        &mut self,
        _t: f64,
        _dt: f64,
        y: &[f64],
        ydot: &[f64],
        r: &mut [f64],
    ) -> Result<(), EvalError> {
        r[0] = ydot[0] + 1e-12 * y[0];
        Ok(())
    }
}

/// Starts [`Slow`] at `t0 = 1e12` with a step negligible next to that time.
fn slow_at_large_time() -> Session<Slow> {
    let mut session = Session::new(Slow);
    session.set_initial_step_size(1e-3);
    session.init(1e12).expect("should initialize");
    session
}

fn initialized<P: DaeProblem>(provider: P) -> Session<P> {
    let mut session = Session::new(provider);
    session.init(0.0).expect("should initialize");
    session
}

#[test]
fn operations_require_init() {
    let mut session = Session::new(Decay::new(1.0));
    assert!(!session.is_initialized());

    assert!(matches!(session.solve(1.0), Err(Error::NotInitialized)));
    assert!(matches!(session.step(1.0), Err(Error::NotInitialized)));
    assert!(matches!(session.quadrature(), Err(Error::NotInitialized)));
    assert!(matches!(session.statistics(), Err(Error::NotInitialized)));
    assert!(matches!(
        session.current_step_from_engine(),
        Err(Error::NotInitialized)
    ));
}

#[test]
fn init_reads_counts_and_initial_conditions() {
    let session = initialized(Decay::new(2.0));

    assert!(session.is_initialized());
    assert_eq!(session.equation_count(), 1);
    assert_eq!(session.parameter_count(), 1);
    assert_eq!(session.quadrature_count(), 1);
    assert_eq!(session.solution(), &[1.0]);
    assert_eq!(session.derivative(), &[-2.0]);
    assert_eq!(
        session.times(),
        Times {
            t0: 0.0,
            current: 0.0,
            previous: 0.0,
            previous_previous: 0.0,
            step_size: 0.0,
        }
    );
}

#[test]
fn solve_reaches_tout_exactly() {
    let mut session = initialized(Plain);

    let outcome = session.solve(1.0).expect("should solve");

    assert_eq!(outcome, Outcome::Success);
    assert_eq!(session.current_time(), 1.0);
    assert_eq!(session.previous_time(), 0.0);
    assert_eq!(session.step_size(), 1.0);
    assert_relative_eq!(session.solution()[0], (-1.0_f64).exp(), max_relative = 1e-6);
    assert!(session.current_step_from_engine().expect("initialized") > 0.0);
}

#[test]
fn solve_behind_current_time_changes_nothing() {
    let mut session = initialized(Decay::new(1.0));
    session.solve(1.0).expect("should solve");
    let steps = session.statistics().expect("initialized").steps;
    let times = session.times();

    assert_eq!(session.solve(1.0).expect("no-op"), Outcome::Success);
    assert_eq!(session.solve(0.5).expect("no-op"), Outcome::Success);

    assert_eq!(session.times(), times);
    assert_eq!(session.statistics().expect("initialized").steps, steps);
}

#[test]
fn step_tracks_previous_times() {
    let mut session = initialized(Plain);

    let t1 = session.step(1.0).expect("should step");
    assert!(t1 > 0.0);
    assert_eq!(session.previous_time(), 0.0);
    assert_eq!(session.step_size(), t1);

    let t2 = session.step(1.0).expect("should step");
    assert!(t2 > t1);
    let times = session.times();
    assert_eq!(times.previous, t1);
    assert_eq!(times.previous_previous, 0.0);
    assert_relative_eq!(times.step_size, t2 - t1);
}

#[test]
fn step_rejects_tout_not_ahead() {
    let mut session = initialized(Decay::new(1.0));
    let calls = session.provider().residual_calls;

    let error = session.step(0.0).expect_err("tout equals current time");

    assert!(matches!(
        error,
        Error::InvalidTimeOrder { tout, current } if tout == 0.0 && current == 0.0
    ));
    assert_eq!(session.provider().residual_calls, calls);
    assert_eq!(error.code(), None);
}

#[test]
fn staged_stop_time_ends_solve_early() {
    let mut session = Session::new(Plain);
    session.set_stop_time(0.5);
    session.init(0.0).expect("should initialize");

    assert_eq!(
        session.solve(1.0).expect("should solve"),
        Outcome::StopTimeReached
    );
    assert_relative_eq!(session.current_time(), 0.5);

    assert_eq!(session.solve(1.0).expect("should solve"), Outcome::Success);
    assert_eq!(session.current_time(), 1.0);
}

#[test]
fn too_few_steps_fails_with_engine_code() {
    let mut session = Session::new(Plain);
    session.set_max_num_steps(1);
    session.init(0.0).expect("should initialize");

    let error = session.solve(100.0).expect_err("one step is not enough");

    assert!(matches!(error, Error::Integration { code: -1, .. }));
    assert_eq!(error.code(), Some(-1));
}

#[test]
fn failed_solve_keeps_the_last_accepted_step() {
    let mut session = Session::new(Decay::new(1.0));
    session.set_max_num_steps(3);
    session.init(0.0).expect("should initialize");

    let error = session.solve(100.0).expect_err("three steps are not enough");

    let t = session.current_time();
    assert!(t > 0.0);
    assert!(matches!(error, Error::Integration { code: -1, t: failed_at, .. } if failed_at == t));
    assert_eq!(session.times().previous, 0.0);
    assert_relative_eq!(session.step_size(), t);
    assert_relative_eq!(session.solution()[0], (-t).exp(), max_relative = 1e-6);

    let q = session.quadrature().expect("quadrature enabled")[0];
    assert_relative_eq!(q, 1.0 - (-t).exp(), max_relative = 1e-3);

    assert!(matches!(
        session.step(0.5 * t),
        Err(Error::InvalidTimeOrder { current, .. }) if current == t
    ));
}

#[test]
fn negligible_steps_warn_in_solve_but_fail_in_step() {
    let mut session = slow_at_large_time();
    let error = session.step(1e12 + 1.0).expect_err("step size is negligible");

    assert!(matches!(
        error,
        Error::Integration {
            code: 99,
            source: None,
            ..
        }
    ));
    assert_eq!(error.code(), Some(99));
    assert!(session.current_time() > 1e12);
    assert!(matches!(error, Error::Integration { t, .. } if t == session.current_time()));

    let mut session = slow_at_large_time();
    assert_eq!(
        session.solve(1e12 + 1.0).expect("warnings do not fail solve"),
        Outcome::Warning
    );
    assert_eq!(session.current_time(), 1e12 + 1.0);
}

#[test]
fn quadrature_is_empty_without_integrands() {
    let mut session = Session::new(Plain);
    assert!(session.quadrature().expect("nothing to integrate").is_empty());

    session.init(0.0).expect("should initialize");
    session.solve(1.0).expect("should solve");
    assert!(session.quadrature().expect("nothing to integrate").is_empty());
}

#[test]
fn quadrature_integrates_the_state() {
    let mut session = initialized(Decay::new(1.0));
    session.solve(1.0).expect("should solve");

    let q = session.quadrature().expect("quadrature enabled");
    assert_relative_eq!(q[0], 1.0 - (-1.0_f64).exp(), max_relative = 1e-5);
}

#[test]
fn sensitivity_indices_are_checked_first() {
    let mut session = Session::new(Decay::new(1.0));

    assert!(matches!(
        session.sensitivity(1, 0),
        Err(Error::IndexOutOfRange {
            what: "component",
            index: 1,
            len: 1
        })
    ));
    assert!(matches!(
        session.sensitivity(0, 1),
        Err(Error::IndexOutOfRange {
            what: "parameter",
            index: 1,
            len: 1
        })
    ));
    assert!(matches!(
        session.sensitivity(0, 0),
        Err(Error::NotInitialized)
    ));
}

#[test]
fn sensitivities_start_at_zero_and_evolve() {
    let mut session = initialized(Decay::new(1.0));
    assert_eq!(session.sensitivity(0, 0).expect("valid indices"), 0.0);

    session.solve(1.0).expect("should solve");
    let expected = -(-1.0_f64).exp();
    assert_relative_eq!(
        session.sensitivity(0, 0).expect("valid indices"),
        expected,
        max_relative = 1e-3
    );

    let all = session.sensitivities().expect("sensitivities enabled");
    assert_eq!(all.dim(), (1, 1));
    assert_relative_eq!(all[[0, 0]], expected, max_relative = 1e-3);
    assert_eq!(session.provider().rate, 1.0);
}

#[test]
fn bad_parameter_scale_fails_sensitivity_init() {
    let mut decay = Decay::new(1.0);
    decay.scale = 0.0;
    let mut session = Session::new(decay);

    let error = session.init(0.0).expect_err("scale must be positive");

    assert!(matches!(error, Error::SensitivityInit { .. }));
    assert_eq!(error.code(), Some(-22));
    assert!(!session.is_initialized());
}

#[test]
fn unsupported_linear_solver_fails_init() {
    let mut session = Session::new(Plain);
    session.set_linear_solver_type(7);

    let error = session.init(0.0).expect_err("selector 7 is unsupported");

    assert!(matches!(
        error,
        Error::EngineInit {
            context: "linear solver",
            ..
        }
    ));
    assert_eq!(error.code(), Some(-22));
    assert!(!session.is_initialized());
}

#[test]
fn provider_constraints_are_overlaid_by_staged_ones() {
    let mut decay = Decay::new(1.0);
    decay.constraint = Constraint::Positive;
    let mut session = initialized(decay);
    assert_eq!(session.constraints(), &[Constraint::Positive]);

    session.set_constraint(0, 1).expect("valid constraint");
    assert_eq!(session.constraints(), &[Constraint::NonNegative]);

    session.init(0.0).expect("should initialize");
    assert_eq!(session.constraints(), &[Constraint::NonNegative]);
}

#[test]
fn constraint_setters_validate_before_mutating() {
    let mut session = initialized(Plain);
    session.set_constraints(&[2]).expect("valid constraints");

    assert!(matches!(
        session.set_constraints(&[99]),
        Err(Error::InvalidConstraint { index: 0, code: 99 })
    ));
    assert!(matches!(
        session.set_constraint(0, -3),
        Err(Error::InvalidConstraint { index: 0, code: -3 })
    ));
    assert!(matches!(
        session.set_constraint(1, 1),
        Err(Error::IndexOutOfRange { index: 1, .. })
    ));
    assert!(matches!(
        session.set_constraints(&[1, 1]),
        Err(Error::DimensionMismatch {
            expected: 1,
            actual: 2
        })
    ));
    assert_eq!(session.constraints(), &[Constraint::Positive]);
}

#[test]
fn rejected_constraint_vector_leaves_every_component_unchanged() {
    let mut session = initialized(Pair);
    session.set_constraints(&[1, 2]).expect("valid constraints");

    assert!(matches!(
        session.set_constraints(&[0, 99]),
        Err(Error::InvalidConstraint { index: 1, code: 99 })
    ));
    assert_eq!(
        session.constraints(),
        &[Constraint::NonNegative, Constraint::Positive]
    );

    session.solve(1.0).expect("constraints still hold");
    assert_relative_eq!(session.solution()[0], (-1.0_f64).exp(), max_relative = 1e-5);
    assert_relative_eq!(session.solution()[1], (-2.0_f64).exp(), max_relative = 1e-5);
}

#[test]
fn tolerance_vector_must_match_equation_count() {
    let mut session = initialized(Plain);

    assert!(matches!(
        session.set_tolerance_vector(1e-6, &[1e-8, 1e-8]),
        Err(Error::DimensionMismatch { .. })
    ));
    assert!(matches!(
        session.set_tolerances(-1.0, 1e-8),
        Err(Error::EngineConfig {
            setting: "tolerances",
            ..
        })
    ));
    assert_eq!(
        session.config().tolerances(),
        &Tolerances::Scalar {
            rtol: DEFAULT_RTOL,
            atol: DEFAULT_ATOL
        }
    );

    session
        .set_tolerance_vector(1e-6, &[1e-8])
        .expect("valid tolerances");
    session.solve(1.0).expect("should solve");
}

#[test]
fn staged_settings_are_kept_in_config() {
    let mut session = Session::new(Plain);
    session.set_banded_linear_solver(0, 0);
    session.set_max_order(3);
    session.set_initial_step_size(1e-3);
    session.include_algebraic_in_error_test(false);
    session.set_sensitivity_tolerances(1e-4, 1e-6);

    let config = session.config();
    assert_eq!(config.linear_solver_type(), 2);
    assert_eq!(config.bandwidths(), (0, 0));
    assert_eq!(config.max_order(), Some(3));
    assert_eq!(config.initial_step_size(), Some(1e-3));
    assert!(!config.includes_algebraic_in_error_test());
    assert_eq!(config.sensitivity_tolerances(), (1e-4, 1e-6));
    assert_eq!(config.max_num_steps(), DEFAULT_MAX_NUM_STEPS);
}

#[test]
fn invalid_staged_option_fails_init() {
    let mut session = Session::new(Plain);
    session.set_max_order(0);

    let error = session.init(0.0).expect_err("order zero is invalid");
    assert!(matches!(
        error,
        Error::EngineInit {
            context: "max order",
            ..
        }
    ));
}

#[test]
fn initial_condition_outputs_must_match() {
    let mut session = initialized(Plain);
    let mut y = [0.0; 2];
    let mut ydot = [0.0; 1];

    assert!(matches!(
        session.correct_initial_y_given_yp(&mut y, &mut ydot, None),
        Err(Error::DimensionMismatch {
            expected: 1,
            actual: 2
        })
    ));
}

#[test]
fn initial_condition_correction_reports_engine_rejections() {
    let mut session = initialized(Plain);
    let mut y = [0.0];
    let mut ydot = [0.0];

    let error = session
        .correct_initial_y_given_yp(&mut y, &mut ydot, Some(0.0))
        .expect_err("tout1 equals t0");
    assert!(matches!(error, Error::IcCorrection { .. }));
    assert_eq!(error.code(), Some(-22));
    assert_eq!(y, [0.0]);
    assert_eq!(session.solution(), &[1.0]);

    session.solve(1.0).expect("should solve");
    let error = session
        .correct_initial_y_given_yp(&mut y, &mut ydot, None)
        .expect_err("integration has started");
    assert!(matches!(error, Error::IcCorrection { .. }));
    assert_eq!(error.code(), Some(-22));
    assert_eq!(session.current_time(), 1.0);
}

#[test]
fn workspace_reflects_enabled_features() {
    let plain = initialized(Plain);
    let decay = initialized(Decay::new(1.0));

    let small = plain.workspace_size().expect("initialized");
    let large = decay.workspace_size().expect("initialized");
    assert!(large.real > small.real);
}

#[test]
fn into_provider_returns_ownership() {
    let mut session = initialized(Decay::new(3.0));
    session.provider_mut().rate = 1.0;
    session.solve(1.0).expect("should solve");

    let decay = session.into_provider();
    assert_eq!(decay.rate, 1.0);
    assert!(decay.residual_calls > 0);
}
