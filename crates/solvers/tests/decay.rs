use approx::assert_relative_eq;
use weft_core::{DaeProblem, EvalError};
use weft_solvers::dae::{Outcome, Session};

/// `y' = -k y`, `y(0) = y0`, with `∫ y dt` and `k` as a parameter.
struct Decay {
    rate: f64,
    y0: f64,
}

impl DaeProblem for Decay {
    fn equation_count(&self) -> usize {
        1
    }

    fn initial_conditions(&mut self, _t0: f64, y: &mut [f64], ydot: &mut [f64]) {
        y[0] = self.y0;
        ydot[0] = -self.rate * self.y0;
    }

    fn residual(
        &mut self,
        _t: f64,
        _dt: f64,
        y: &[f64],
        ydot: &[f64],
        r: &mut [f64],
    ) -> Result<(), EvalError> {
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
}

fn session(rate: f64) -> Session<Decay> {
    let mut session = Session::new(Decay { rate, y0: 1.0 });
    session.init(0.0).expect("should initialize");
    session
}

#[test]
fn decays_to_e_inverse() {
    let mut session = session(1.0);

    assert_eq!(session.solve(1.0).expect("should solve"), Outcome::Success);

    assert_eq!(session.current_time(), 1.0);
    assert_relative_eq!(session.solution()[0], (-1.0_f64).exp(), max_relative = 1e-6);
    assert_relative_eq!(session.derivative()[0], -(-1.0_f64).exp(), max_relative = 1e-5);
}

#[test]
fn reinitializing_starts_over() {
    let mut session = session(1.0);
    session.solve(1.0).expect("should solve");
    let first = session.solution().to_vec();
    let first_quadrature = session.quadrature().expect("enabled").to_vec();

    session.init(0.0).expect("should initialize again");
    assert_eq!(session.current_time(), 0.0);
    assert_eq!(session.solution(), &[1.0]);
    assert_eq!(session.quadrature().expect("enabled"), &[0.0]);

    session.solve(1.0).expect("should solve");
    assert_relative_eq!(session.solution()[0], first[0], max_relative = 1e-12);
    assert_relative_eq!(
        session.quadrature().expect("enabled")[0],
        first_quadrature[0],
        max_relative = 1e-12
    );
}

#[test]
fn split_solve_matches_single_solve() {
    let mut once = session(1.0);
    once.solve(2.0).expect("should solve");

    let mut split = session(1.0);
    split.solve(0.7).expect("should solve");
    assert_eq!(split.current_time(), 0.7);
    split.solve(2.0).expect("should solve");

    assert_eq!(split.previous_time(), 0.7);
    assert_relative_eq!(split.step_size(), 1.3, max_relative = 1e-12);
    assert_relative_eq!(split.solution()[0], once.solution()[0], max_relative = 1e-6);
    assert_relative_eq!(split.solution()[0], (-2.0_f64).exp(), max_relative = 1e-6);
}

#[test]
fn repeated_tout_is_a_no_op() {
    let mut session = session(1.0);
    session.solve(1.0).expect("should solve");
    let y = session.solution().to_vec();
    let stats = session.statistics().expect("initialized");

    assert_eq!(session.solve(1.0).expect("no-op"), Outcome::Success);

    assert_eq!(session.current_time(), 1.0);
    assert_eq!(session.solution(), y.as_slice());
    assert_eq!(session.statistics().expect("initialized"), stats);
}

#[test]
fn quadrature_accumulates_the_integral() {
    let mut session = session(1.0);
    session.solve(1.0).expect("should solve");

    let q = session.quadrature().expect("enabled");
    assert_relative_eq!(q[0], 1.0 - (-1.0_f64).exp(), max_relative = 1e-5);
}

#[test]
fn sensitivity_to_rate_matches_analytic_value() {
    let rate = 0.5;
    let mut session = session(rate);

    for tout in [1.0, 2.0] {
        session.solve(tout).expect("should solve");
        let expected = -tout * (-rate * tout).exp();
        let actual = session.sensitivity(0, 0).expect("valid indices");
        assert_relative_eq!(actual, expected, max_relative = 1e-3);
    }
    assert_eq!(session.provider().rate, rate);
}

#[test]
fn stepping_eventually_passes_tout() {
    let mut session = session(1.0);

    let mut steps = 0;
    while session.current_time() < 1.0 {
        let t = session.step(1.0).expect("should step");
        assert_eq!(session.current_time(), t);
        steps += 1;
    }

    assert!(steps > 1);
    let t = session.current_time();
    assert_relative_eq!(session.solution()[0], (-t).exp(), max_relative = 1e-5);
}
