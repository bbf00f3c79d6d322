use std::ops::Range;

use log::{debug, trace, warn};
use weft_core::ComponentKind;

use crate::{Callbacks, EngineError, Outcome, Task, Tolerances, linalg::Factorization};

use super::{Engine, Failure, Source, error_weights, wrms};

/// Bounds on the step-size change after one attempt.
const MIN_FACTOR: f64 = 0.2;
const MAX_FACTOR: f64 = 5.0;
const SAFETY: f64 = 0.9;

/// Step-size reduction after a convergence or constraint failure.
const CONV_FAIL_FACTOR: f64 = 0.25;

/// Positions of the state, derivative, quadratures and sensitivities within
/// one packed tableau entry.
#[derive(Debug, Clone, Copy)]
struct Packing {
    n: usize,
    nq: usize,
    ns: usize,
}

impl Packing {
    fn len(self) -> usize {
        2 * self.n + self.nq + 2 * self.ns * self.n
    }

    fn y(self) -> Range<usize> {
        0..self.n
    }

    fn yp(self) -> Range<usize> {
        self.n..2 * self.n
    }

    fn q(self) -> Range<usize> {
        2 * self.n..2 * self.n + self.nq
    }

    fn s(self, index: usize) -> Range<usize> {
        let start = 2 * self.n + self.nq + index * self.n;
        start..start + self.n
    }

    fn sp(self, index: usize) -> Range<usize> {
        let start = 2 * self.n + self.nq + (self.ns + index) * self.n;
        start..start + self.n
    }
}

/// Error weights frozen at the start of a step.
struct Weights {
    state: Vec<f64>,
    error: Vec<f64>,
    quadrature: Option<Vec<f64>>,
    sensitivity: Vec<Vec<f64>>,
}

struct Candidate {
    packed: Vec<f64>,
    error: f64,
}

struct StepReport {
    negligible: bool,
}

impl Engine {
    /// Advances the solution toward `tout`.
    ///
    /// With [`Task::Normal`] the engine steps until it lands exactly on
    /// `tout` (or on the stop time, if that comes first). With
    /// [`Task::OneStep`] it takes a single step, which may overshoot `tout`
    /// but never the stop time. Returns the outcome and the time reached.
    ///
    /// # Errors
    ///
    /// Returns an [`EngineError`] if the integration fails.
    pub fn solve(
        &mut self,
        cb: &mut dyn Callbacks,
        tout: f64,
        task: Task,
    ) -> Result<(Outcome, f64), EngineError> {
        if !tout.is_finite() {
            return Err(EngineError::illegal("tout must be finite"));
        }
        let tolerances = self
            .tolerances
            .clone()
            .ok_or(EngineError::illegal("tolerances have not been set"))?;

        if !self.started {
            self.check_first_call(cb, &tolerances)?;
            self.started = true;
        }

        if task == Task::Normal && tout <= self.t {
            if tout == self.t {
                return Ok((Outcome::Success, self.t));
            }
            return Err(EngineError::illegal("tout is behind the current time"));
        }
        if let Some(tstop) = self.options.stop_time {
            if tstop < self.t {
                return Err(EngineError::illegal("stop time is behind the current time"));
            }
            if tstop == self.t {
                self.options.stop_time = None;
                return Ok((Outcome::StopTimeReached, self.t));
            }
        }

        if self.h_next == 0.0 {
            self.h_next = self.initial_step(&tolerances, tout)?;
            debug!("initial step size {}", self.h_next);
        }

        let mut steps = 0;
        let mut negligible = false;
        loop {
            if steps >= self.options.max_num_steps {
                return Err(EngineError::TooMuchWork {
                    max_steps: self.options.max_num_steps,
                });
            }

            let limit = match (task, self.options.stop_time) {
                (Task::Normal, Some(tstop)) => Some(tout.min(tstop)),
                (Task::Normal, None) => Some(tout),
                (Task::OneStep, tstop) => tstop,
            };
            let report = self.step(cb, &tolerances, limit)?;
            steps += 1;
            negligible |= report.negligible;

            let reached = if negligible {
                Outcome::Warning
            } else {
                Outcome::Success
            };
            if task == Task::Normal && self.t >= tout {
                if self.options.stop_time.is_some_and(|tstop| self.t >= tstop) {
                    self.options.stop_time = None;
                }
                return Ok((reached, self.t));
            }
            if let Some(tstop) = self.options.stop_time {
                if self.t >= tstop {
                    self.options.stop_time = None;
                    return Ok((Outcome::StopTimeReached, self.t));
                }
            }
            if task == Task::OneStep {
                return Ok((reached, self.t));
            }
        }
    }

    fn check_first_call(
        &mut self,
        cb: &mut dyn Callbacks,
        tolerances: &Tolerances,
    ) -> Result<(), EngineError> {
        if self.options.suppress_alg && self.options.component_kinds.is_none() {
            return Err(EngineError::illegal(
                "suppressing algebraic components requires component kinds",
            ));
        }
        if self.violates_constraints(&self.y) {
            return Err(EngineError::illegal("initial state violates the constraints"));
        }
        self.state_weights(tolerances, &self.y)?;

        let (y, yp) = (self.y.clone(), self.yp.clone());
        let mut r = vec![0.0; self.size];
        match self.eval_residual(cb, self.t, &y, &yp, &mut r) {
            Ok(()) => Ok(()),
            Err(Failure::Fatal(error)) => Err(error),
            Err(_) => Err(EngineError::FirstResidualFailure),
        }
    }

    fn initial_step(&self, tolerances: &Tolerances, tout: f64) -> Result<f64, EngineError> {
        let mut h = match self.options.init_step {
            Some(h0) => h0,
            None => {
                let distance = (tout - self.t).abs();
                if distance <= 2.0 * f64::EPSILON * self.t.abs().max(tout.abs()) {
                    return Err(EngineError::illegal("tout is too close to the current time"));
                }
                let ewt = self.state_weights(tolerances, &self.y)?;
                let yp_norm = wrms(&self.yp, &ewt);
                let h0 = 0.001 * distance;
                if yp_norm * h0 > 0.5 { 0.5 / yp_norm } else { h0 }
            }
        };
        if let Some(h_max) = self.options.max_step {
            h = h.min(h_max);
        }
        Ok(h)
    }

    /// Takes one accepted step, retrying with smaller steps after failures.
    fn step(
        &mut self,
        cb: &mut dyn Callbacks,
        tolerances: &Tolerances,
        limit: Option<f64>,
    ) -> Result<StepReport, EngineError> {
        let weights = self.step_weights(tolerances)?;
        if f64::EPSILON * wrms(&self.y, &weights.state) > 1.0 {
            return Err(EngineError::TooMuchAccuracy { t: self.t });
        }

        let rows = self.options.max_order.max(2);
        let mut h = self.h_next;
        let mut error_fails = 0;
        let mut conv_fails = 0;
        let mut last_failure = None;

        loop {
            let (h_try, lands) = match limit {
                Some(limit) if self.t + 1.1 * h >= limit => (limit - self.t, true),
                _ => (h, false),
            };
            if self.t + h_try <= self.t {
                return Err(self.exhausted(last_failure, h_try));
            }
            self.h_current = h_try;

            match self.attempt(cb, h_try, rows, &weights) {
                Ok(candidate) if candidate.error <= 1.0 => {
                    let mut factor = step_factor(candidate.error, rows);
                    if error_fails + conv_fails > 0 {
                        factor = factor.min(1.0);
                    }
                    self.accept(candidate.packed, if lands { limit } else { None }, h_try);
                    self.h_next = if lands && h_try < h { h } else { h_try * factor };
                    if let Some(h_max) = self.options.max_step {
                        self.h_next = self.h_next.min(h_max);
                    }

                    let negligible = !lands && h_try < 100.0 * f64::EPSILON * self.t.abs();
                    if negligible {
                        warn!("step size {h_try} is negligible at t = {}", self.t);
                    }
                    trace!("accepted step to t = {} with h = {h_try}", self.t);
                    return Ok(StepReport { negligible });
                }
                Ok(candidate) => {
                    error_fails += 1;
                    self.stats.error_test_failures += 1;
                    debug!(
                        "error test failed at t = {} with h = {h_try} (error {})",
                        self.t, candidate.error
                    );
                    if error_fails > self.options.max_err_test_fails {
                        return Err(EngineError::ErrorTestFailure { t: self.t, h: h_try });
                    }
                    let factor = if error_fails > 1 {
                        CONV_FAIL_FACTOR
                    } else {
                        step_factor(candidate.error, rows).min(SAFETY)
                    };
                    h = h_try * factor;
                    last_failure = None;
                }
                Err(Failure::Fatal(error)) => return Err(error),
                Err(failure) => {
                    conv_fails += 1;
                    self.stats.convergence_failures += 1;
                    debug!(
                        "step at t = {} with h = {h_try} failed: {failure:?}",
                        self.t
                    );
                    if conv_fails > self.options.max_conv_fails {
                        return Err(self.exhausted(Some(failure), h_try));
                    }
                    h = h_try * CONV_FAIL_FACTOR;
                    last_failure = Some(failure);
                }
            }
        }
    }

    /// Error returned once a step cannot be completed.
    ///
    /// `None` means the error test was the last thing to fail.
    fn exhausted(&self, failure: Option<Failure>, h: f64) -> EngineError {
        let t = self.t;
        match failure {
            None => EngineError::ErrorTestFailure { t, h },
            Some(Failure::Fatal(error)) => error,
            Some(Failure::NotConverged | Failure::Recoverable(Source::Jacobian)) => {
                EngineError::ConvergenceFailure { t, h }
            }
            Some(Failure::ConstraintViolated) => EngineError::ConstraintFailure { t },
            Some(Failure::Recoverable(Source::LinearSetup)) => {
                EngineError::LinearSetupFailure { t }
            }
            Some(Failure::Recoverable(
                Source::Residual | Source::Quadrature | Source::Sensitivity,
            )) => EngineError::RepeatedResidualError { t },
        }
    }

    fn step_weights(&self, tolerances: &Tolerances) -> Result<Weights, EngineError> {
        let state = self.state_weights(tolerances, &self.y)?;

        let error = match (&self.options.component_kinds, self.options.suppress_alg) {
            (Some(kinds), true) => state
                .iter()
                .zip(kinds)
                .map(|(w, kind)| match kind {
                    ComponentKind::Differential => *w,
                    ComponentKind::Algebraic => 0.0,
                })
                .collect(),
            _ => state.clone(),
        };

        let quadrature = match &self.quadrature {
            Some(quad) => match quad.tolerances {
                Some((rtol, atol)) => Some(
                    error_weights(&quad.q, |_| (rtol, atol)).ok_or(EngineError::BadErrorWeight)?,
                ),
                None => None,
            },
            None => None,
        };

        let sensitivity = match &self.sensitivity {
            Some(sens) => self.sensitivity_weights(tolerances, &sens.s)?,
            None => Vec::new(),
        };

        Ok(Weights {
            state,
            error,
            quadrature,
            sensitivity,
        })
    }

    fn packing(&self) -> Packing {
        Packing {
            n: self.size,
            nq: self.quadrature.as_ref().map_or(0, |quad| quad.q.len()),
            ns: self.sensitivity_count(),
        }
    }

    /// Builds the extrapolation tableau for one macro step of size `h`.
    fn attempt(
        &mut self,
        cb: &mut dyn Callbacks,
        h: f64,
        rows: usize,
        weights: &Weights,
    ) -> Result<Candidate, Failure> {
        let mut previous: Vec<Vec<f64>> = Vec::new();
        for j in 0..rows {
            let mut row = vec![self.sequence(cb, h, j + 1, weights)?];
            for l in 1..=j {
                let ratio = (j + 1) as f64 / (j + 1 - l) as f64 - 1.0;
                let next = row[l - 1]
                    .iter()
                    .zip(&previous[l - 1])
                    .map(|(fine, coarse)| fine + (fine - coarse) / ratio)
                    .collect();
                row.push(next);
            }
            previous = row;
        }

        let packing = self.packing();
        let best = &previous[rows - 1];
        let lower = &previous[rows - 2];
        if self.violates_constraints(&best[packing.y()]) {
            return Err(Failure::ConstraintViolated);
        }

        let difference = |range: Range<usize>| -> Vec<f64> {
            best[range.clone()]
                .iter()
                .zip(&lower[range])
                .map(|(a, b)| a - b)
                .collect()
        };
        let mut error = wrms(&difference(packing.y()), &weights.error);
        if let Some(w) = &weights.quadrature {
            error = error.max(wrms(&difference(packing.q()), w));
        }
        for (index, w) in weights.sensitivity.iter().enumerate() {
            error = error.max(wrms(&difference(packing.s(index)), w));
        }
        if !error.is_finite() {
            return Err(Failure::NotConverged);
        }

        Ok(Candidate {
            packed: previous.swap_remove(rows - 1),
            error,
        })
    }

    /// Integrates the macro step with `substeps` implicit Euler steps and
    /// returns the packed end values.
    fn sequence(
        &mut self,
        cb: &mut dyn Callbacks,
        h: f64,
        substeps: usize,
        weights: &Weights,
    ) -> Result<Vec<f64>, Failure> {
        let packing = self.packing();
        let hs = h / substeps as f64;

        let mut y = self.y.clone();
        let mut yp = self.yp.clone();
        let mut q = self
            .quadrature
            .as_ref()
            .map_or_else(Vec::new, |quad| quad.q.clone());
        let (mut s, mut sp) = self
            .sensitivity
            .as_ref()
            .map_or_else(Default::default, |sens| (sens.s.clone(), sens.sp.clone()));
        let mut lin: Option<Factorization> = None;

        for k in 1..=substeps {
            let t = if k == substeps {
                self.t + h
            } else {
                self.t + hs * k as f64
            };

            let y_pred: Vec<f64> = y.iter().zip(&yp).map(|(y, yp)| y + hs * yp).collect();
            let (y_new, yp_new) =
                self.correct(cb, t, hs, &y, &y_pred, &yp, &mut lin, &weights.state)?;

            if !q.is_empty() {
                let mut rate = vec![0.0; q.len()];
                self.eval_quadrature(cb, t, &y_new, &yp_new, &mut rate)?;
                for (qi, ri) in q.iter_mut().zip(&rate) {
                    *qi += hs * ri;
                }
            }

            if !s.is_empty() {
                let Some(factor) = lin.as_ref() else {
                    return Err(Failure::NotConverged);
                };
                for index in 0..s.len() {
                    let (si, spi) = self.correct_sensitivity(
                        cb,
                        t,
                        hs,
                        (&y_new, &yp_new),
                        (&s[index], &sp[index]),
                        index,
                        factor,
                        (&weights.state, &weights.sensitivity[index]),
                    )?;
                    s[index] = si;
                    sp[index] = spi;
                }
            }

            y = y_new;
            yp = yp_new;
        }

        let mut packed = vec![0.0; packing.len()];
        packed[packing.y()].copy_from_slice(&y);
        packed[packing.yp()].copy_from_slice(&yp);
        packed[packing.q()].copy_from_slice(&q);
        for index in 0..packing.ns {
            packed[packing.s(index)].copy_from_slice(&s[index]);
            packed[packing.sp(index)].copy_from_slice(&sp[index]);
        }
        Ok(packed)
    }

    fn accept(&mut self, packed: Vec<f64>, landed_on: Option<f64>, h: f64) {
        let packing = self.packing();
        self.t = landed_on.unwrap_or(self.t + h);
        self.h_last = h;
        self.stats.steps += 1;

        self.y.copy_from_slice(&packed[packing.y()]);
        self.yp.copy_from_slice(&packed[packing.yp()]);
        if let Some(quad) = self.quadrature.as_mut() {
            quad.q.copy_from_slice(&packed[packing.q()]);
        }
        if let Some(sens) = self.sensitivity.as_mut() {
            for index in 0..packing.ns {
                sens.s[index].copy_from_slice(&packed[packing.s(index)]);
                sens.sp[index].copy_from_slice(&packed[packing.sp(index)]);
            }
        }
    }
}

/// Step-size multiplier for a weighted local error estimate.
fn step_factor(error: f64, rows: usize) -> f64 {
    if error == 0.0 {
        return MAX_FACTOR;
    }
    (SAFETY * error.powf(-1.0 / rows as f64)).clamp(MIN_FACTOR, MAX_FACTOR)
}
