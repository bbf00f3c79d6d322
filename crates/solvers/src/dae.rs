//! Stateful integration of differential-algebraic systems.
//!
//! A [`Session`] drives a [`DaeProblem`] through the implicit integration
//! engine. It owns the engine handle, the staged configuration and the
//! buffers that mirror the engine's solution.
//!
//! # Lifecycle
//!
//! 1. Create a session from a problem with [`Session::new`].
//! 2. Stage configuration: tolerances, linear solver, step limits,
//!    constraints.
//! 3. Call [`Session::init`], which asks the problem for initial conditions,
//!    creates a fresh engine and applies everything staged so far.
//! 4. Optionally correct the initial conditions with
//!    [`Session::correct_initial_y_given_yp`] or
//!    [`Session::correct_initial_ya_yp_given_yd`].
//! 5. Advance with [`Session::solve`] (exactly to an output time) or
//!    [`Session::step`] (one internal step), then query the state,
//!    sensitivities and quadratures.
//!
//! Calling [`Session::init`] again discards the engine and every buffer and
//! starts over from the problem's initial conditions.
//!
//! # Failures
//!
//! Problem evaluations report [`EvalError::Recoverable`] to let the engine
//! retry with a smaller step and [`EvalError::Fatal`] to abort. Engine
//! failures surface as [`Error`] variants carrying the engine's numeric
//! status. A warning status is logged and tolerated by [`Session::solve`],
//! but [`Session::step`] treats it as a failure.
//!
//! Problems must not call back into the session that drives them; the
//! session is mutably borrowed for the duration of every engine call.
//!
//! [`DaeProblem`]: weft_core::DaeProblem
//! [`EvalError::Recoverable`]: weft_core::EvalError::Recoverable
//! [`EvalError::Fatal`]: weft_core::EvalError::Fatal

mod bridge;
mod buffers;
mod config;
mod error;
mod sensitivity;
mod session;

#[cfg(test)]
mod tests;

pub use config::{
    Config, DEFAULT_ATOL, DEFAULT_IC_PROBE_STEP, DEFAULT_MAX_NUM_STEPS, DEFAULT_RTOL,
    DEFAULT_SENS_ATOL, DEFAULT_SENS_RTOL,
};
pub use error::Error;
pub use session::{Session, Times};
pub use weft_engine::{Outcome, Stats, Tolerances, Workspace};
