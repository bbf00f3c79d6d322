//! Implicit integration engine for differential-algebraic systems.
//!
//! The [`Engine`] integrates `F(t, y, y') = 0` through a [`Callbacks`]
//! implementation and provides:
//!
//! - error control with scalar or per-component tolerances
//! - dense or banded Newton iteration matrices, analytic or approximated
//! - consistent initial-condition calculation
//! - quadratures and forward sensitivities integrated with the state
//! - inequality constraints and a stop time

mod callbacks;
mod engine;
mod error;
mod linalg;
mod options;

pub use callbacks::Callbacks;
pub use engine::Engine;
pub use error::{CallbackError, EngineError, Outcome};
pub use linalg::{BandMatrix, DenseMatrix, Matrix};
pub use options::{
    IcMode, LinearSolver, MAX_ORDER, SensitivityMethod, Stats, Task, Tolerances, Workspace,
};
