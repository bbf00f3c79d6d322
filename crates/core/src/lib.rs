//! Core traits and types for the Weft framework.
//!
//! This crate defines the shared vocabulary that DAE problems, the
//! integration engine and integration sessions build on:
//!
//! - [`DaeProblem`]: a residual evaluator with optional Jacobian, quadrature,
//!   sensitivity parameters and constraints
//! - [`EvalError`]: recoverable or fatal failure of a problem evaluation
//! - [`Constraint`] and [`ComponentKind`]: per-component solver hints
//! - [`JacobianColumns`]: column-major view of a dense or banded iteration matrix

mod constraint;
mod eval;
mod jacobian;
mod problems;

pub use constraint::{ComponentKind, Constraint, ConstraintError};
pub use eval::EvalError;
pub use jacobian::{JacobianColumns, Layout};
pub use problems::DaeProblem;
