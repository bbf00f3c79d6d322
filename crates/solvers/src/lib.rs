//! Solvers for the Weft framework.
//!
//! - [`dae`]: stateful integration sessions for differential-algebraic
//!   systems, with sensitivities, quadratures and constraints

pub mod dae;
