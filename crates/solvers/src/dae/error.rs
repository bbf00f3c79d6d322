use thiserror::Error;
use weft_engine::EngineError;

/// Errors that can occur while configuring or running a [`Session`](super::Session).
#[derive(Debug, Error)]
pub enum Error {
    #[error("engine initialization failed at {context}")]
    EngineInit {
        context: &'static str,
        #[source]
        source: EngineError,
    },

    #[error("engine rejected the {setting} setting")]
    EngineConfig {
        setting: &'static str,
        #[source]
        source: EngineError,
    },

    #[error("invalid constraint code {code} for component {index}")]
    InvalidConstraint { index: usize, code: i32 },

    #[error("sensitivity initialization failed")]
    SensitivityInit {
        #[source]
        source: EngineError,
    },

    #[error("initial condition correction failed")]
    IcCorrection {
        #[source]
        source: EngineError,
    },

    /// The engine failed (or, for `step`, warned) while advancing.
    ///
    /// `t` is the last time the engine reached, which the session mirrors.
    #[error("integration failed at t = {t} with status {code}")]
    Integration {
        t: f64,
        code: i32,
        #[source]
        source: Option<EngineError>,
    },

    /// The engine could not report sensitivities or quadratures.
    #[error("engine could not provide {what}")]
    Query {
        what: &'static str,
        #[source]
        source: EngineError,
    },

    #[error("tout = {tout} must be greater than the current time {current}")]
    InvalidTimeOrder { tout: f64, current: f64 },

    #[error("{what} index {index} is out of range for length {len}")]
    IndexOutOfRange {
        what: &'static str,
        index: usize,
        len: usize,
    },

    #[error("the session has not been initialized")]
    NotInitialized,

    #[error("expected {expected} values, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}

impl Error {
    /// Numeric engine status behind this error, if any.
    #[must_use]
    pub fn code(&self) -> Option<i32> {
        match self {
            Self::EngineInit { source, .. }
            | Self::EngineConfig { source, .. }
            | Self::SensitivityInit { source }
            | Self::IcCorrection { source }
            | Self::Query { source, .. } => Some(source.code()),
            Self::Integration { code, .. } => Some(*code),
            Self::InvalidConstraint { .. }
            | Self::InvalidTimeOrder { .. }
            | Self::IndexOutOfRange { .. }
            | Self::NotInitialized
            | Self::DimensionMismatch { .. } => None,
        }
    }

    pub(super) fn integration(t: f64, source: EngineError) -> Self {
        Self::Integration {
            t,
            code: source.code(),
            source: Some(source),
        }
    }
}
