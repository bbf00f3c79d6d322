use thiserror::Error;

/// Failure reported by a [`DaeProblem`](crate::DaeProblem) evaluation.
///
/// The integration engine distinguishes two kinds of failure. A recoverable
/// failure asks the engine to retry with adjusted step parameters (for
/// example when a trial state left the physically meaningful domain), while a
/// fatal failure aborts the integration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EvalError {
    /// The evaluation failed but a smaller step may succeed.
    #[error("recoverable evaluation failure: {reason}")]
    Recoverable { reason: String },

    /// The evaluation failed and integration cannot continue.
    #[error("fatal evaluation failure: {reason}")]
    Fatal { reason: String },
}

impl EvalError {
    /// Creates a recoverable failure.
    pub fn recoverable(reason: impl Into<String>) -> Self {
        Self::Recoverable {
            reason: reason.into(),
        }
    }

    /// Creates a fatal failure.
    pub fn fatal(reason: impl Into<String>) -> Self {
        Self::Fatal {
            reason: reason.into(),
        }
    }

    /// Interprets a numeric evaluation status.
    ///
    /// Zero is success, a positive value is a recoverable failure and a
    /// negative value is fatal. This is the convention used by evaluators
    /// that compute status codes rather than returning errors directly.
    ///
    /// # Errors
    ///
    /// Returns the matching [`EvalError`] for any non-zero status.
    pub fn from_status(status: i32) -> Result<(), Self> {
        match status {
            0 => Ok(()),
            s if s > 0 => Err(Self::recoverable(format!("status {s}"))),
            s => Err(Self::fatal(format!("status {s}"))),
        }
    }

    /// Returns `true` if the engine may retry after this failure.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Recoverable { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_map_to_three_outcomes() {
        assert_eq!(EvalError::from_status(0), Ok(()));

        let recoverable = EvalError::from_status(3).unwrap_err();
        assert!(recoverable.is_recoverable());

        let fatal = EvalError::from_status(-1).unwrap_err();
        assert!(!fatal.is_recoverable());
    }
}
