use thiserror::Error;

/// Inequality constraint on a single state component.
///
/// The numeric codes follow the usual DAE-solver convention and are what
/// [`Constraint::from_code`] accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Constraint {
    /// Unconstrained (code `0`).
    #[default]
    None,
    /// `y >= 0` (code `1`).
    NonNegative,
    /// `y > 0` (code `2`).
    Positive,
    /// `y <= 0` (code `-1`).
    NonPositive,
    /// `y < 0` (code `-2`).
    Negative,
}

/// Error returned when a numeric code is not a valid [`Constraint`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("invalid constraint code {code}")]
pub struct ConstraintError {
    pub code: i32,
}

impl Constraint {
    /// Parses a numeric constraint code.
    ///
    /// # Errors
    ///
    /// Returns a [`ConstraintError`] if `code` is not one of `0, 1, 2, -1, -2`.
    pub fn from_code(code: i32) -> Result<Self, ConstraintError> {
        match code {
            0 => Ok(Self::None),
            1 => Ok(Self::NonNegative),
            2 => Ok(Self::Positive),
            -1 => Ok(Self::NonPositive),
            -2 => Ok(Self::Negative),
            _ => Err(ConstraintError { code }),
        }
    }

    /// Returns the numeric code of this constraint.
    #[must_use]
    pub fn code(self) -> i32 {
        match self {
            Self::None => 0,
            Self::NonNegative => 1,
            Self::Positive => 2,
            Self::NonPositive => -1,
            Self::Negative => -2,
        }
    }

    /// Returns `true` if `value` satisfies the constraint.
    #[must_use]
    pub fn is_satisfied_by(self, value: f64) -> bool {
        match self {
            Self::None => true,
            Self::NonNegative => value >= 0.0,
            Self::Positive => value > 0.0,
            Self::NonPositive => value <= 0.0,
            Self::Negative => value < 0.0,
        }
    }

    /// Returns `true` for any constraint other than [`Constraint::None`].
    #[must_use]
    pub fn is_active(self) -> bool {
        self != Self::None
    }
}

impl TryFrom<i32> for Constraint {
    type Error = ConstraintError;

    fn try_from(code: i32) -> Result<Self, Self::Error> {
        Self::from_code(code)
    }
}

/// Whether a state component is governed by a differential or an algebraic
/// relation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ComponentKind {
    /// The residual depends on the component's time derivative.
    #[default]
    Differential,
    /// The component appears without its time derivative.
    Algebraic,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_round_trip() {
        for code in [0, 1, 2, -1, -2] {
            let constraint = Constraint::from_code(code).expect("valid code");
            assert_eq!(constraint.code(), code);
        }
    }

    #[test]
    fn rejects_unknown_codes() {
        assert_eq!(Constraint::from_code(99), Err(ConstraintError { code: 99 }));
        assert!(Constraint::try_from(3).is_err());
    }

    #[test]
    fn checks_values() {
        assert!(Constraint::NonNegative.is_satisfied_by(0.0));
        assert!(!Constraint::Positive.is_satisfied_by(0.0));
        assert!(Constraint::NonPositive.is_satisfied_by(-1.0));
        assert!(!Constraint::Negative.is_satisfied_by(0.0));
        assert!(Constraint::None.is_satisfied_by(f64::MAX));
    }
}
