use weft_engine::{Engine, EngineError, SensitivityMethod};

/// Enables forward sensitivities for `scales.len()` parameters.
///
/// Sensitivities start at zero. Each parameter gets the absolute tolerance
/// `atol / scale` so that one relative tolerance fits parameters of very
/// different magnitude.
pub(super) fn initialize(
    engine: &mut Engine,
    count: usize,
    scales: Vec<f64>,
    (rtol, atol): (f64, f64),
) -> Result<(), EngineError> {
    let n = engine.size();
    engine.sens_init(
        SensitivityMethod::Staggered,
        vec![vec![0.0; n]; count],
        vec![vec![0.0; n]; count],
    )?;

    let atol_sens = scales.iter().map(|scale| atol / scale).collect();
    engine.set_sens_scales(scales)?;
    engine.set_sens_tolerances(rtol, atol_sens)
}

/// Latest sensitivities held by the engine.
///
/// At the initial time these are the (possibly corrected) initial values.
pub(super) fn latest(engine: &Engine, at_initial_time: bool) -> Result<&[Vec<f64>], EngineError> {
    if at_initial_time {
        engine.sens_consistent_ic().map(|(s, _)| s)
    } else {
        engine.sensitivities().map(|(_, s)| s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> Engine {
        Engine::new(0.0, vec![1.0, 2.0], vec![0.0, 0.0]).expect("should create engine")
    }

    #[test]
    fn starts_from_zero_sensitivities() {
        let mut engine = engine();
        initialize(&mut engine, 2, vec![1.0, 10.0], (1e-5, 1e-7)).expect("should initialize");

        assert_eq!(engine.sensitivity_count(), 2);
        assert_eq!(engine.sensitivity_method(), Some(SensitivityMethod::Staggered));

        let s = latest(&engine, true).expect("should read initial values");
        assert_eq!(s, &[vec![0.0, 0.0], vec![0.0, 0.0]]);

        let s = latest(&engine, false).expect("should read sensitivities");
        assert_eq!(s.len(), 2);
    }

    #[test]
    fn rejects_bad_scales() {
        let mut engine = engine();
        let result = initialize(&mut engine, 1, vec![0.0], (1e-5, 1e-7));
        assert!(matches!(result, Err(EngineError::IllegalInput { .. })));

        let mut engine = self::engine();
        let result = initialize(&mut engine, 2, vec![1.0], (1e-5, 1e-7));
        assert!(matches!(result, Err(EngineError::IllegalInput { .. })));
    }

    #[test]
    fn needs_at_least_one_parameter() {
        let mut engine = engine();
        let result = initialize(&mut engine, 0, Vec::new(), (1e-5, 1e-7));
        assert!(matches!(result, Err(EngineError::IllegalInput { .. })));
        assert!(matches!(latest(&engine, false), Err(EngineError::NoSensitivity)));
    }
}
