use rust_decimal::Decimal;
use tracing::trace;

use super::{FailureReason, Outcome, SolverConfig, DIVERGENCE_BOUND};
use crate::error::CorpFinanceError;
use crate::CorpFinanceResult;

/// Fixed-point iteration `x_{k+1} = update(x_k)` over a state vector.
///
/// Stops when every component's change meets `config.tolerance` (residual =
/// largest absolute change), when any component passes the divergence bound,
/// or when the iteration cap is reached. Errors raised by `update` propagate
/// unchanged; the update must keep the vector length.
pub fn fixed_point<F>(
    initial: Vec<Decimal>,
    update: F,
    config: &SolverConfig,
) -> CorpFinanceResult<Outcome<Vec<Decimal>>>
where
    F: Fn(&[Decimal]) -> CorpFinanceResult<Vec<Decimal>>,
{
    let mut current = initial;
    let mut max_delta = Decimal::ZERO;

    for i in 0..config.max_iterations {
        let next = update(&current)?;
        if next.len() != current.len() {
            return Err(CorpFinanceError::invalid(
                "update",
                format!(
                    "Update changed the state size from {} to {}",
                    current.len(),
                    next.len()
                ),
            ));
        }

        max_delta = Decimal::ZERO;
        let mut converged = true;
        for (new, old) in next.iter().zip(current.iter()) {
            let delta = (*new - *old).abs();
            max_delta = max_delta.max(delta);
            if !config.tolerance.is_satisfied(delta, *new) {
                converged = false;
            }
        }
        trace!(iteration = i + 1, max_delta = %max_delta, "fixed-point step");

        if next.iter().any(|v| v.abs() > DIVERGENCE_BOUND) {
            return Ok(Outcome::Failed {
                reason: FailureReason::OutOfDomain,
                last_estimate: next,
                iterations: i + 1,
                residual: max_delta,
            });
        }

        current = next;
        if converged {
            return Ok(Outcome::Converged {
                value: current,
                iterations: i + 1,
                residual: max_delta,
            });
        }
    }

    Ok(Outcome::Failed {
        reason: FailureReason::NoConvergence,
        last_estimate: current,
        iterations: config.max_iterations,
        residual: max_delta,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::solvers::Tolerance;
    use rust_decimal_macros::dec;

    #[test]
    fn test_contracting_map_converges() {
        // x = 0.5x + 10 -> 20
        let outcome = fixed_point(
            vec![Decimal::ZERO],
            |x| Ok(vec![dec!(0.5) * x[0] + dec!(10)]),
            &SolverConfig::fixed_point(),
        )
        .unwrap();
        let value = outcome.value().unwrap()[0];
        assert!((value - dec!(20)).abs() < dec!(0.02), "got {value}");
    }

    #[test]
    fn test_two_component_system() {
        // x = y / 2 + 1, y = x / 2 + 1 -> x = y = 2
        let config = SolverConfig::fixed_point().with_tolerance(Tolerance::Absolute(dec!(0.000001)));
        let outcome = fixed_point(
            vec![Decimal::ZERO, Decimal::ZERO],
            |s| Ok(vec![s[1] / dec!(2) + dec!(1), s[0] / dec!(2) + dec!(1)]),
            &config,
        )
        .unwrap();
        let state = outcome.value().unwrap();
        assert!((state[0] - dec!(2)).abs() < dec!(0.00001));
        assert!((state[1] - dec!(2)).abs() < dec!(0.00001));
    }

    #[test]
    fn test_oscillation_hits_cap() {
        let config = SolverConfig::fixed_point().with_max_iterations(10);
        let outcome = fixed_point(vec![dec!(1)], |x| Ok(vec![dec!(1) - x[0] + dec!(0.5)]), &config)
            .unwrap();
        match outcome {
            Outcome::Failed {
                reason, iterations, ..
            } => {
                assert_eq!(reason, FailureReason::NoConvergence);
                assert_eq!(iterations, 10);
            }
            Outcome::Converged { .. } => panic!("oscillating map must not converge"),
        }
    }

    #[test]
    fn test_divergence_guard_stops_before_overflow() {
        let outcome = fixed_point(
            vec![dec!(1)],
            |x| Ok(vec![x[0] * dec!(3)]),
            &SolverConfig::fixed_point(),
        )
        .unwrap();
        assert!(matches!(
            outcome,
            Outcome::Failed {
                reason: FailureReason::OutOfDomain,
                ..
            }
        ));
    }

    #[test]
    fn test_state_size_change_is_an_error() {
        let result = fixed_point(
            vec![dec!(1)],
            |_| Ok(vec![dec!(1), dec!(2)]),
            &SolverConfig::fixed_point(),
        );
        assert!(result.is_err());
    }
}
