use rust_decimal::Decimal;
use tracing::trace;

use super::{FailureReason, Outcome, SolverConfig};

/// Newton-Raphson root finding on `f(x) = 0`.
///
/// `f` and `df` return `None` when they cannot be evaluated at `x` (overflow,
/// a non-positive discount base, ...); that ends the run as `OutOfDomain`.
/// With `domain = Some((lower, upper))` every iterate must satisfy
/// `lower < x <= upper`.
///
/// Converged when `|f(x)|` meets `config.tolerance` or when a step is smaller
/// than `config.step_tolerance`.
pub fn newton_raphson<F, DF>(
    f: F,
    df: DF,
    guess: Decimal,
    domain: Option<(Decimal, Decimal)>,
    config: &SolverConfig,
) -> Outcome<Decimal>
where
    F: Fn(Decimal) -> Option<Decimal>,
    DF: Fn(Decimal) -> Option<Decimal>,
{
    let in_domain = |x: Decimal| match domain {
        Some((lower, upper)) => x > lower && x <= upper,
        None => true,
    };
    let failed = |reason, x, iterations, residual| Outcome::Failed {
        reason,
        last_estimate: x,
        iterations,
        residual,
    };

    let mut x = guess;
    if !in_domain(x) {
        return failed(FailureReason::OutOfDomain, x, 0, Decimal::ZERO);
    }

    for i in 0..config.max_iterations {
        let fx = match f(x) {
            Some(v) => v,
            None => return failed(FailureReason::OutOfDomain, x, i, Decimal::ZERO),
        };
        trace!(iteration = i, x = %x, residual = %fx, "newton step");

        if config.tolerance.is_satisfied(fx, x) {
            return Outcome::Converged {
                value: x,
                iterations: i,
                residual: fx,
            };
        }

        let dfx = match df(x) {
            Some(v) => v,
            None => return failed(FailureReason::OutOfDomain, x, i, fx),
        };
        if dfx.is_zero() {
            return failed(FailureReason::ZeroDerivative, x, i, fx);
        }

        let next = match fx.checked_div(dfx).and_then(|step| x.checked_sub(step)) {
            Some(v) => v,
            None => return failed(FailureReason::OutOfDomain, x, i, fx),
        };
        if !in_domain(next) {
            return failed(FailureReason::OutOfDomain, x, i + 1, fx);
        }

        let step = (next - x).abs();
        x = next;

        if let Some(step_tol) = config.step_tolerance {
            if step < step_tol {
                let residual = f(x).unwrap_or(fx);
                return Outcome::Converged {
                    value: x,
                    iterations: i + 1,
                    residual,
                };
            }
        }
    }

    let residual = f(x).unwrap_or(Decimal::MAX);
    failed(FailureReason::NoConvergence, x, config.max_iterations, residual)
}
