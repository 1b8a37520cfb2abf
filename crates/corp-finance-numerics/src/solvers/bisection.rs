use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use super::{FailureReason, Outcome, SolverConfig};

/// Scan an ascending grid and return the first adjacent pair `(a, b)` where
/// `f` changes sign. Points where `f` cannot be evaluated are skipped.
/// A grid point where `f` is exactly zero is returned as `(x, x)`.
pub fn find_bracket<F>(f: F, candidates: &[Decimal]) -> Option<(Decimal, Decimal)>
where
    F: Fn(Decimal) -> Option<Decimal>,
{
    let mut previous: Option<(Decimal, Decimal)> = None;
    for &x in candidates {
        let Some(fx) = f(x) else {
            continue;
        };
        if fx.is_zero() {
            return Some((x, x));
        }
        if let Some((px, pfx)) = previous {
            if pfx.is_sign_negative() != fx.is_sign_negative() {
                return Some((px, x));
            }
        }
        previous = Some((x, fx));
    }
    None
}

/// Bisection on `[lower, upper]`. `f(lower)` and `f(upper)` must differ in sign.
///
/// Converged only when `|f(mid)|` meets `config.tolerance`. A bracket that
/// can no longer be halved, or is narrower than `config.step_tolerance`,
/// ends the run as `NoConvergence` with the midpoint as last estimate.
pub fn bisection<F>(f: F, lower: Decimal, upper: Decimal, config: &SolverConfig) -> Outcome<Decimal>
where
    F: Fn(Decimal) -> Option<Decimal>,
{
    let (mut a, mut b) = if lower <= upper {
        (lower, upper)
    } else {
        (upper, lower)
    };

    let (fa, fb) = match (f(a), f(b)) {
        (Some(fa), Some(fb)) => (fa, fb),
        _ => {
            return Outcome::Failed {
                reason: FailureReason::OutOfDomain,
                last_estimate: (a + b) / dec!(2),
                iterations: 0,
                residual: Decimal::ZERO,
            }
        }
    };
    if fa.is_zero() {
        return Outcome::Converged {
            value: a,
            iterations: 0,
            residual: fa,
        };
    }
    if fb.is_zero() {
        return Outcome::Converged {
            value: b,
            iterations: 0,
            residual: fb,
        };
    }
    if fa.is_sign_negative() == fb.is_sign_negative() {
        return Outcome::Failed {
            reason: FailureReason::NoBracket,
            last_estimate: (a + b) / dec!(2),
            iterations: 0,
            residual: fa.abs().min(fb.abs()),
        };
    }

    let mut fa = fa;
    let mut mid = (a + b) / dec!(2);
    let mut fmid = fa;

    for i in 0..config.max_iterations {
        mid = (a + b) / dec!(2);
        fmid = match f(mid) {
            Some(v) => v,
            None => {
                return Outcome::Failed {
                    reason: FailureReason::OutOfDomain,
                    last_estimate: mid,
                    iterations: i,
                    residual: fmid,
                }
            }
        };

        if fmid.is_zero() || config.tolerance.is_satisfied(fmid, mid) {
            return Outcome::Converged {
                value: mid,
                iterations: i + 1,
                residual: fmid,
            };
        }

        let collapsed = mid == a
            || mid == b
            || config
                .step_tolerance
                .is_some_and(|step_tol| (b - a).abs() < step_tol);
        if collapsed {
            return Outcome::Failed {
                reason: FailureReason::NoConvergence,
                last_estimate: mid,
                iterations: i + 1,
                residual: fmid,
            };
        }

        if fa.is_sign_negative() == fmid.is_sign_negative() {
            a = mid;
            fa = fmid;
        } else {
            b = mid;
        }
    }

    Outcome::Failed {
        reason: FailureReason::NoConvergence,
        last_estimate: mid,
        iterations: config.max_iterations,
        residual: fmid,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::solvers::Tolerance;

    #[test]
    fn test_bracket_on_grid() {
        let grid = [dec!(-1), dec!(0), dec!(1), dec!(2), dec!(3)];
        let bracket = find_bracket(|x| Some(x - dec!(1.5)), &grid);
        assert_eq!(bracket, Some((dec!(1), dec!(2))));
    }

    #[test]
    fn test_bracket_skips_unevaluable_points() {
        let grid = [dec!(-1), dec!(0), dec!(1), dec!(2)];
        let bracket = find_bracket(
            |x| if x < Decimal::ZERO { None } else { Some(x - dec!(0.5)) },
            &grid,
        );
        assert_eq!(bracket, Some((dec!(0), dec!(1))));
    }

    #[test]
    fn test_no_bracket() {
        let grid = [dec!(0), dec!(1), dec!(2)];
        assert!(find_bracket(|x| Some(x * x + dec!(1)), &grid).is_none());
    }

    #[test]
    fn test_bisection_converges() {
        let config = SolverConfig::new(Tolerance::Absolute(dec!(0.0000001)), None, 200);
        let outcome = bisection(|x| Some(x * x - dec!(2)), dec!(0), dec!(2), &config);
        let root = *outcome.value().unwrap();
        assert!((root - dec!(1.41421356)).abs() < dec!(0.000001), "got {root}");
    }

    #[test]
    fn test_bisection_same_sign_fails() {
        let config = SolverConfig::bisection();
        let outcome = bisection(|x| Some(x * x + dec!(1)), dec!(-1), dec!(1), &config);
        assert!(matches!(
            outcome,
            Outcome::Failed {
                reason: FailureReason::NoBracket,
                ..
            }
        ));
    }

    #[test]
    fn test_narrow_bracket_is_not_convergence() {
        // Steep function: a 1e-10 bracket still leaves |f| near 1e-2
        let config = SolverConfig::new(
            Tolerance::Absolute(dec!(0.000001)),
            Some(dec!(0.0000000001)),
            200,
        );
        let outcome = bisection(
            |x| Some(dec!(100000000) * (x - dec!(0.123456789123))),
            dec!(0),
            dec!(1),
            &config,
        );
        assert!(matches!(
            outcome,
            Outcome::Failed {
                reason: FailureReason::NoConvergence,
                ..
            }
        ));
    }

    #[test]
    fn test_bisection_meets_residual_on_steep_function() {
        let outcome = bisection(
            |x| Some(dec!(100000000) * (x - dec!(0.123456789123))),
            dec!(0),
            dec!(1),
            &SolverConfig::bisection(),
        );
        assert!(outcome.is_converged());
        assert!(outcome.residual().abs() < dec!(0.000001), "residual {}", outcome.residual());
    }

    #[test]
    fn test_bisection_hits_cap() {
        let config = SolverConfig::new(Tolerance::Absolute(dec!(0.0000000001)), None, 5);
        let outcome = bisection(|x| Some(x - dec!(0.3)), dec!(0), dec!(1), &config);
        assert!(!outcome.is_converged());
        assert_eq!(outcome.iterations(), 5);
    }
}
