//! Iterative solvers shared by the time-value engine and the circular solver.
//!
//! - [`newton_raphson`]: quadratic convergence when an analytic derivative exists
//! - [`bisection`] / [`find_bracket`]: slow but guaranteed once a sign change is bracketed
//! - [`fixed_point`]: repeated application of an update map over a state vector
//!
//! None of them loop unbounded and none of them return a bare number: every run
//! ends in an [`Outcome`], so a partial iterate can never be mistaken for an
//! answer. Tolerances and caps arrive through an explicit [`SolverConfig`].

mod bisection;
mod fixed_point;
mod newton;

pub use bisection::{bisection, find_bracket};
pub use fixed_point::fixed_point;
pub use newton::newton_raphson;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::error::CorpFinanceError;
use crate::types::Rate;
use crate::CorpFinanceResult;

/// Components beyond this magnitude are treated as divergence.
pub(crate) const DIVERGENCE_BOUND: Decimal = dec!(100000000000000000000);

/// Convergence test applied to a residual or to a per-quantity change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Tolerance {
    /// |delta| < value
    Absolute(Decimal),
    /// |delta| <= value * |reference|
    Relative(Decimal),
}

impl Tolerance {
    pub fn is_satisfied(&self, delta: Decimal, reference: Decimal) -> bool {
        match *self {
            Tolerance::Absolute(tol) => delta.abs() < tol,
            Tolerance::Relative(tol) => {
                delta.is_zero() || delta.abs() <= tol * reference.abs()
            }
        }
    }
}

/// Tolerances and iteration cap for one solver run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SolverConfig {
    /// Test on the residual (NPV value, or the change in state for fixed-point runs)
    pub tolerance: Tolerance,
    /// Test on the change in the unknown between two iterates; `None` disables it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_tolerance: Option<Decimal>,
    pub max_iterations: u32,
}

impl SolverConfig {
    pub fn new(tolerance: Tolerance, step_tolerance: Option<Decimal>, max_iterations: u32) -> Self {
        SolverConfig {
            tolerance,
            step_tolerance,
            max_iterations,
        }
    }

    /// NPV within 1e-6, or a rate step under 1e-8; 100 iterations.
    pub fn irr() -> Self {
        Self::new(Tolerance::Absolute(dec!(0.000001)), Some(dec!(0.00000001)), 100)
    }

    /// Bracket fallback for IRR/XIRR: residual within 1e-6; 200 halvings.
    pub fn bisection() -> Self {
        Self::new(Tolerance::Absolute(dec!(0.000001)), None, 200)
    }

    /// 0.01 currency units across the whole state; 200 iterations.
    pub fn fixed_point() -> Self {
        Self::new(Tolerance::Absolute(dec!(0.01)), None, 200)
    }

    /// Scalar acceleration of a circular problem; 50 iterations.
    pub fn newton() -> Self {
        Self::new(Tolerance::Absolute(dec!(0.01)), Some(dec!(0.00000001)), 50)
    }

    #[must_use]
    pub fn with_tolerance(mut self, tolerance: Tolerance) -> Self {
        self.tolerance = tolerance;
        self
    }

    #[must_use]
    pub fn with_step_tolerance(mut self, step_tolerance: Option<Decimal>) -> Self {
        self.step_tolerance = step_tolerance;
        self
    }

    #[must_use]
    pub fn with_max_iterations(mut self, max_iterations: u32) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn validate(&self) -> CorpFinanceResult<()> {
        let tol = match self.tolerance {
            Tolerance::Absolute(t) | Tolerance::Relative(t) => t,
        };
        if tol <= Decimal::ZERO {
            return Err(CorpFinanceError::invalid(
                "tolerance",
                "Tolerance must be positive",
            ));
        }
        if matches!(self.step_tolerance, Some(s) if s <= Decimal::ZERO) {
            return Err(CorpFinanceError::invalid(
                "step_tolerance",
                "Step tolerance must be positive",
            ));
        }
        if self.max_iterations == 0 {
            return Err(CorpFinanceError::invalid(
                "max_iterations",
                "Iteration cap must be at least 1",
            ));
        }
        Ok(())
    }
}

/// Why a run stopped without meeting its tolerance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureReason {
    /// Iteration cap reached
    NoConvergence,
    /// Newton derivative was exactly zero
    ZeroDerivative,
    /// Iterate left the admissible domain or could not be evaluated
    OutOfDomain,
    /// No sign change found for the bracketing fallback
    NoBracket,
}

impl FailureReason {
    /// Every failure reason maps to the single caller-visible code.
    pub fn code(&self) -> &'static str {
        "NoConvergence"
    }
}

/// Tagged result of an iterative run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome<T> {
    Converged {
        value: T,
        iterations: u32,
        residual: Decimal,
    },
    Failed {
        reason: FailureReason,
        last_estimate: T,
        iterations: u32,
        residual: Decimal,
    },
}

/// Outcome of an IRR / XIRR search.
pub type RootfindingResult = Outcome<Rate>;

impl<T> Outcome<T> {
    pub fn is_converged(&self) -> bool {
        matches!(self, Outcome::Converged { .. })
    }

    /// The solution, only when the run converged.
    pub fn value(&self) -> Option<&T> {
        match self {
            Outcome::Converged { value, .. } => Some(value),
            Outcome::Failed { .. } => None,
        }
    }

    pub fn iterations(&self) -> u32 {
        match self {
            Outcome::Converged { iterations, .. } | Outcome::Failed { iterations, .. } => {
                *iterations
            }
        }
    }

    pub fn residual(&self) -> Decimal {
        match self {
            Outcome::Converged { residual, .. } | Outcome::Failed { residual, .. } => *residual,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Outcome<U> {
        match self {
            Outcome::Converged {
                value,
                iterations,
                residual,
            } => Outcome::Converged {
                value: f(value),
                iterations,
                residual,
            },
            Outcome::Failed {
                reason,
                last_estimate,
                iterations,
                residual,
            } => Outcome::Failed {
                reason,
                last_estimate: f(last_estimate),
                iterations,
                residual,
            },
        }
    }

    /// Adds iterations spent by an earlier, abandoned attempt.
    pub(crate) fn add_iterations(mut self, extra: u32) -> Self {
        match &mut self {
            Outcome::Converged { iterations, .. } | Outcome::Failed { iterations, .. } => {
                *iterations += extra;
            }
        }
        self
    }
}

impl Outcome<Decimal> {
    /// Collapse into a plain result; `Failed` becomes a convergence error.
    pub fn into_result(self, function: &str) -> CorpFinanceResult<Decimal> {
        match self {
            Outcome::Converged { value, .. } => Ok(value),
            Outcome::Failed {
                last_estimate,
                iterations,
                residual,
                ..
            } => Err(CorpFinanceError::ConvergenceFailure {
                function: function.to_string(),
                iterations,
                last_estimate,
                last_delta: residual,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relative_tolerance() {
        let tol = Tolerance::Relative(dec!(0.000001));
        assert!(tol.is_satisfied(dec!(0.5), dec!(1000000)));
        assert!(!tol.is_satisfied(dec!(2), dec!(1000000)));
        assert!(tol.is_satisfied(Decimal::ZERO, Decimal::ZERO));
        assert!(!tol.is_satisfied(dec!(0.0001), Decimal::ZERO));
    }

    #[test]
    fn test_config_validation() {
        assert!(SolverConfig::irr().validate().is_ok());
        assert!(SolverConfig::fixed_point()
            .with_max_iterations(0)
            .validate()
            .is_err());
        assert!(SolverConfig::newton()
            .with_tolerance(Tolerance::Absolute(Decimal::ZERO))
            .validate()
            .is_err());
    }

    #[test]
    fn test_failed_outcome_into_error() {
        let outcome: Outcome<Decimal> = Outcome::Failed {
            reason: FailureReason::NoConvergence,
            last_estimate: dec!(0.3),
            iterations: 100,
            residual: dec!(4.2),
        };
        assert!(outcome.value().is_none());
        let err = outcome.into_result("IRR").unwrap_err();
        assert_eq!(err.reason_code(), "NoConvergence");
    }

    #[test]
    fn test_outcome_serializes_with_status_tag() {
        let outcome: Outcome<Decimal> = Outcome::Converged {
            value: dec!(0.1),
            iterations: 3,
            residual: Decimal::ZERO,
        };
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["status"], "converged");
        assert_eq!(json["iterations"], 3);
    }
}
