//! Circular-reference resolution.
//!
//! Linked projections contain loops that cannot be evaluated in one pass:
//! interest expense depends on average debt, debt depends on the cash left
//! to sweep, cash depends on net income, and net income depends on interest
//! expense. This module resolves such loops generically, over a labelled
//! vector of quantities and a pure update map, and carries the specialised
//! interest/cash/debt solver used by the three-statement and debt paydown
//! models.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{debug, warn};

use crate::error::CorpFinanceError;
use crate::solvers::{fixed_point, newton_raphson, Outcome, SolverConfig, DIVERGENCE_BOUND};
use crate::types::{with_metadata, ComputationOutput, Money, Rate};
use crate::CorpFinanceResult;

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

/// A labelled vector of mutually dependent quantities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CircularState {
    labels: Vec<String>,
    values: Vec<Decimal>,
}

impl CircularState {
    pub fn new(labels: Vec<String>, values: Vec<Decimal>) -> CorpFinanceResult<Self> {
        if labels.len() != values.len() {
            return Err(CorpFinanceError::InvalidInput {
                field: "labels".into(),
                reason: format!(
                    "{} labels supplied for {} values",
                    labels.len(),
                    values.len()
                ),
            });
        }
        if values.is_empty() {
            return Err(CorpFinanceError::InvalidInput {
                field: "values".into(),
                reason: "Circular state needs at least one quantity".into(),
            });
        }
        Ok(CircularState { labels, values })
    }

    /// Unlabelled state; quantities are named `x0`, `x1`, ...
    pub fn from_values(values: Vec<Decimal>) -> Self {
        let labels = (0..values.len()).map(|i| format!("x{i}")).collect();
        CircularState { labels, values }
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn values(&self) -> &[Decimal] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, label: &str) -> Option<Decimal> {
        self.labels
            .iter()
            .position(|l| l == label)
            .map(|i| self.values[i])
    }

    fn with_values(&self, values: Vec<Decimal>) -> Self {
        CircularState {
            labels: self.labels.clone(),
            values,
        }
    }
}

/// Caps and tolerances for the two phases of a circular solve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircularConfig {
    pub newton: SolverConfig,
    pub fixed_point: SolverConfig,
}

impl Default for CircularConfig {
    fn default() -> Self {
        CircularConfig {
            newton: SolverConfig::newton(),
            fixed_point: SolverConfig::fixed_point(),
        }
    }
}

/// Which phase produced the final answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionMethod {
    NewtonRaphson,
    FixedPoint,
}

// ---------------------------------------------------------------------------
// Generic drivers
// ---------------------------------------------------------------------------

/// Fixed-point iteration over the whole state until the largest change
/// meets the tolerance. `update` must be a pure function of the state it is
/// given; it returns the next values in the same order.
pub fn solve_circular<F>(
    initial: CircularState,
    update: F,
    config: &SolverConfig,
) -> CorpFinanceResult<Outcome<CircularState>>
where
    F: Fn(&CircularState) -> CorpFinanceResult<Vec<Decimal>>,
{
    config.validate()?;

    let template = initial.clone();
    let outcome = fixed_point(
        initial.values,
        |values| update(&template.with_values(values.to_vec())),
        config,
    )?
    .map(|values| template.with_values(values));

    match &outcome {
        Outcome::Converged {
            iterations,
            residual,
            ..
        } => debug!(iterations, residual = %residual, "circular state converged"),
        Outcome::Failed {
            reason,
            iterations,
            residual,
            ..
        } => warn!(?reason, iterations, residual = %residual, "circular state did not converge"),
    }
    Ok(outcome)
}

/// Scalar circular problem `x = f(x)` accelerated with Newton-Raphson on
/// `g(x) = f(x) - x`, `g'(x) = f'(x) - 1`.
///
/// `update_derivative` returns `None` where `f'` is unavailable; that, any
/// error from `update` during the Newton phase, or divergence hands the
/// problem to plain fixed-point iteration from `initial`. Errors raised by
/// `update` during the fixed-point phase propagate.
pub fn solve_circular_newton<F, D>(
    initial: Decimal,
    update: F,
    update_derivative: D,
    config: &CircularConfig,
) -> CorpFinanceResult<Outcome<Decimal>>
where
    F: Fn(Decimal) -> CorpFinanceResult<Decimal>,
    D: Fn(Decimal) -> Option<Decimal>,
{
    newton_with_fallback(initial, &update, &update_derivative, config).map(|(outcome, _)| outcome)
}

fn newton_with_fallback<F, D>(
    initial: Decimal,
    update: &F,
    update_derivative: &D,
    config: &CircularConfig,
) -> CorpFinanceResult<(Outcome<Decimal>, ResolutionMethod)>
where
    F: Fn(Decimal) -> CorpFinanceResult<Decimal>,
    D: Fn(Decimal) -> Option<Decimal>,
{
    config.newton.validate()?;
    config.fixed_point.validate()?;

    let residual = |x: Decimal| update(x).ok().and_then(|fx| fx.checked_sub(x));
    let residual_derivative = |x: Decimal| update_derivative(x).map(|d| d - Decimal::ONE);

    let newton = newton_raphson(
        residual,
        residual_derivative,
        initial,
        Some((-DIVERGENCE_BOUND, DIVERGENCE_BOUND)),
        &config.newton,
    );

    let newton_iterations = match newton {
        Outcome::Converged {
            value,
            iterations,
            residual,
        } => {
            debug!(value = %value, iterations, residual = %residual, "circular reference converged (newton)");
            return Ok((newton, ResolutionMethod::NewtonRaphson));
        }
        Outcome::Failed {
            reason, iterations, ..
        } => {
            warn!(
                ?reason,
                iterations, "newton acceleration failed, falling back to fixed-point iteration"
            );
            iterations
        }
    };

    let outcome = fixed_point(
        vec![initial],
        |x| Ok(vec![update(x[0])?]),
        &config.fixed_point,
    )?
    .map(|v| v[0])
    .add_iterations(newton_iterations);

    if !outcome.is_converged() {
        warn!(
            iterations = outcome.iterations(),
            "circular reference did not converge"
        );
    }
    Ok((outcome, ResolutionMethod::FixedPoint))
}

// ---------------------------------------------------------------------------
// Interest <-> cash <-> debt
// ---------------------------------------------------------------------------

fn default_true() -> bool {
    true
}

/// One period of the interest / cash / debt loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CashInterestInput {
    /// Cash at the start of the period
    pub beginning_cash: Money,
    /// Debt at the start of the period
    pub beginning_debt: Money,
    /// Contractual repayment due this period (capped at beginning debt)
    #[serde(default)]
    pub scheduled_repayment: Money,
    /// Interest rate on average debt
    pub interest_rate: Rate,
    /// Tax rate, applied to positive pre-tax income only
    pub tax_rate: Rate,
    /// Operating profit before interest
    pub ebit: Money,
    /// Non-cash charges added back (D&A)
    #[serde(default)]
    pub non_cash_charges: Money,
    /// Other pre-financing cash flows, signed (negative for capex or a working capital build)
    #[serde(default)]
    pub other_cash_flows: Money,
    /// Share of positive net income paid out
    #[serde(default)]
    pub dividend_payout_ratio: Rate,
    /// Floor for ending cash; shortfalls are drawn as new debt
    #[serde(default)]
    pub min_cash_balance: Money,
    /// Sweep cash above the floor into debt paydown
    #[serde(default = "default_true")]
    pub cash_sweep: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub solver: Option<CircularConfig>,
}

/// Every quantity of the loop, mutually consistent once resolved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CashInterestResolution {
    pub interest_expense: Money,
    pub ebt: Money,
    pub taxes: Money,
    pub net_income: Money,
    pub dividends: Money,
    pub scheduled_repayment: Money,
    /// Cash before any revolver draw or sweep
    pub preliminary_cash: Money,
    pub debt_draw: Money,
    pub debt_paydown: Money,
    /// `debt_draw - debt_paydown`
    pub debt_draw_or_paydown: Money,
    pub ending_cash: Money,
    pub ending_debt: Money,
}

impl CashInterestResolution {
    /// The state vector tracked by the fixed-point fallback.
    pub fn to_state(&self) -> CircularState {
        CircularState {
            labels: STATE_LABELS.iter().map(|s| s.to_string()).collect(),
            values: vec![
                self.interest_expense,
                self.net_income,
                self.ending_cash,
                self.ending_debt,
                self.debt_draw_or_paydown,
            ],
        }
    }
}

const STATE_LABELS: [&str; 5] = [
    "interest_expense",
    "net_income",
    "ending_cash",
    "ending_debt",
    "debt_draw_or_paydown",
];

/// Output of [`resolve_cash_interest`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CashInterestOutput {
    pub resolution: CashInterestResolution,
    pub method: ResolutionMethod,
    pub iterations: u32,
    /// |implied interest - interest used| at the answer
    pub residual: Decimal,
}

fn validate_cash_interest(input: &CashInterestInput) -> CorpFinanceResult<()> {
    for (field, value) in [
        ("interest_rate", input.interest_rate),
        ("tax_rate", input.tax_rate),
        ("dividend_payout_ratio", input.dividend_payout_ratio),
    ] {
        if value < Decimal::ZERO || value > Decimal::ONE {
            return Err(CorpFinanceError::InvalidInput {
                field: field.into(),
                reason: format!("Rate must be between 0 and 1, got {value}"),
            });
        }
    }
    for (field, value) in [
        ("beginning_cash", input.beginning_cash),
        ("beginning_debt", input.beginning_debt),
        ("scheduled_repayment", input.scheduled_repayment),
        ("min_cash_balance", input.min_cash_balance),
    ] {
        if value < Decimal::ZERO {
            return Err(CorpFinanceError::InvalidInput {
                field: field.into(),
                reason: format!("Value must be non-negative, got {value}"),
            });
        }
    }
    Ok(())
}

/// Evaluate the loop once for a given interest expense.
fn evaluate_given_interest(input: &CashInterestInput, interest: Money) -> CashInterestResolution {
    let ebt = input.ebit - interest;
    let taxes = if ebt > Decimal::ZERO {
        ebt * input.tax_rate
    } else {
        Decimal::ZERO
    };
    let net_income = ebt - taxes;
    let dividends = if net_income > Decimal::ZERO {
        net_income * input.dividend_payout_ratio
    } else {
        Decimal::ZERO
    };

    let scheduled = input.scheduled_repayment.min(input.beginning_debt);
    let remaining_debt = input.beginning_debt - scheduled;
    let preliminary_cash = input.beginning_cash + net_income + input.non_cash_charges
        + input.other_cash_flows
        - scheduled
        - dividends;

    let (debt_draw, debt_paydown, ending_cash) = if preliminary_cash < input.min_cash_balance {
        (
            input.min_cash_balance - preliminary_cash,
            Decimal::ZERO,
            input.min_cash_balance,
        )
    } else if input.cash_sweep {
        let excess = preliminary_cash - input.min_cash_balance;
        let paydown = excess.min(remaining_debt);
        (Decimal::ZERO, paydown, preliminary_cash - paydown)
    } else {
        (Decimal::ZERO, Decimal::ZERO, preliminary_cash)
    };

    CashInterestResolution {
        interest_expense: interest,
        ebt,
        taxes,
        net_income,
        dividends,
        scheduled_repayment: scheduled,
        preliminary_cash,
        debt_draw,
        debt_paydown,
        debt_draw_or_paydown: debt_draw - debt_paydown,
        ending_cash,
        ending_debt: remaining_debt - debt_paydown + debt_draw,
    }
}

fn implied_interest(input: &CashInterestInput, resolution: &CashInterestResolution) -> Money {
    (input.beginning_debt + resolution.ending_debt) / dec!(2) * input.interest_rate
}

/// d(implied interest)/d(interest used). Piecewise constant: each branch of
/// the tax, dividend and draw/sweep logic contributes a fixed slope.
fn implied_interest_slope(input: &CashInterestInput, interest: Money) -> Decimal {
    let r = evaluate_given_interest(input, interest);

    let d_net_income = if r.ebt > Decimal::ZERO {
        -(Decimal::ONE - input.tax_rate)
    } else {
        -Decimal::ONE
    };
    let d_dividends = if r.net_income > Decimal::ZERO {
        d_net_income * input.dividend_payout_ratio
    } else {
        Decimal::ZERO
    };
    let d_preliminary = d_net_income - d_dividends;

    let remaining_debt = input.beginning_debt - r.scheduled_repayment;
    let d_ending_debt = if r.preliminary_cash < input.min_cash_balance {
        -d_preliminary
    } else if input.cash_sweep && r.debt_paydown < remaining_debt {
        -d_preliminary
    } else {
        Decimal::ZERO
    };

    input.interest_rate / dec!(2) * d_ending_debt
}

/// Resolve one period of the interest / cash / debt loop.
///
/// The unknown is interest expense, starting from interest on beginning
/// debt. Newton-Raphson runs on the scalar residual with the analytic slope;
/// if it fails, fixed-point iteration runs over the five-quantity state
/// {interest_expense, net_income, ending_cash, ending_debt, debt_draw_or_paydown}.
pub fn solve_cash_interest_circular(
    input: &CashInterestInput,
    config: &CircularConfig,
) -> CorpFinanceResult<(Outcome<CashInterestResolution>, ResolutionMethod)> {
    validate_cash_interest(input)?;

    let initial_interest = input.beginning_debt * input.interest_rate;

    let update = |interest: Money| -> CorpFinanceResult<Money> {
        Ok(implied_interest(input, &evaluate_given_interest(input, interest)))
    };
    let slope = |interest: Money| Some(implied_interest_slope(input, interest));

    let newton = newton_raphson(
        |x| update(x).ok().map(|fx| fx - x),
        |x| slope(x).map(|d| d - Decimal::ONE),
        initial_interest,
        Some((-DIVERGENCE_BOUND, DIVERGENCE_BOUND)),
        &config.newton,
    );

    if let Outcome::Converged {
        value, iterations, ..
    } = newton
    {
        let resolution = evaluate_given_interest(input, value);
        let residual = (implied_interest(input, &resolution) - value).abs();
        debug!(interest = %value, iterations, "cash/interest loop converged (newton)");
        return Ok((
            Outcome::Converged {
                value: resolution,
                iterations,
                residual,
            },
            ResolutionMethod::NewtonRaphson,
        ));
    }
    let newton_iterations = newton.iterations();
    warn!(
        iterations = newton_iterations,
        "cash/interest newton failed, falling back to fixed-point iteration"
    );

    let initial_state = evaluate_given_interest(input, initial_interest).to_state();
    let outcome = solve_circular(
        initial_state,
        |state| {
            let resolution = evaluate_given_interest(input, state.values()[0]);
            let next_interest = implied_interest(input, &resolution);
            Ok(vec![
                next_interest,
                resolution.net_income,
                resolution.ending_cash,
                resolution.ending_debt,
                resolution.debt_draw_or_paydown,
            ])
        },
        &config.fixed_point,
    )?
    .map(|state| evaluate_given_interest(input, state.values()[0]))
    .add_iterations(newton_iterations);

    Ok((outcome, ResolutionMethod::FixedPoint))
}

/// Entry point: resolve one period and wrap it in the standard envelope.
/// A loop that does not converge is an error, never a partial answer.
pub fn resolve_cash_interest(
    input: &CashInterestInput,
) -> CorpFinanceResult<ComputationOutput<CashInterestOutput>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();
    let config = input.solver.unwrap_or_default();

    let (outcome, method) = solve_cash_interest_circular(input, &config)?;

    let output = match outcome {
        Outcome::Converged {
            value,
            iterations,
            residual,
        } => CashInterestOutput {
            resolution: value,
            method,
            iterations,
            residual,
        },
        Outcome::Failed {
            last_estimate,
            iterations,
            residual,
            ..
        } => {
            return Err(CorpFinanceError::ConvergenceFailure {
                function: "cash/interest circular reference".into(),
                iterations,
                last_estimate: last_estimate.interest_expense,
                last_delta: residual,
            })
        }
    };

    if output.resolution.debt_draw > Decimal::ZERO {
        warnings.push(format!(
            "Cash shortfall funded by {} of new debt",
            output.resolution.debt_draw
        ));
    }
    if output.resolution.ebt < Decimal::ZERO {
        warnings.push("Pre-tax income is negative; no tax charged".into());
    }

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Circular interest / cash / debt resolution (Newton-Raphson with fixed-point fallback)",
        input,
        warnings,
        elapsed,
        output,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::solvers::{FailureReason, Tolerance};

    fn base_input() -> CashInterestInput {
        CashInterestInput {
            beginning_cash: dec!(100),
            beginning_debt: dec!(500),
            scheduled_repayment: dec!(25),
            interest_rate: dec!(0.10),
            tax_rate: dec!(0.25),
            ebit: dec!(200),
            non_cash_charges: dec!(30),
            other_cash_flows: dec!(-60),
            dividend_payout_ratio: Decimal::ZERO,
            min_cash_balance: dec!(50),
            cash_sweep: true,
            solver: None,
        }
    }

    fn assert_consistent(input: &CashInterestInput, r: &CashInterestResolution) {
        let implied = implied_interest(input, r);
        assert!(
            (implied - r.interest_expense).abs() < dec!(0.01),
            "interest {} inconsistent with implied {}",
            r.interest_expense,
            implied
        );
    }

    #[test]
    fn test_state_lookup_by_label() {
        let state = CircularState::new(
            vec!["cash".into(), "debt".into()],
            vec![dec!(10), dec!(20)],
        )
        .unwrap();
        assert_eq!(state.get("debt"), Some(dec!(20)));
        assert_eq!(state.get("equity"), None);
        assert!(CircularState::new(vec!["a".into()], vec![]).is_err());
    }

    #[test]
    fn test_solve_circular_linear_fixed_point() {
        // x = 0.5x + 10 -> 20, from several starting points
        for start in [dec!(-1000), dec!(0), dec!(20), dec!(5000)] {
            let outcome = solve_circular(
                CircularState::from_values(vec![start]),
                |s| Ok(vec![dec!(0.5) * s.values()[0] + dec!(10)]),
                &SolverConfig::fixed_point(),
            )
            .unwrap();
            let x = outcome.value().unwrap().values()[0];
            assert!((x - dec!(20)).abs() < dec!(0.02), "start {start} gave {x}");
        }
    }

    #[test]
    fn test_solve_circular_non_contracting_fails() {
        let outcome = solve_circular(
            CircularState::from_values(vec![dec!(1)]),
            |s| Ok(vec![dec!(2) * s.values()[0] + dec!(1)]),
            &SolverConfig::fixed_point(),
        )
        .unwrap();
        assert!(!outcome.is_converged());
    }

    #[test]
    fn test_solve_circular_is_deterministic() {
        let run = || {
            solve_circular(
                CircularState::from_values(vec![dec!(3), dec!(7)]),
                |s| {
                    let v = s.values();
                    Ok(vec![v[1] * dec!(0.3) + dec!(1), v[0] * dec!(0.6) + dec!(2)])
                },
                &SolverConfig::fixed_point(),
            )
            .unwrap()
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn test_newton_scalar_converges_fast() {
        // x = 0.5x + 10, f' = 0.5
        let outcome = solve_circular_newton(
            dec!(0),
            |x| Ok(dec!(0.5) * x + dec!(10)),
            |_| Some(dec!(0.5)),
            &CircularConfig::default(),
        )
        .unwrap();
        assert_eq!(outcome.value(), Some(&dec!(20)));
        assert!(outcome.iterations() <= 2);
    }

    #[test]
    fn test_newton_without_derivative_uses_fixed_point() {
        let outcome = solve_circular_newton(
            dec!(0),
            |x| Ok(dec!(0.5) * x + dec!(10)),
            |_| None,
            &CircularConfig::default(),
        )
        .unwrap();
        let x = *outcome.value().unwrap();
        assert!((x - dec!(20)).abs() < dec!(0.02), "got {x}");
        assert!(outcome.iterations() > 2);
    }

    #[test]
    fn test_newton_fallback_respects_cap() {
        // No fixed point: x = x + 1
        let config = CircularConfig {
            newton: SolverConfig::newton(),
            fixed_point: SolverConfig::fixed_point().with_max_iterations(20),
        };
        let outcome = solve_circular_newton(dec!(0), |x| Ok(x + dec!(1)), |_| Some(Decimal::ONE), &config)
            .unwrap();
        match outcome {
            Outcome::Failed { reason, .. } => assert_eq!(reason, FailureReason::NoConvergence),
            Outcome::Converged { .. } => panic!("x = x + 1 has no fixed point"),
        }
    }

    #[test]
    fn test_cash_interest_sweep_case() {
        let input = base_input();
        let (outcome, method) =
            solve_cash_interest_circular(&input, &CircularConfig::default()).unwrap();
        assert_eq!(method, ResolutionMethod::NewtonRaphson);
        let r = outcome.value().unwrap();
        assert_consistent(&input, r);
        assert_eq!(r.ending_cash, dec!(50));
        assert!(r.debt_paydown > Decimal::ZERO);
        assert!(r.ending_debt < dec!(475));
    }

    #[test]
    fn test_cash_interest_draw_case() {
        let mut input = base_input();
        input.ebit = dec!(20);
        input.other_cash_flows = dec!(-300);
        let (outcome, _) = solve_cash_interest_circular(&input, &CircularConfig::default()).unwrap();
        let r = outcome.value().unwrap();
        assert_consistent(&input, r);
        assert!(r.debt_draw > Decimal::ZERO);
        assert_eq!(r.ending_cash, input.min_cash_balance);
        assert_eq!(r.taxes, Decimal::ZERO);
    }

    #[test]
    fn test_cash_interest_without_sweep_keeps_cash() {
        let mut input = base_input();
        input.cash_sweep = false;
        let (outcome, _) = solve_cash_interest_circular(&input, &CircularConfig::default()).unwrap();
        let r = outcome.value().unwrap();
        // Debt only falls by the scheduled 25, so interest is on (500 + 475) / 2
        assert_eq!(r.interest_expense, dec!(48.75));
        assert_eq!(r.debt_paydown, Decimal::ZERO);
        assert_eq!(r.ending_debt, dec!(475));
    }

    #[test]
    fn test_cash_interest_fixed_point_matches_newton() {
        let input = base_input();
        let newton = solve_cash_interest_circular(&input, &CircularConfig::default())
            .unwrap()
            .0;
        // A one-step Newton budget cannot confirm convergence
        let config = CircularConfig {
            newton: SolverConfig::newton().with_max_iterations(1),
            fixed_point: SolverConfig::fixed_point()
                .with_tolerance(Tolerance::Absolute(dec!(0.000001))),
        };
        let (fp, method) = solve_cash_interest_circular(&input, &config).unwrap();
        assert_eq!(method, ResolutionMethod::FixedPoint);
        let a = newton.value().unwrap().interest_expense;
        let b = fp.value().unwrap().interest_expense;
        assert!((a - b).abs() < dec!(0.01), "newton {a} vs fixed point {b}");
    }

    #[test]
    fn test_resolve_cash_interest_envelope() {
        let out = resolve_cash_interest(&base_input()).unwrap();
        assert!(out.result.residual < dec!(0.01));
        assert!(out.methodology.contains("Newton"));
    }

    #[test]
    fn test_cash_interest_rejects_bad_rate() {
        let mut input = base_input();
        input.tax_rate = dec!(1.5);
        assert!(resolve_cash_interest(&input).is_err());
    }
}
