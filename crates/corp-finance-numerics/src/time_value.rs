use chrono::NaiveDate;
use rust_decimal::Decimal;
use rust_decimal::MathematicalOps;
use rust_decimal_macros::dec;
use tracing::{debug, warn};

use crate::error::CorpFinanceError;
use crate::solvers::{
    bisection, find_bracket, newton_raphson, FailureReason, Outcome, RootfindingResult,
    SolverConfig,
};
use crate::types::{has_sign_change, CashFlow, Money, Multiple, Rate, Years};
use crate::CorpFinanceResult;

/// Actual/365 Fixed
const DAYS_IN_YEAR: Decimal = dec!(365);

/// Upper edge of the Newton domain; the lower edge is -100% (exclusive).
const MAX_RATE: Rate = dec!(10);

/// Rates probed, in order, when Newton has to hand over to bisection.
const BRACKET_GRID: [Rate; 20] = [
    dec!(-0.99),
    dec!(-0.9),
    dec!(-0.75),
    dec!(-0.5),
    dec!(-0.25),
    dec!(-0.1),
    dec!(0),
    dec!(0.05),
    dec!(0.1),
    dec!(0.2),
    dec!(0.35),
    dec!(0.5),
    dec!(0.75),
    dec!(1),
    dec!(1.5),
    dec!(2),
    dec!(3),
    dec!(5),
    dec!(7.5),
    dec!(10),
];

// ---------------------------------------------------------------------------
// Discounting kernels
// ---------------------------------------------------------------------------

/// `(Σ cf/(1+r)^t, Σ -t·cf/(1+r)^(t+1))` over integer periods.
///
/// The factor `(1+r)^-t` is built by repeated division, so distant flows at
/// high rates fade to zero instead of overflowing. `None` only when a sum
/// itself leaves the decimal range (rates close to -100% on long series).
fn periodic_sums(rate: Rate, cash_flows: &[Money]) -> Option<(Decimal, Decimal)> {
    let one_plus_r = Decimal::ONE + rate;
    if one_plus_r <= Decimal::ZERO {
        return None;
    }

    let mut value = Decimal::ZERO;
    let mut derivative = Decimal::ZERO;
    let mut factor = Decimal::ONE;

    for (t, cf) in cash_flows.iter().enumerate() {
        if t > 0 {
            factor = factor.checked_div(one_plus_r)?;
        }
        let present = cf.checked_mul(factor)?;
        value = value.checked_add(present)?;
        if t > 0 {
            let term = Decimal::from(t as i64)
                .checked_mul(present)?
                .checked_div(one_plus_r)?;
            derivative = derivative.checked_sub(term)?;
        }
    }

    Some((value, derivative))
}

/// Same sums with real-valued exponents (year fractions).
fn dated_sums(rate: Rate, terms: &[(Years, Money)]) -> Option<(Decimal, Decimal)> {
    let one_plus_r = Decimal::ONE + rate;
    if one_plus_r <= Decimal::ZERO {
        return None;
    }

    let mut value = Decimal::ZERO;
    let mut derivative = Decimal::ZERO;

    for (tau, cf) in terms {
        let growth = match one_plus_r.checked_powd(*tau) {
            Some(g) => g,
            // Growth past the decimal range discounts the flow to nothing
            None if one_plus_r > Decimal::ONE && tau.is_sign_positive() => continue,
            None => return None,
        };
        let present = cf.checked_div(growth)?;
        value = value.checked_add(present)?;
        if !tau.is_zero() {
            let term = tau.checked_mul(present)?.checked_div(one_plus_r)?;
            derivative = derivative.checked_sub(term)?;
        }
    }

    Some((value, derivative))
}

// ---------------------------------------------------------------------------
// NPV
// ---------------------------------------------------------------------------

fn validate_rate(rate: Rate) -> CorpFinanceResult<()> {
    if rate <= dec!(-1) {
        return Err(CorpFinanceError::InvalidInput {
            field: "rate".into(),
            reason: "Discount rate must be greater than -100%".into(),
        });
    }
    Ok(())
}

fn out_of_range(function: &str) -> CorpFinanceError {
    CorpFinanceError::InvalidInput {
        field: "rate".into(),
        reason: format!("{function} is outside the decimal range at this rate"),
    }
}

/// Net Present Value of a series of cash flows, `cash_flows[0]` undiscounted.
pub fn npv(rate: Rate, cash_flows: &[Money]) -> CorpFinanceResult<Money> {
    if cash_flows.is_empty() {
        return Err(CorpFinanceError::InvalidInput {
            field: "cash_flows".into(),
            reason: "NPV requires at least one cash flow".into(),
        });
    }
    validate_rate(rate)?;

    periodic_sums(rate, cash_flows)
        .map(|(value, _)| value)
        .ok_or_else(|| out_of_range("NPV"))
}

/// dNPV/dr, the analytic derivative used by the IRR search.
pub fn npv_derivative(rate: Rate, cash_flows: &[Money]) -> CorpFinanceResult<Decimal> {
    if cash_flows.is_empty() {
        return Err(CorpFinanceError::InvalidInput {
            field: "cash_flows".into(),
            reason: "NPV requires at least one cash flow".into(),
        });
    }
    validate_rate(rate)?;

    periodic_sums(rate, cash_flows)
        .map(|(_, derivative)| derivative)
        .ok_or_else(|| out_of_range("NPV"))
}

/// NPV of dated cash flows discounted from the earliest date.
pub fn xnpv(rate: Rate, dated_flows: &[CashFlow]) -> CorpFinanceResult<Money> {
    if dated_flows.is_empty() {
        return Err(CorpFinanceError::InvalidInput {
            field: "cash_flows".into(),
            reason: "XNPV requires at least one cash flow".into(),
        });
    }
    validate_rate(rate)?;

    let (terms, _) = year_fraction_terms(dated_flows);
    dated_sums(rate, &terms)
        .map(|(value, _)| value)
        .ok_or_else(|| out_of_range("XNPV"))
}

/// Actual/365 year fraction between two dates (negative if `end < start`).
pub fn year_fraction(start: NaiveDate, end: NaiveDate) -> Years {
    Decimal::from((end - start).num_days()) / DAYS_IN_YEAR
}

/// Sort by date (stable) and convert to `(years since earliest, amount)`.
/// The flag reports whether the input order had to change.
fn year_fraction_terms(dated_flows: &[CashFlow]) -> (Vec<(Years, Money)>, bool) {
    let mut sorted: Vec<&CashFlow> = dated_flows.iter().collect();
    let was_sorted = sorted.windows(2).all(|w| w[0].date <= w[1].date);
    sorted.sort_by_key(|cf| cf.date);

    let base = sorted[0].date;
    let terms = sorted
        .iter()
        .map(|cf| (year_fraction(base, cf.date), cf.amount))
        .collect();
    (terms, !was_sorted)
}

// ---------------------------------------------------------------------------
// IRR / XIRR
// ---------------------------------------------------------------------------

/// Newton-Raphson inside (-100%, MAX_RATE], bisection over BRACKET_GRID when
/// Newton fails. Reported iterations cover both phases.
fn find_rate_root<F, DF>(
    function: &str,
    value: F,
    derivative: DF,
    guess: Rate,
    config: &SolverConfig,
) -> RootfindingResult
where
    F: Fn(Rate) -> Option<Decimal>,
    DF: Fn(Rate) -> Option<Decimal>,
{
    let newton = newton_raphson(&value, &derivative, guess, Some((dec!(-1), MAX_RATE)), config);

    let (reason, newton_estimate, newton_iterations) = match newton {
        Outcome::Converged {
            value: rate,
            iterations,
            residual,
        } => {
            debug!(function, rate = %rate, iterations, residual = %residual, "converged (newton)");
            return Outcome::Converged {
                value: rate,
                iterations,
                residual,
            };
        }
        Outcome::Failed {
            reason,
            last_estimate,
            iterations,
            ..
        } => (reason, last_estimate, iterations),
    };

    warn!(
        function,
        ?reason,
        last_estimate = %newton_estimate,
        iterations = newton_iterations,
        "newton failed, falling back to bisection"
    );

    let outcome = match find_bracket(&value, &BRACKET_GRID) {
        Some((lower, upper)) if lower == upper => Outcome::Converged {
            value: lower,
            iterations: 0,
            residual: Decimal::ZERO,
        },
        Some((lower, upper)) => {
            let bisection_config = SolverConfig::bisection().with_tolerance(config.tolerance);
            bisection(&value, lower, upper, &bisection_config)
        }
        None => Outcome::Failed {
            reason: FailureReason::NoBracket,
            last_estimate: newton_estimate,
            iterations: 0,
            residual: value(newton_estimate).unwrap_or(Decimal::MAX),
        },
    }
    .add_iterations(newton_iterations);

    match &outcome {
        Outcome::Converged {
            value: rate,
            iterations,
            ..
        } => debug!(function, rate = %rate, iterations, "converged (bisection)"),
        Outcome::Failed {
            reason, iterations, ..
        } => warn!(function, ?reason, iterations, "root search failed"),
    }
    outcome
}

fn validate_guess(guess: Rate) -> CorpFinanceResult<()> {
    if guess <= dec!(-1) {
        return Err(CorpFinanceError::InvalidInput {
            field: "initial_guess".into(),
            reason: "Initial guess must be greater than -100%".into(),
        });
    }
    Ok(())
}

/// Internal Rate of Return: the rate where NPV is zero.
///
/// Input problems (empty series, no sign change, bad guess) are errors and no
/// iteration is attempted. A search that runs out of iterations or brackets
/// comes back as `Ok(Outcome::Failed { .. })`.
pub fn solve_irr(
    cash_flows: &[Money],
    guess: Rate,
    config: &SolverConfig,
) -> CorpFinanceResult<RootfindingResult> {
    if cash_flows.len() < 2 {
        return Err(CorpFinanceError::InvalidInput {
            field: "cash_flows".into(),
            reason: "IRR requires at least 2 cash flows".into(),
        });
    }
    if !has_sign_change(cash_flows.iter().copied()) {
        return Err(CorpFinanceError::NoSignChange {
            function: "IRR".into(),
        });
    }
    validate_guess(guess)?;
    config.validate()?;

    Ok(find_rate_root(
        "IRR",
        |r| periodic_sums(r, cash_flows).map(|(v, _)| v),
        |r| periodic_sums(r, cash_flows).map(|(_, d)| d),
        guess,
        config,
    ))
}

/// IRR with the default policy; non-convergence becomes an error.
pub fn irr(cash_flows: &[Money], guess: Rate) -> CorpFinanceResult<Rate> {
    solve_irr(cash_flows, guess, &SolverConfig::irr())?.into_result("IRR")
}

/// Extended IRR for irregular dates. Flows are sorted by date; exponents are
/// Actual/365 year fractions from the earliest date.
pub fn solve_xirr(
    dated_flows: &[CashFlow],
    guess: Rate,
    config: &SolverConfig,
) -> CorpFinanceResult<RootfindingResult> {
    if dated_flows.len() < 2 {
        return Err(CorpFinanceError::InvalidInput {
            field: "cash_flows".into(),
            reason: "XIRR requires at least 2 cash flows".into(),
        });
    }
    if !has_sign_change(dated_flows.iter().map(|cf| cf.amount)) {
        return Err(CorpFinanceError::NoSignChange {
            function: "XIRR".into(),
        });
    }
    validate_guess(guess)?;
    config.validate()?;

    let (terms, reordered) = year_fraction_terms(dated_flows);
    if reordered {
        debug!("XIRR cash flows were not in date order; sorted before discounting");
    }

    Ok(find_rate_root(
        "XIRR",
        |r| dated_sums(r, &terms).map(|(v, _)| v),
        |r| dated_sums(r, &terms).map(|(_, d)| d),
        guess,
        config,
    ))
}

/// XIRR with the default policy; non-convergence becomes an error.
pub fn xirr(dated_flows: &[CashFlow], guess: Rate) -> CorpFinanceResult<Rate> {
    solve_xirr(dated_flows, guess, &SolverConfig::irr())?.into_result("XIRR")
}

/// True when the dated flows are not already in non-decreasing date order.
pub fn needs_date_sort(dated_flows: &[CashFlow]) -> bool {
    !dated_flows.windows(2).all(|w| w[0].date <= w[1].date)
}

// ---------------------------------------------------------------------------
// MOIC
// ---------------------------------------------------------------------------

/// Multiple on Invested Capital: realized / invested.
pub fn moic(invested: Money, realized: Money) -> CorpFinanceResult<Multiple> {
    if invested.is_zero() {
        return Err(CorpFinanceError::DivisionByZero {
            context: "MOIC invested capital".into(),
        });
    }
    if invested < Decimal::ZERO {
        return Err(CorpFinanceError::InvalidInput {
            field: "invested_capital".into(),
            reason: "Invested capital must be positive".into(),
        });
    }
    Ok(realized / invested)
}

/// Approximate annualised return implied by a multiple: `moic^(1/years) - 1`.
///
/// This is a closed-form estimate, not a root search. It assumes a single
/// entry and a single exit and ignores the timing of interim cash flows.
pub fn moic_to_irr_approx(moic: Multiple, years: Years) -> CorpFinanceResult<Rate> {
    if years <= Decimal::ZERO {
        return Err(CorpFinanceError::InvalidInput {
            field: "years".into(),
            reason: "Holding period must be positive".into(),
        });
    }
    if moic <= Decimal::ZERO {
        return Err(CorpFinanceError::InvalidInput {
            field: "moic".into(),
            reason: "MOIC must be positive".into(),
        });
    }

    let exponent = Decimal::ONE / years;
    let growth = moic.checked_powd(exponent).ok_or_else(|| CorpFinanceError::InvalidInput {
        field: "moic".into(),
        reason: format!("{moic}^(1/{years}) is outside the decimal range"),
    })?;
    Ok(growth - Decimal::ONE)
}
