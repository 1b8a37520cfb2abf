//! Request-shaped NPV, IRR, XIRR and MOIC calculators.
//!
//! Each takes a serde input with documented defaults and returns the standard
//! envelope. A root search that does not converge is reported as a
//! `ConvergenceFailure` error carrying the last iterate, never as a rate.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::error::CorpFinanceError;
use crate::solvers::{Outcome, RootfindingResult, SolverConfig};
use crate::time_value::{
    moic, moic_to_irr_approx, needs_date_sort, npv, solve_irr, solve_xirr, xnpv,
};
use crate::types::*;
use crate::CorpFinanceResult;

fn default_guess() -> Rate {
    dec!(0.10)
}

// ---------------------------------------------------------------------------
// NPV
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NpvInput {
    /// Cash flow at t = 0, 1, ..., n-1
    pub cash_flows: Vec<Money>,
    /// Discount rate as a fraction (0.10 = 10%)
    pub discount_rate: Rate,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NpvOutput {
    pub npv: Money,
    /// Each flow discounted to t = 0
    pub present_values: Vec<Money>,
}

pub fn calculate_npv(input: &NpvInput) -> CorpFinanceResult<ComputationOutput<NpvOutput>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    let value = npv(input.discount_rate, &input.cash_flows)?;

    let base = Decimal::ONE + input.discount_rate;
    let mut discount = Decimal::ONE;
    let mut present_values = Vec::with_capacity(input.cash_flows.len());
    for (t, cf) in input.cash_flows.iter().enumerate() {
        if t > 0 {
            discount = discount
                .checked_div(base)
                .ok_or_else(|| CorpFinanceError::invalid("discount_rate", "Discounting overflowed"))?;
        }
        present_values.push(*cf * discount);
    }

    if !has_sign_change(input.cash_flows.iter().copied()) {
        warnings.push("Cash flows do not change sign; IRR is undefined for this series".into());
    }

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Net present value: sum of cf[t] / (1 + r)^t",
        input,
        warnings,
        elapsed,
        NpvOutput {
            npv: value,
            present_values,
        },
    ))
}

// ---------------------------------------------------------------------------
// IRR
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IrrInput {
    pub cash_flows: Vec<Money>,
    /// Newton starting point, 10% unless given
    #[serde(default = "default_guess")]
    pub initial_guess: Rate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub solver: Option<SolverConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IrrOutput {
    pub irr: Rate,
    pub iterations: u32,
    /// NPV evaluated at the returned rate
    pub npv_at_irr: Money,
}

pub fn calculate_irr(input: &IrrInput) -> CorpFinanceResult<ComputationOutput<IrrOutput>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();
    let config = input.solver.unwrap_or_else(SolverConfig::irr);

    if input.cash_flows.len() < 2 {
        return Err(CorpFinanceError::InvalidInput {
            field: "cash_flows".into(),
            reason: "IRR requires at least 2 cash flows".into(),
        });
    }

    let outcome = solve_irr(&input.cash_flows, input.initial_guess, &config)?;
    let (irr, iterations) = converged_or_error("IRR", outcome)?;
    let npv_at_irr = npv(irr, &input.cash_flows)?;

    let sign_changes = input
        .cash_flows
        .windows(2)
        .filter(|w| !w[0].is_zero() && !w[1].is_zero() && w[0].is_sign_negative() != w[1].is_sign_negative())
        .count();
    if sign_changes > 1 {
        warnings.push(format!(
            "Cash flows change sign {sign_changes} times; more than one IRR may exist"
        ));
    }

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Internal rate of return: Newton-Raphson on NPV with bracketed bisection fallback",
        input,
        warnings,
        elapsed,
        IrrOutput {
            irr,
            iterations,
            npv_at_irr,
        },
    ))
}

// ---------------------------------------------------------------------------
// XIRR
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct XirrInput {
    /// Dated flows; any order, sorted by date before use
    pub cash_flows: Vec<CashFlow>,
    #[serde(default = "default_guess")]
    pub initial_guess: Rate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub solver: Option<SolverConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct XirrOutput {
    pub xirr: Rate,
    pub iterations: u32,
    pub xnpv_at_xirr: Money,
    /// Days between the earliest and latest flow
    pub span_days: i64,
}

pub fn calculate_xirr(input: &XirrInput) -> CorpFinanceResult<ComputationOutput<XirrOutput>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();
    let config = input.solver.unwrap_or_else(SolverConfig::irr);

    if input.cash_flows.len() < 2 {
        return Err(CorpFinanceError::InvalidInput {
            field: "cash_flows".into(),
            reason: "XIRR requires at least 2 dated cash flows".into(),
        });
    }
    if needs_date_sort(&input.cash_flows) {
        warnings.push("Cash flows were not in date order and have been sorted".into());
    }

    let outcome = solve_xirr(&input.cash_flows, input.initial_guess, &config)?;
    let (xirr, iterations) = converged_or_error("XIRR", outcome)?;
    let xnpv_at_xirr = xnpv(xirr, &input.cash_flows)?;

    let span_days = match (
        input.cash_flows.iter().map(|cf| cf.date).min(),
        input.cash_flows.iter().map(|cf| cf.date).max(),
    ) {
        (Some(first), Some(last)) => (last - first).num_days(),
        _ => 0,
    };

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "XIRR: Actual/365 Fixed year fractions from the earliest date, Newton-Raphson with bisection fallback",
        input,
        warnings,
        elapsed,
        XirrOutput {
            xirr,
            iterations,
            xnpv_at_xirr,
            span_days,
        },
    ))
}

// ---------------------------------------------------------------------------
// MOIC
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MoicInput {
    pub invested_capital: Money,
    pub realized_value: Money,
    /// When given, an approximate annualised return is added
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub holding_period_years: Option<Years>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MoicOutput {
    pub moic: Multiple,
    /// `moic^(1/years) - 1`; ignores interim cash flow timing
    pub approximate_irr: Option<Rate>,
}

pub fn calculate_moic(input: &MoicInput) -> CorpFinanceResult<ComputationOutput<MoicOutput>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    let multiple = moic(input.invested_capital, input.realized_value)?;
    let approximate_irr = match input.holding_period_years {
        Some(years) if years <= Decimal::ZERO => {
            return Err(CorpFinanceError::InvalidInput {
                field: "holding_period_years".into(),
                reason: "Holding period must be positive".into(),
            });
        }
        Some(years) => match moic_to_irr_approx(multiple, years) {
            Ok(rate) => {
                warnings.push(
                    "approximate_irr assumes a single entry and exit; it is not a root-found IRR"
                        .into(),
                );
                Some(rate)
            }
            Err(e) => {
                warnings.push(format!("approximate_irr not computed ({}): {e}", e.reason_code()));
                None
            }
        },
        None => None,
    };

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Multiple on invested capital: realized / invested",
        input,
        warnings,
        elapsed,
        MoicOutput {
            moic: multiple,
            approximate_irr,
        },
    ))
}

fn converged_or_error(function: &str, outcome: RootfindingResult) -> CorpFinanceResult<(Rate, u32)> {
    match outcome {
        Outcome::Converged {
            value, iterations, ..
        } => Ok((value, iterations)),
        Outcome::Failed {
            last_estimate,
            iterations,
            residual,
            ..
        } => Err(CorpFinanceError::ConvergenceFailure {
            function: function.into(),
            iterations,
            last_estimate,
            last_delta: residual,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_npv_present_values_sum_to_npv() {
        let input = NpvInput {
            cash_flows: vec![dec!(-1000), dec!(300), dec!(400), dec!(500)],
            discount_rate: dec!(0.10),
        };
        let out = calculate_npv(&input).unwrap();
        let sum: Decimal = out.result.present_values.iter().sum();
        assert!((sum - out.result.npv).abs() < dec!(0.0000001));
        assert_eq!(out.result.present_values[0], dec!(-1000));
        // 300 / 1.1
        assert!((out.result.present_values[1] - dec!(272.7272727)).abs() < dec!(0.000001));
    }

    #[test]
    fn test_npv_rejects_rate_at_minus_one() {
        let input = NpvInput {
            cash_flows: vec![dec!(-1), dec!(2)],
            discount_rate: dec!(-1),
        };
        assert_eq!(calculate_npv(&input).unwrap_err().reason_code(), "InvalidInput");
    }

    #[test]
    fn test_irr_default_guess_from_json() {
        let input: IrrInput =
            serde_json::from_str(r#"{"cash_flows": ["-100", "110"]}"#).unwrap();
        assert_eq!(input.initial_guess, dec!(0.10));
        let out = calculate_irr(&input).unwrap();
        assert_eq!(out.result.irr, dec!(0.10));
        assert_eq!(out.result.iterations, 0);
    }

    #[test]
    fn test_irr_reports_npv_at_rate() {
        let input = IrrInput {
            cash_flows: vec![dec!(-1000), dec!(400), dec!(400), dec!(400)],
            initial_guess: dec!(0.10),
            solver: None,
        };
        let out = calculate_irr(&input).unwrap();
        assert!(out.result.npv_at_irr.abs() < dec!(0.000001));
        assert!(out.warnings.is_empty());
    }

    #[test]
    fn test_irr_no_sign_change_code() {
        let input = IrrInput {
            cash_flows: vec![dec!(100), dec!(100)],
            initial_guess: dec!(0.10),
            solver: None,
        };
        assert_eq!(calculate_irr(&input).unwrap_err().reason_code(), "NoSignChange");
    }

    #[test]
    fn test_irr_without_root_is_no_convergence() {
        let input = IrrInput {
            cash_flows: vec![dec!(-100), dec!(200), dec!(-150)],
            initial_guess: dec!(0.10),
            solver: None,
        };
        let err = calculate_irr(&input).unwrap_err();
        assert_eq!(err.reason_code(), "NoConvergence");
    }

    #[test]
    fn test_irr_multiple_sign_changes_warns() {
        let input = IrrInput {
            cash_flows: vec![dec!(-100), dec!(230), dec!(-132)],
            initial_guess: dec!(0.05),
            solver: None,
        };
        let out = calculate_irr(&input).unwrap();
        assert!(out.warnings.iter().any(|w| w.contains("more than one IRR")));
    }

    #[test]
    fn test_xirr_unsorted_warns() {
        let input = XirrInput {
            cash_flows: vec![
                CashFlow::new(date(2020, 12, 31), dec!(1150)),
                CashFlow::new(date(2020, 1, 1), dec!(-1000)),
            ],
            initial_guess: dec!(0.10),
            solver: None,
        };
        let out = calculate_xirr(&input).unwrap();
        assert!((out.result.xirr - dec!(0.15)).abs() < dec!(0.0000001));
        assert_eq!(out.result.span_days, 365);
        assert!(out.warnings.iter().any(|w| w.contains("sorted")));
    }

    #[test]
    fn test_moic_with_approximation() {
        let input = MoicInput {
            invested_capital: dec!(100),
            realized_value: dec!(250),
            holding_period_years: Some(dec!(5)),
        };
        let out = calculate_moic(&input).unwrap();
        assert_eq!(out.result.moic, dec!(2.5));
        let approx = out.result.approximate_irr.unwrap();
        assert!((approx - dec!(0.2011244)).abs() < dec!(0.000001), "got {approx}");
        assert!(!out.warnings.is_empty());
    }

    #[test]
    fn test_moic_approximation_out_of_range_is_optional() {
        // 3x over one day: 3^365 is past the decimal range
        let input = MoicInput {
            invested_capital: dec!(100),
            realized_value: dec!(300),
            holding_period_years: Some(dec!(1) / dec!(365)),
        };
        let out = calculate_moic(&input).unwrap();
        assert_eq!(out.result.moic, dec!(3));
        assert!(out.result.approximate_irr.is_none());
        assert!(out.warnings.iter().any(|w| w.contains("not computed")));

        let input = MoicInput {
            holding_period_years: Some(Decimal::ZERO),
            ..input
        };
        assert_eq!(calculate_moic(&input).unwrap_err().reason_code(), "InvalidInput");
    }

    #[test]
    fn test_moic_zero_invested() {
        let input = MoicInput {
            invested_capital: Decimal::ZERO,
            realized_value: dec!(10),
            holding_period_years: None,
        };
        assert_eq!(calculate_moic(&input).unwrap_err().reason_code(), "DivisionByZero");
    }
}
