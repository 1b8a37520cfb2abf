use chrono::NaiveDate;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::error::CorpFinanceError;
use crate::solvers::{Outcome, RootfindingResult, SolverConfig};
use crate::time_value::{moic, moic_to_irr_approx, solve_irr, solve_xirr, year_fraction};
use crate::types::*;
use crate::CorpFinanceResult;

fn default_guess() -> Rate {
    dec!(0.10)
}

/// Input for PE returns calculation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReturnsInput {
    /// Periodic cash flows for IRR calculation (index 0 = initial investment, negative)
    #[serde(default)]
    pub cash_flows: Vec<Money>,
    /// Dated cash flows for XIRR calculation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dated_cash_flows: Option<Vec<CashFlow>>,
    /// Equity invested at entry
    pub entry_equity: Money,
    /// Equity received at exit
    pub exit_equity: Money,
    /// Holding period in years (for periodic IRR)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub holding_period_years: Option<Years>,
    /// Entry and exit dates (for XIRR and date-based holding period)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dates: Option<(NaiveDate, NaiveDate)>,
    /// Starting point for IRR/XIRR
    #[serde(default = "default_guess")]
    pub initial_guess: Rate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub solver: Option<SolverConfig>,
}

/// Output of PE returns calculation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReturnsOutput {
    /// Periodic IRR, present only when the rootfinder converged
    pub irr: Option<Rate>,
    /// Date-based IRR, present only when the rootfinder converged
    pub xirr: Option<Rate>,
    /// Full rootfinding outcome for the periodic series
    #[serde(skip_serializing_if = "Option::is_none")]
    pub irr_outcome: Option<RootfindingResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub xirr_outcome: Option<RootfindingResult>,
    /// Multiple on Invested Capital
    pub moic: Multiple,
    /// Annualised MOIC over the holding period. An approximation that
    /// ignores the timing of interim flows.
    pub moic_implied_irr: Option<Rate>,
    pub cash_on_cash: Multiple,
    pub total_invested: Money,
    pub total_returned: Money,
    /// Holding period in years
    pub holding_period: Years,
}

/// Calculate PE fund returns: IRR, XIRR, MOIC, Cash-on-Cash.
///
/// A series whose rootfinder does not converge keeps its tagged outcome in
/// the output and a warning; the headline `irr`/`xirr` is then `None`, never
/// the last iterate.
pub fn calculate_returns(
    input: &ReturnsInput,
) -> CorpFinanceResult<ComputationOutput<ReturnsOutput>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();
    let config = input.solver.unwrap_or_else(SolverConfig::irr);

    if input.entry_equity.is_zero() {
        return Err(CorpFinanceError::DivisionByZero {
            context: "entry_equity cannot be zero for MOIC/Cash-on-Cash".into(),
        });
    }
    if input.entry_equity < Decimal::ZERO {
        return Err(CorpFinanceError::InvalidInput {
            field: "entry_equity".into(),
            reason: "Entry equity must be positive".into(),
        });
    }

    // Totals come from the cash flows when given, otherwise entry/exit equity
    let (total_invested, total_returned) = if input.cash_flows.is_empty() {
        (input.entry_equity, input.exit_equity)
    } else {
        let invested = input
            .cash_flows
            .iter()
            .filter(|cf| cf.is_sign_negative())
            .map(|cf| cf.abs())
            .sum::<Decimal>();
        let returned = input
            .cash_flows
            .iter()
            .filter(|cf| cf.is_sign_positive())
            .sum::<Decimal>();
        (invested, returned)
    };

    let moic_value = moic(total_invested, total_returned)?;
    let cash_on_cash = input.exit_equity / input.entry_equity;

    let holding_period = if let Some(hp) = input.holding_period_years {
        hp
    } else if let Some((entry, exit)) = input.dates {
        if exit <= entry {
            return Err(CorpFinanceError::DateError(format!(
                "exit date {exit} must be after entry date {entry}"
            )));
        }
        year_fraction(entry, exit)
    } else {
        // Annual periods
        let n = input.cash_flows.len();
        if n > 1 {
            Decimal::from((n - 1) as i64)
        } else {
            warnings.push("No holding period or dates provided; defaulting to 0".into());
            Decimal::ZERO
        }
    };

    let moic_implied_irr = if holding_period > Decimal::ZERO && moic_value > Decimal::ZERO {
        match moic_to_irr_approx(moic_value, holding_period) {
            Ok(rate) => Some(rate),
            Err(e) => {
                warnings.push(format!("MOIC-implied IRR not computed ({}): {e}", e.reason_code()));
                None
            }
        }
    } else {
        None
    };

    let irr_outcome = if input.cash_flows.len() >= 2 {
        match solve_irr(&input.cash_flows, input.initial_guess, &config) {
            Ok(outcome) => Some(outcome),
            Err(e) => {
                warnings.push(format!("IRR not computed ({}): {e}", e.reason_code()));
                None
            }
        }
    } else {
        None
    };

    let xirr_outcome = match &input.dated_cash_flows {
        Some(dated) if dated.len() >= 2 => {
            match solve_xirr(dated, input.initial_guess, &config) {
                Ok(outcome) => Some(outcome),
                Err(e) => {
                    warnings.push(format!("XIRR not computed ({}): {e}", e.reason_code()));
                    None
                }
            }
        }
        Some(_) => {
            warnings.push("XIRR requires at least 2 dated cash flows".into());
            None
        }
        None => None,
    };

    let irr = converged_rate("IRR", irr_outcome.as_ref(), &mut warnings);
    let xirr = converged_rate("XIRR", xirr_outcome.as_ref(), &mut warnings);

    let output = ReturnsOutput {
        irr,
        xirr,
        irr_outcome,
        xirr_outcome,
        moic: moic_value,
        moic_implied_irr,
        cash_on_cash,
        total_invested,
        total_returned,
        holding_period,
    };

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "PE Returns: IRR, XIRR, MOIC, Cash-on-Cash",
        &serde_json::json!({
            "entry_equity": input.entry_equity.to_string(),
            "exit_equity": input.exit_equity.to_string(),
            "initial_guess": input.initial_guess.to_string(),
        }),
        warnings,
        elapsed,
        output,
    ))
}

fn converged_rate(
    label: &str,
    outcome: Option<&RootfindingResult>,
    warnings: &mut Vec<String>,
) -> Option<Rate> {
    match outcome? {
        Outcome::Converged { value, .. } => Some(*value),
        Outcome::Failed {
            reason,
            last_estimate,
            iterations,
            ..
        } => {
            warnings.push(format!(
                "{label} did not converge ({reason:?}) after {iterations} iterations; last estimate {last_estimate}"
            ));
            None
        }
    }
}
