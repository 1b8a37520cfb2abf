use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::debug;

use crate::circular::{
    solve_cash_interest_circular, CashInterestInput, CircularConfig, ResolutionMethod,
};
use crate::error::CorpFinanceError;
use crate::solvers::{Outcome, RootfindingResult, SolverConfig};
use crate::time_value::{moic, moic_to_irr_approx, solve_irr};
use crate::types::*;
use crate::CorpFinanceResult;

fn default_true() -> bool {
    true
}

/// Input for an LBO debt paydown projection on a single acquisition facility.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DebtPaydownInput {
    /// Enterprise value at acquisition
    pub entry_ev: Money,
    /// Acquisition debt drawn at close
    pub entry_debt: Money,
    /// Sponsor equity contribution
    pub equity_contribution: Money,
    /// Revenue in the base year (year 0)
    pub base_revenue: Money,
    /// Revenue growth per year; the last value repeats if shorter than the hold
    pub revenue_growth: Vec<Rate>,
    /// EBITDA margin per year; the last value repeats if shorter than the hold
    pub ebitda_margin: Vec<Rate>,
    pub da_as_pct_revenue: Rate,
    pub capex_as_pct_revenue: Rate,
    /// Net working capital held as a percentage of revenue
    pub nwc_as_pct_revenue: Rate,
    pub tax_rate: Rate,
    /// Interest rate on the average facility balance
    pub interest_rate: Rate,
    /// Mandatory amortisation per year as a percentage of entry debt
    #[serde(default)]
    pub mandatory_amortisation_pct: Rate,
    /// Sweep all cash above the minimum into optional repayment
    #[serde(default = "default_true")]
    pub cash_sweep: bool,
    /// Cash floor; shortfalls are funded by a revolver draw
    #[serde(default)]
    pub minimum_cash: Money,
    /// Exit year (e.g. 5 for a 5-year hold)
    pub exit_year: u32,
    /// Exit EV/EBITDA multiple
    pub exit_multiple: Multiple,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub solver: Option<CircularConfig>,
}

/// A single year of the paydown.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaydownYear {
    pub year: u32,
    pub revenue: Money,
    pub ebitda: Money,
    pub ebit: Money,
    pub interest_expense: Money,
    pub tax: Money,
    pub net_income: Money,
    pub capex: Money,
    pub nwc_change: Money,
    pub fcf_before_debt_service: Money,
    pub mandatory_repayment: Money,
    pub optional_repayment: Money,
    pub revolver_draw: Money,
    pub ending_debt: Money,
    pub ending_cash: Money,
    pub net_debt: Money,
    /// Net debt / EBITDA
    pub leverage: Multiple,
    pub method: ResolutionMethod,
    pub iterations: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DebtPaydownOutput {
    pub years: Vec<PaydownYear>,
    pub exit_ev: Money,
    pub exit_net_debt: Money,
    pub exit_equity_value: Money,
    /// Sponsor IRR on [-equity, 0, ..., exit equity]; absent when exit equity is not positive
    pub sponsor_irr: Option<RootfindingResult>,
    pub moic: Multiple,
    /// `moic^(1/exit_year) - 1`; equals the IRR here since there are no interim distributions
    pub moic_implied_irr: Option<Rate>,
    pub entry_leverage: Multiple,
    pub exit_leverage: Multiple,
    pub total_debt_repaid: Money,
}

/// Clamp to the last value when the vector is shorter than the hold.
fn get_rate(rates: &[Rate], index: usize) -> Rate {
    rates
        .get(index)
        .or_else(|| rates.last())
        .copied()
        .unwrap_or(Decimal::ZERO)
}

fn validate(input: &DebtPaydownInput) -> CorpFinanceResult<()> {
    for (field, value) in [
        ("entry_ev", input.entry_ev),
        ("equity_contribution", input.equity_contribution),
        ("base_revenue", input.base_revenue),
        ("exit_multiple", input.exit_multiple),
    ] {
        if value <= Decimal::ZERO {
            return Err(CorpFinanceError::InvalidInput {
                field: field.into(),
                reason: format!("Must be positive, got {value}"),
            });
        }
    }
    for (field, value) in [
        ("entry_debt", input.entry_debt),
        ("minimum_cash", input.minimum_cash),
    ] {
        if value < Decimal::ZERO {
            return Err(CorpFinanceError::InvalidInput {
                field: field.into(),
                reason: format!("Must be non-negative, got {value}"),
            });
        }
    }
    for (field, value) in [
        ("da_as_pct_revenue", input.da_as_pct_revenue),
        ("capex_as_pct_revenue", input.capex_as_pct_revenue),
        ("nwc_as_pct_revenue", input.nwc_as_pct_revenue),
        ("tax_rate", input.tax_rate),
        ("interest_rate", input.interest_rate),
        ("mandatory_amortisation_pct", input.mandatory_amortisation_pct),
    ] {
        if value < Decimal::ZERO || value > Decimal::ONE {
            return Err(CorpFinanceError::InvalidInput {
                field: field.into(),
                reason: format!("Rate must be between 0 and 1, got {value}"),
            });
        }
    }
    if input.exit_year == 0 {
        return Err(CorpFinanceError::InvalidInput {
            field: "exit_year".into(),
            reason: "Exit year must be at least 1".into(),
        });
    }
    if input.revenue_growth.is_empty() || input.ebitda_margin.is_empty() {
        return Err(CorpFinanceError::InvalidInput {
            field: "revenue_growth".into(),
            reason: "Growth and margin projections need at least one year".into(),
        });
    }
    Ok(())
}

/// Project an LBO's debt paydown from close to exit and compute sponsor returns.
///
/// Interest accrues on the average facility balance, so each year's
/// interest, cash sweep and ending debt are resolved together by the
/// circular solver. A year that does not converge is an error.
pub fn build_debt_paydown(
    input: &DebtPaydownInput,
) -> CorpFinanceResult<ComputationOutput<DebtPaydownOutput>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    validate(input)?;
    let solver = input.solver.unwrap_or_default();

    let sources = input.entry_debt + input.equity_contribution;
    if sources != input.entry_ev {
        warnings.push(format!(
            "Debt plus equity ({sources}) does not match entry EV ({})",
            input.entry_ev
        ));
    }

    let scheduled_amortisation = input.entry_debt * input.mandatory_amortisation_pct;
    let mut years: Vec<PaydownYear> = Vec::with_capacity(input.exit_year as usize);
    let mut prev_revenue = input.base_revenue;
    let mut prev_nwc = input.base_revenue * input.nwc_as_pct_revenue;
    let mut debt = input.entry_debt;
    let mut cash = Decimal::ZERO;
    let mut last_ebitda = Decimal::ZERO;

    for year in 1..=input.exit_year {
        let yr_idx = (year - 1) as usize;

        let revenue = prev_revenue * (Decimal::ONE + get_rate(&input.revenue_growth, yr_idx));
        let ebitda = revenue * get_rate(&input.ebitda_margin, yr_idx);
        let da = revenue * input.da_as_pct_revenue;
        let ebit = ebitda - da;
        let capex = revenue * input.capex_as_pct_revenue;
        let nwc = revenue * input.nwc_as_pct_revenue;
        let nwc_change = nwc - prev_nwc;

        let loop_input = CashInterestInput {
            beginning_cash: cash,
            beginning_debt: debt,
            scheduled_repayment: scheduled_amortisation,
            interest_rate: input.interest_rate,
            tax_rate: input.tax_rate,
            ebit,
            non_cash_charges: da,
            other_cash_flows: -capex - nwc_change,
            dividend_payout_ratio: Decimal::ZERO,
            min_cash_balance: input.minimum_cash,
            cash_sweep: input.cash_sweep,
            solver: None,
        };
        let (outcome, method) = solve_cash_interest_circular(&loop_input, &solver)?;
        let (fin, iterations) = match outcome {
            Outcome::Converged {
                value, iterations, ..
            } => (value, iterations),
            Outcome::Failed {
                last_estimate,
                iterations,
                residual,
                ..
            } => {
                return Err(CorpFinanceError::ConvergenceFailure {
                    function: format!("debt paydown year {year}"),
                    iterations,
                    last_estimate: last_estimate.interest_expense,
                    last_delta: residual,
                })
            }
        };
        debug!(year, ?method, iterations, ending_debt = %fin.ending_debt, "paydown year resolved");

        if fin.debt_draw > Decimal::ZERO {
            warnings.push(format!(
                "Year {year}: revolver draw of {} to hold minimum cash",
                fin.debt_draw
            ));
        }

        let net_debt = fin.ending_debt - fin.ending_cash;
        let leverage = if ebitda > Decimal::ZERO {
            net_debt / ebitda
        } else {
            Decimal::ZERO
        };

        years.push(PaydownYear {
            year,
            revenue,
            ebitda,
            ebit,
            interest_expense: fin.interest_expense,
            tax: fin.taxes,
            net_income: fin.net_income,
            capex,
            nwc_change,
            fcf_before_debt_service: fin.net_income + da - capex - nwc_change,
            mandatory_repayment: fin.scheduled_repayment,
            optional_repayment: fin.debt_paydown,
            revolver_draw: fin.debt_draw,
            ending_debt: fin.ending_debt,
            ending_cash: fin.ending_cash,
            net_debt,
            leverage,
            method,
            iterations,
        });

        prev_revenue = revenue;
        prev_nwc = nwc;
        debt = fin.ending_debt;
        cash = fin.ending_cash;
        last_ebitda = ebitda;
    }

    // Exit
    let exit_ev = last_ebitda * input.exit_multiple;
    let exit_net_debt = debt - cash;
    let exit_equity_value = exit_ev - exit_net_debt;

    // Sponsor returns: [-equity, 0, ..., exit equity]
    let mut flows = vec![Decimal::ZERO; input.exit_year as usize + 1];
    flows[0] = -input.equity_contribution;
    flows[input.exit_year as usize] = exit_equity_value;

    let moic_value = moic(input.equity_contribution, exit_equity_value)?;
    let (sponsor_irr, moic_implied_irr) = if exit_equity_value > Decimal::ZERO {
        let outcome = solve_irr(&flows, dec!(0.10), &SolverConfig::irr())?;
        if !outcome.is_converged() {
            warnings.push("Sponsor IRR did not converge".into());
        }
        let approx = moic_to_irr_approx(moic_value, Decimal::from(input.exit_year))?;
        (Some(outcome), Some(approx))
    } else {
        warnings.push(format!(
            "Exit equity value {exit_equity_value} is not positive; sponsor IRR undefined"
        ));
        (None, None)
    };

    let entry_ebitda = input.base_revenue * get_rate(&input.ebitda_margin, 0);
    let entry_leverage = if entry_ebitda > Decimal::ZERO {
        input.entry_debt / entry_ebitda
    } else {
        Decimal::ZERO
    };
    let exit_leverage = if last_ebitda > Decimal::ZERO {
        exit_net_debt / last_ebitda
    } else {
        warnings.push("Exit EBITDA is not positive; exit leverage undefined".into());
        Decimal::ZERO
    };
    let total_debt_repaid = years
        .iter()
        .map(|y| y.mandatory_repayment + y.optional_repayment)
        .sum();

    let output = DebtPaydownOutput {
        years,
        exit_ev,
        exit_net_debt,
        exit_equity_value,
        sponsor_irr,
        moic: moic_value,
        moic_implied_irr,
        entry_leverage,
        exit_leverage,
        total_debt_repaid,
    };

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "LBO debt paydown with circular interest resolution",
        &serde_json::json!({
            "entry_ev": input.entry_ev.to_string(),
            "entry_debt": input.entry_debt.to_string(),
            "exit_year": input.exit_year,
            "exit_multiple": input.exit_multiple.to_string(),
            "cash_sweep": input.cash_sweep,
        }),
        warnings,
        elapsed,
        output,
    ))
}
