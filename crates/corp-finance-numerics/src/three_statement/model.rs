use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::debug;

use crate::circular::{
    solve_cash_interest_circular, CashInterestInput, CircularConfig, ResolutionMethod,
};
use crate::error::CorpFinanceError;
use crate::solvers::Outcome;
use crate::time_value::moic_to_irr_approx;
use crate::types::{with_metadata, ComputationOutput, Money, Rate};
use crate::CorpFinanceResult;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

const DAYS_IN_YEAR: Decimal = dec!(365);
const LEVERAGE_WARNING: Decimal = dec!(6);
const COVERAGE_WARNING: Decimal = dec!(2);

// ---------------------------------------------------------------------------
// Input
// ---------------------------------------------------------------------------

/// Full input specification for a linked three-statement financial model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreeStatementInput {
    /// Base year revenue
    pub base_revenue: Money,
    /// Growth rate per projection year (length determines number of years)
    pub revenue_growth_rates: Vec<Rate>,
    /// COGS as % of revenue
    pub cogs_pct: Rate,
    /// SG&A as % of revenue
    pub sga_pct: Rate,
    /// R&D as % of revenue
    pub rnd_pct: Rate,
    /// D&A as % of prior PP&E
    pub da_pct: Rate,
    /// Interest rate on average debt
    pub interest_rate: Rate,
    /// Corporate tax rate
    pub tax_rate: Rate,
    pub base_cash: Money,
    pub base_receivables: Money,
    pub base_inventory: Money,
    pub base_payables: Money,
    /// Base year PP&E (net)
    pub base_ppe: Money,
    pub base_debt: Money,
    pub base_equity: Money,
    /// Days sales outstanding
    pub dso_days: Decimal,
    /// Days inventory outstanding
    pub dio_days: Decimal,
    /// Days payable outstanding
    pub dpo_days: Decimal,
    /// Capex as % of revenue
    pub capex_pct: Rate,
    /// Annual debt repayment as % of beginning debt
    pub debt_repayment_pct: Rate,
    /// Dividends as % of net income
    pub dividend_payout_ratio: Rate,
    /// Minimum cash to maintain (excess goes to extra debt paydown)
    pub min_cash_balance: Money,
    /// Tolerances and caps for the per-year interest/cash/debt loop
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub solver: Option<CircularConfig>,
}

// ---------------------------------------------------------------------------
// Output structs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreeStatementOutput {
    pub income_statements: Vec<IncomeStatement>,
    pub balance_sheets: Vec<BalanceSheet>,
    pub cash_flow_statements: Vec<CashFlowStatement>,
    /// How each year's circular reference was resolved
    pub circular_resolution: Vec<YearResolution>,
    pub summary: ProjectionSummary,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncomeStatement {
    pub year: i32,
    pub revenue: Money,
    pub cogs: Money,
    pub gross_profit: Money,
    pub gross_margin: Rate,
    pub sga: Money,
    pub rnd: Money,
    pub total_opex: Money,
    pub ebitda: Money,
    pub ebitda_margin: Rate,
    pub depreciation: Money,
    pub ebit: Money,
    pub ebit_margin: Rate,
    pub interest_expense: Money,
    pub ebt: Money,
    pub taxes: Money,
    pub net_income: Money,
    pub net_margin: Rate,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BalanceSheet {
    pub year: i32,
    pub cash: Money,
    pub accounts_receivable: Money,
    pub inventory: Money,
    pub total_current_assets: Money,
    pub ppe_net: Money,
    pub total_assets: Money,
    pub accounts_payable: Money,
    pub current_debt: Money,
    pub total_current_liabilities: Money,
    pub long_term_debt: Money,
    pub total_debt: Money,
    pub total_liabilities: Money,
    pub shareholders_equity: Money,
    pub retained_earnings_cumulative: Money,
    pub total_liabilities_and_equity: Money,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CashFlowStatement {
    pub year: i32,
    pub net_income: Money,
    pub depreciation: Money,
    pub change_in_receivables: Money,
    pub change_in_inventory: Money,
    pub change_in_payables: Money,
    pub cash_from_operations: Money,
    pub capex: Money,
    pub cash_from_investing: Money,
    pub debt_repayment: Money,
    pub new_debt: Money,
    pub dividends: Money,
    pub cash_from_financing: Money,
    pub net_change_in_cash: Money,
    pub ending_cash: Money,
    pub fcf: Money,
    pub fcfe: Money,
}

/// Convergence diagnostics for one projected year.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct YearResolution {
    pub year: i32,
    pub method: ResolutionMethod,
    pub iterations: u32,
    pub residual: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectionSummary {
    pub total_years: i32,
    pub revenue_cagr: Rate,
    pub avg_ebitda_margin: Rate,
    pub avg_net_margin: Rate,
    pub ending_debt: Money,
    pub ending_leverage: Decimal,
    pub cumulative_fcf: Money,
    pub total_circular_iterations: u32,
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Build a linked three-statement financial model (IS, BS, CF).
///
/// Each year's interest expense depends on average debt, which depends on
/// the cash available for paydown, which depends on net income after that
/// same interest. The loop is resolved per year by the circular solver; a
/// year that fails to converge fails the whole model.
pub fn build_three_statement_model(
    input: &ThreeStatementInput,
) -> CorpFinanceResult<ComputationOutput<ThreeStatementOutput>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    validate_input(input)?;

    let solver = input.solver.unwrap_or_default();
    let n_years = input.revenue_growth_rates.len();

    // Carry-forward state from the base year
    let mut prior_revenue = input.base_revenue;
    let mut prior_receivables = input.base_receivables;
    let mut prior_inventory = input.base_inventory;
    let mut prior_payables = input.base_payables;
    let mut prior_ppe = input.base_ppe;
    let mut prior_debt = input.base_debt;
    let mut prior_cash = input.base_cash;
    let mut prior_equity = input.base_equity;
    let mut cumulative_retained_earnings = Decimal::ZERO;

    let mut income_statements = Vec::with_capacity(n_years);
    let mut balance_sheets = Vec::with_capacity(n_years);
    let mut cash_flow_statements = Vec::with_capacity(n_years);
    let mut circular_resolution = Vec::with_capacity(n_years);

    for (yr_idx, &growth) in input.revenue_growth_rates.iter().enumerate() {
        let year = (yr_idx + 1) as i32;

        // Operating lines, all independent of financing
        let revenue = prior_revenue * (Decimal::ONE + growth);
        let cogs = revenue * input.cogs_pct;
        let gross_profit = revenue - cogs;
        let sga = revenue * input.sga_pct;
        let rnd = revenue * input.rnd_pct;
        let total_opex = sga + rnd;
        let depreciation = prior_ppe * input.da_pct;
        let ebitda = gross_profit - total_opex;
        let ebit = ebitda - depreciation;

        let receivables = revenue * input.dso_days / DAYS_IN_YEAR;
        let inventory = cogs * input.dio_days / DAYS_IN_YEAR;
        let payables = cogs * input.dpo_days / DAYS_IN_YEAR;
        let change_in_receivables = receivables - prior_receivables;
        let change_in_inventory = inventory - prior_inventory;
        let change_in_payables = payables - prior_payables;

        let capex = revenue * input.capex_pct;
        let ppe_net = prior_ppe - depreciation + capex;

        // Financing: interest <-> cash <-> debt
        let loop_input = CashInterestInput {
            beginning_cash: prior_cash,
            beginning_debt: prior_debt,
            scheduled_repayment: prior_debt * input.debt_repayment_pct,
            interest_rate: input.interest_rate,
            tax_rate: input.tax_rate,
            ebit,
            non_cash_charges: depreciation,
            other_cash_flows: -change_in_receivables - change_in_inventory + change_in_payables
                - capex,
            dividend_payout_ratio: input.dividend_payout_ratio,
            min_cash_balance: input.min_cash_balance,
            cash_sweep: true,
            solver: None,
        };
        let (outcome, method) = solve_cash_interest_circular(&loop_input, &solver)?;
        let (fin, iterations, residual) = match outcome {
            Outcome::Converged {
                value,
                iterations,
                residual,
            } => (value, iterations, residual),
            Outcome::Failed {
                last_estimate,
                iterations,
                residual,
                ..
            } => {
                return Err(CorpFinanceError::ConvergenceFailure {
                    function: format!("three-statement year {year} interest/cash/debt"),
                    iterations,
                    last_estimate: last_estimate.interest_expense,
                    last_delta: residual,
                })
            }
        };
        debug!(year, ?method, iterations, "projection year resolved");

        let cfo = fin.net_income + depreciation - change_in_receivables - change_in_inventory
            + change_in_payables;
        let cfi = -capex;
        let total_debt_repayment = fin.scheduled_repayment + fin.debt_paydown;
        let cff = -total_debt_repayment + fin.debt_draw - fin.dividends;
        let net_change_in_cash = cfo + cfi + cff;

        // Split debt into current (next year's scheduled repayment) and long-term
        let current_debt = (fin.ending_debt * input.debt_repayment_pct).min(fin.ending_debt);
        let long_term_debt = fin.ending_debt - current_debt;

        let fcf = cfo - capex;
        let fcfe = fcf - total_debt_repayment + fin.debt_draw;

        cumulative_retained_earnings += fin.net_income - fin.dividends;
        let shareholders_equity = prior_equity + fin.net_income - fin.dividends;

        let total_current_assets = fin.ending_cash + receivables + inventory;
        let total_assets = total_current_assets + ppe_net;
        let total_current_liabilities = payables + current_debt;
        let total_liabilities = total_current_liabilities + long_term_debt;
        let total_liabilities_and_equity = total_liabilities + shareholders_equity;

        income_statements.push(IncomeStatement {
            year,
            revenue,
            cogs,
            gross_profit,
            gross_margin: safe_divide(gross_profit, revenue),
            sga,
            rnd,
            total_opex,
            ebitda,
            ebitda_margin: safe_divide(ebitda, revenue),
            depreciation,
            ebit,
            ebit_margin: safe_divide(ebit, revenue),
            interest_expense: fin.interest_expense,
            ebt: fin.ebt,
            taxes: fin.taxes,
            net_income: fin.net_income,
            net_margin: safe_divide(fin.net_income, revenue),
        });

        balance_sheets.push(BalanceSheet {
            year,
            cash: fin.ending_cash,
            accounts_receivable: receivables,
            inventory,
            total_current_assets,
            ppe_net,
            total_assets,
            accounts_payable: payables,
            current_debt,
            total_current_liabilities,
            long_term_debt,
            total_debt: fin.ending_debt,
            total_liabilities,
            shareholders_equity,
            retained_earnings_cumulative: cumulative_retained_earnings,
            total_liabilities_and_equity,
        });

        cash_flow_statements.push(CashFlowStatement {
            year,
            net_income: fin.net_income,
            depreciation,
            change_in_receivables,
            change_in_inventory,
            change_in_payables,
            cash_from_operations: cfo,
            capex,
            cash_from_investing: cfi,
            debt_repayment: total_debt_repayment,
            new_debt: fin.debt_draw,
            dividends: fin.dividends,
            cash_from_financing: cff,
            net_change_in_cash,
            ending_cash: fin.ending_cash,
            fcf,
            fcfe,
        });

        circular_resolution.push(YearResolution {
            year,
            method,
            iterations,
            residual,
        });

        if ebitda > Decimal::ZERO {
            let leverage = fin.ending_debt / ebitda;
            if leverage > LEVERAGE_WARNING {
                warnings.push(format!(
                    "Year {year}: leverage ratio {leverage:.1}x exceeds 6.0x threshold"
                ));
            }
        }
        if fin.interest_expense > Decimal::ZERO {
            let coverage = ebit / fin.interest_expense;
            if coverage < COVERAGE_WARNING {
                warnings.push(format!(
                    "Year {year}: interest coverage ratio {coverage:.2}x below 2.0x minimum"
                ));
            }
        }
        if fcf < Decimal::ZERO {
            warnings.push(format!("Year {year}: negative free cash flow ({fcf})"));
        }

        prior_revenue = revenue;
        prior_receivables = receivables;
        prior_inventory = inventory;
        prior_payables = payables;
        prior_ppe = ppe_net;
        prior_debt = fin.ending_debt;
        prior_cash = fin.ending_cash;
        prior_equity = shareholders_equity;
    }

    let summary = build_summary(
        input,
        &income_statements,
        &cash_flow_statements,
        &balance_sheets,
        &circular_resolution,
    )?;

    let output = ThreeStatementOutput {
        income_statements,
        balance_sheets,
        cash_flow_statements,
        circular_resolution,
        summary,
    };

    let elapsed = start.elapsed().as_micros() as u64;

    Ok(with_metadata(
        "Linked Three-Statement Model with Circular Reference Resolution",
        input,
        warnings,
        elapsed,
        output,
    ))
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

fn validate_input(input: &ThreeStatementInput) -> CorpFinanceResult<()> {
    if input.revenue_growth_rates.is_empty() {
        return Err(CorpFinanceError::InvalidInput {
            field: "revenue_growth_rates".into(),
            reason: "Must contain at least one growth rate".into(),
        });
    }
    if let Some(g) = input
        .revenue_growth_rates
        .iter()
        .find(|g| **g <= -Decimal::ONE)
    {
        return Err(CorpFinanceError::InvalidInput {
            field: "revenue_growth_rates".into(),
            reason: format!("Growth rate must be above -100%, got {g}"),
        });
    }

    for (field, value) in [
        ("cogs_pct", input.cogs_pct),
        ("sga_pct", input.sga_pct),
        ("rnd_pct", input.rnd_pct),
        ("da_pct", input.da_pct),
        ("interest_rate", input.interest_rate),
        ("tax_rate", input.tax_rate),
        ("capex_pct", input.capex_pct),
        ("debt_repayment_pct", input.debt_repayment_pct),
        ("dividend_payout_ratio", input.dividend_payout_ratio),
    ] {
        validate_rate(field, value)?;
    }

    for (field, value) in [
        ("base_revenue", input.base_revenue),
        ("base_cash", input.base_cash),
        ("base_receivables", input.base_receivables),
        ("base_inventory", input.base_inventory),
        ("base_payables", input.base_payables),
        ("base_ppe", input.base_ppe),
        ("base_debt", input.base_debt),
        ("base_equity", input.base_equity),
        ("min_cash_balance", input.min_cash_balance),
        ("dso_days", input.dso_days),
        ("dio_days", input.dio_days),
        ("dpo_days", input.dpo_days),
    ] {
        validate_non_negative(field, value)?;
    }

    let total_cost_pct = input.cogs_pct + input.sga_pct + input.rnd_pct;
    if total_cost_pct > Decimal::ONE {
        return Err(CorpFinanceError::InvalidInput {
            field: "cogs_pct".into(),
            reason: format!(
                "Total operating cost percentage ({total_cost_pct}) exceeds 100% of revenue"
            ),
        });
    }

    Ok(())
}

fn validate_rate(field: &str, value: Rate) -> CorpFinanceResult<()> {
    if value < Decimal::ZERO || value > Decimal::ONE {
        return Err(CorpFinanceError::InvalidInput {
            field: field.into(),
            reason: format!("Rate must be between 0 and 1, got {value}"),
        });
    }
    Ok(())
}

fn validate_non_negative(field: &str, value: Money) -> CorpFinanceResult<()> {
    if value < Decimal::ZERO {
        return Err(CorpFinanceError::InvalidInput {
            field: field.into(),
            reason: format!("Value must be non-negative, got {value}"),
        });
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Margin helper; a zero-revenue year reports zero margins.
fn safe_divide(numerator: Money, denominator: Money) -> Decimal {
    if denominator.is_zero() {
        Decimal::ZERO
    } else {
        numerator / denominator
    }
}

fn build_summary(
    input: &ThreeStatementInput,
    income_statements: &[IncomeStatement],
    cash_flow_statements: &[CashFlowStatement],
    balance_sheets: &[BalanceSheet],
    circular_resolution: &[YearResolution],
) -> CorpFinanceResult<ProjectionSummary> {
    let (Some(last_is), Some(last_bs)) = (income_statements.last(), balance_sheets.last()) else {
        return Err(CorpFinanceError::invalid(
            "revenue_growth_rates",
            "Projection produced no years",
        ));
    };
    let n = income_statements.len() as i32;
    let n_dec = Decimal::from(n);

    // (ending / beginning)^(1/n) - 1, zero when either end is non-positive
    let revenue_cagr = if input.base_revenue > Decimal::ZERO && last_is.revenue > Decimal::ZERO {
        moic_to_irr_approx(last_is.revenue / input.base_revenue, n_dec)?
    } else {
        Decimal::ZERO
    };

    let avg_ebitda_margin =
        income_statements.iter().map(|is| is.ebitda_margin).sum::<Decimal>() / n_dec;
    let avg_net_margin =
        income_statements.iter().map(|is| is.net_margin).sum::<Decimal>() / n_dec;
    let cumulative_fcf: Money = cash_flow_statements.iter().map(|cf| cf.fcf).sum();

    let ending_leverage = if last_is.ebitda > Decimal::ZERO {
        last_bs.total_debt / last_is.ebitda
    } else {
        Decimal::ZERO
    };

    Ok(ProjectionSummary {
        total_years: n,
        revenue_cagr,
        avg_ebitda_margin,
        avg_net_margin,
        ending_debt: last_bs.total_debt,
        ending_leverage,
        cumulative_fcf,
        total_circular_iterations: circular_resolution.iter().map(|r| r.iterations).sum(),
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
