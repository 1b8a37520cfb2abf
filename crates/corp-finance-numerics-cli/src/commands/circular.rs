use clap::Args;
use rust_decimal::Decimal;
use serde_json::Value;

use corp_finance_numerics::circular::{self, CashInterestInput, CircularConfig};

use super::{decimal_arg, read_structured, SolverArgs};

/// Arguments for one period of the interest / cash / debt loop
#[derive(Args)]
pub struct CashInterestArgs {
    /// Path to JSON input file (overrides individual flags)
    #[arg(long)]
    pub input: Option<String>,

    /// Cash at the start of the period
    #[arg(long, value_parser = decimal_arg)]
    pub beginning_cash: Option<Decimal>,

    /// Debt at the start of the period
    #[arg(long, value_parser = decimal_arg)]
    pub beginning_debt: Option<Decimal>,

    /// Interest rate on average debt
    #[arg(long, value_parser = decimal_arg)]
    pub interest_rate: Option<Decimal>,

    /// Tax rate on positive pre-tax income
    #[arg(long, value_parser = decimal_arg)]
    pub tax_rate: Option<Decimal>,

    /// Operating profit before interest
    #[arg(long, value_parser = decimal_arg, allow_hyphen_values = true)]
    pub ebit: Option<Decimal>,

    /// Contractual repayment due this period
    #[arg(long, value_parser = decimal_arg, default_value = "0")]
    pub scheduled_repayment: Decimal,

    /// Cash floor; shortfalls are drawn as new debt
    #[arg(long, value_parser = decimal_arg, default_value = "0")]
    pub min_cash: Decimal,

    /// Keep excess cash instead of sweeping it into debt paydown
    #[arg(long)]
    pub no_sweep: bool,

    /// Overrides for the fixed-point fallback
    #[command(flatten)]
    pub solver: SolverArgs,
}

pub fn run_cash_interest(args: CashInterestArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let mut loop_input: CashInterestInput = match read_structured(args.input.as_deref())? {
        Some(parsed) => parsed,
        None => CashInterestInput {
            beginning_cash: args
                .beginning_cash
                .ok_or("--beginning-cash is required (or provide --input)")?,
            beginning_debt: args
                .beginning_debt
                .ok_or("--beginning-debt is required (or provide --input)")?,
            scheduled_repayment: args.scheduled_repayment,
            interest_rate: args
                .interest_rate
                .ok_or("--interest-rate is required (or provide --input)")?,
            tax_rate: args.tax_rate.ok_or("--tax-rate is required (or provide --input)")?,
            ebit: args.ebit.ok_or("--ebit is required (or provide --input)")?,
            non_cash_charges: Decimal::ZERO,
            other_cash_flows: Decimal::ZERO,
            dividend_payout_ratio: Decimal::ZERO,
            min_cash_balance: args.min_cash,
            cash_sweep: !args.no_sweep,
            solver: None,
        },
    };

    let base = loop_input.solver.unwrap_or_default();
    if let Some(fixed_point) = args.solver.apply(base.fixed_point) {
        loop_input.solver = Some(CircularConfig {
            newton: base.newton,
            fixed_point,
        });
    }

    let result = circular::resolve_cash_interest(&loop_input)?;
    Ok(serde_json::to_value(result)?)
}
