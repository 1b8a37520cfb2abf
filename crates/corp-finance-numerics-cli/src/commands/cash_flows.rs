use chrono::NaiveDate;
use clap::Args;
use rust_decimal::Decimal;
use serde_json::Value;

use corp_finance_numerics::cash_flow_analysis::{
    self, IrrInput, MoicInput, NpvInput, XirrInput,
};
use corp_finance_numerics::solvers::SolverConfig;
use corp_finance_numerics::types::CashFlow;
use corp_finance_numerics::CorpFinanceError;

use super::{decimal_arg, read_structured, SolverArgs};

/// Arguments for NPV
#[derive(Args)]
pub struct NpvArgs {
    /// Path to JSON input file (overrides individual flags)
    #[arg(long)]
    pub input: Option<String>,

    /// Discount rate per period (e.g. 0.10)
    #[arg(long, value_parser = decimal_arg, allow_hyphen_values = true)]
    pub rate: Option<Decimal>,

    /// Periodic cash flows (comma-separated, e.g. "-1000,300,400,500")
    #[arg(long, value_delimiter = ',', value_parser = decimal_arg, allow_hyphen_values = true)]
    pub cash_flows: Option<Vec<Decimal>>,
}

pub fn run_npv(args: NpvArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let npv_input: NpvInput = match read_structured(args.input.as_deref())? {
        Some(parsed) => parsed,
        None => NpvInput {
            cash_flows: args
                .cash_flows
                .ok_or("--cash-flows is required (or provide --input)")?,
            discount_rate: args.rate.ok_or("--rate is required (or provide --input)")?,
        },
    };
    let result = cash_flow_analysis::calculate_npv(&npv_input)?;
    Ok(serde_json::to_value(result)?)
}

/// Arguments for IRR
#[derive(Args)]
pub struct IrrArgs {
    /// Path to JSON input file (overrides individual flags)
    #[arg(long)]
    pub input: Option<String>,

    /// Periodic cash flows (comma-separated, index 0 undiscounted)
    #[arg(long, value_delimiter = ',', value_parser = decimal_arg, allow_hyphen_values = true)]
    pub cash_flows: Option<Vec<Decimal>>,

    /// Starting rate for the search
    #[arg(long, value_parser = decimal_arg, allow_hyphen_values = true, default_value = "0.10")]
    pub guess: Decimal,

    #[command(flatten)]
    pub solver: SolverArgs,
}

pub fn run_irr(args: IrrArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let mut irr_input: IrrInput = match read_structured(args.input.as_deref())? {
        Some(parsed) => parsed,
        None => IrrInput {
            cash_flows: args
                .cash_flows
                .ok_or("--cash-flows is required (or provide --input)")?,
            initial_guess: args.guess,
            solver: None,
        },
    };
    if let Some(config) = args.solver.apply(irr_input.solver.unwrap_or_else(SolverConfig::irr)) {
        irr_input.solver = Some(config);
    }
    let result = cash_flow_analysis::calculate_irr(&irr_input)?;
    Ok(serde_json::to_value(result)?)
}

/// Arguments for XIRR
#[derive(Args)]
pub struct XirrArgs {
    /// Path to JSON input file (overrides individual flags)
    #[arg(long)]
    pub input: Option<String>,

    /// Cash flow dates (comma-separated, YYYY-MM-DD)
    #[arg(long, value_delimiter = ',')]
    pub dates: Option<Vec<NaiveDate>>,

    /// Cash flow amounts, one per date
    #[arg(long, value_delimiter = ',', value_parser = decimal_arg, allow_hyphen_values = true)]
    pub amounts: Option<Vec<Decimal>>,

    /// Starting rate for the search
    #[arg(long, value_parser = decimal_arg, allow_hyphen_values = true, default_value = "0.10")]
    pub guess: Decimal,

    #[command(flatten)]
    pub solver: SolverArgs,
}

pub fn run_xirr(args: XirrArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let mut xirr_input: XirrInput = match read_structured(args.input.as_deref())? {
        Some(parsed) => parsed,
        None => {
            let dates = args.dates.ok_or("--dates is required (or provide --input)")?;
            let amounts = args
                .amounts
                .ok_or("--amounts is required (or provide --input)")?;
            if dates.len() != amounts.len() {
                return Err(Box::new(CorpFinanceError::invalid(
                    "amounts",
                    format!("{} dates but {} amounts", dates.len(), amounts.len()),
                )));
            }
            XirrInput {
                cash_flows: dates
                    .into_iter()
                    .zip(amounts)
                    .map(|(date, amount)| CashFlow::new(date, amount))
                    .collect(),
                initial_guess: args.guess,
                solver: None,
            }
        }
    };
    if let Some(config) = args
        .solver
        .apply(xirr_input.solver.unwrap_or_else(SolverConfig::irr))
    {
        xirr_input.solver = Some(config);
    }
    let result = cash_flow_analysis::calculate_xirr(&xirr_input)?;
    Ok(serde_json::to_value(result)?)
}

/// Arguments for MOIC
#[derive(Args)]
pub struct MoicArgs {
    /// Path to JSON input file (overrides individual flags)
    #[arg(long)]
    pub input: Option<String>,

    /// Capital invested
    #[arg(long, value_parser = decimal_arg)]
    pub invested: Option<Decimal>,

    /// Value realised
    #[arg(long, value_parser = decimal_arg)]
    pub realized: Option<Decimal>,

    /// Holding period in years, for the approximate annual return
    #[arg(long, value_parser = decimal_arg)]
    pub years: Option<Decimal>,
}

pub fn run_moic(args: MoicArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let moic_input: MoicInput = match read_structured(args.input.as_deref())? {
        Some(parsed) => parsed,
        None => MoicInput {
            invested_capital: args
                .invested
                .ok_or("--invested is required (or provide --input)")?,
            realized_value: args
                .realized
                .ok_or("--realized is required (or provide --input)")?,
            holding_period_years: args.years,
        },
    };
    let result = cash_flow_analysis::calculate_moic(&moic_input)?;
    Ok(serde_json::to_value(result)?)
}
