use clap::Args;
use rust_decimal::Decimal;
use serde_json::Value;

use corp_finance_numerics::pe::debt_paydown::{self, DebtPaydownInput};
use corp_finance_numerics::pe::returns::{self, ReturnsInput};
use corp_finance_numerics::solvers::SolverConfig;

use super::{decimal_arg, read_structured, SolverArgs};

/// Arguments for PE returns calculation
#[derive(Args)]
pub struct ReturnsArgs {
    /// Path to JSON input file (overrides individual flags)
    #[arg(long)]
    pub input: Option<String>,

    /// Equity invested at entry
    #[arg(long, value_parser = decimal_arg)]
    pub entry_equity: Option<Decimal>,

    /// Equity received at exit
    #[arg(long, value_parser = decimal_arg)]
    pub exit_equity: Option<Decimal>,

    /// Holding period in years
    #[arg(long, value_parser = decimal_arg)]
    pub holding_years: Option<Decimal>,

    /// Periodic cash flows (comma-separated, e.g. "-100,30,30,130")
    #[arg(long, value_delimiter = ',', value_parser = decimal_arg, allow_hyphen_values = true)]
    pub cash_flows: Option<Vec<Decimal>>,

    /// Starting rate for the IRR search
    #[arg(long, value_parser = decimal_arg, allow_hyphen_values = true, default_value = "0.10")]
    pub guess: Decimal,

    #[command(flatten)]
    pub solver: SolverArgs,
}

pub fn run_returns(args: ReturnsArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let mut returns_input: ReturnsInput = match read_structured(args.input.as_deref())? {
        Some(parsed) => parsed,
        None => {
            let entry = args
                .entry_equity
                .ok_or("--entry-equity is required (or provide --input)")?;
            let exit = args
                .exit_equity
                .ok_or("--exit-equity is required (or provide --input)")?;

            ReturnsInput {
                cash_flows: args.cash_flows.unwrap_or_default(),
                dated_cash_flows: None,
                entry_equity: entry,
                exit_equity: exit,
                holding_period_years: args.holding_years,
                dates: None,
                initial_guess: args.guess,
                solver: None,
            }
        }
    };
    if let Some(config) = args
        .solver
        .apply(returns_input.solver.unwrap_or_else(SolverConfig::irr))
    {
        returns_input.solver = Some(config);
    }

    let result = returns::calculate_returns(&returns_input)?;
    Ok(serde_json::to_value(result)?)
}

/// Arguments for the LBO debt paydown projection
#[derive(Args)]
pub struct DebtPaydownArgs {
    /// Path to JSON input file
    #[arg(long)]
    pub input: Option<String>,
}

pub fn run_debt_paydown(args: DebtPaydownArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let paydown_input: DebtPaydownInput = read_structured(args.input.as_deref())?
        .ok_or("--input <file.json> or stdin required for debt paydown")?;
    let result = debt_paydown::build_debt_paydown(&paydown_input)?;
    Ok(serde_json::to_value(result)?)
}
