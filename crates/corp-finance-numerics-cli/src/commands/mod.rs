pub mod cash_flows;
pub mod circular;
pub mod pe;
pub mod three_statement;

use clap::Args;
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;

use corp_finance_numerics::decimal::parse_decimal;
use corp_finance_numerics::solvers::{SolverConfig, Tolerance};
use corp_finance_numerics::CorpFinanceError;

use crate::input;

/// Accepts `12.5`, `-3` and `1e-6` forms.
pub fn decimal_arg(s: &str) -> Result<Decimal, String> {
    parse_decimal("argument", s).map_err(|e| e.to_string())
}

/// Solver overrides shared by every iterative command.
#[derive(Args, Debug, Clone, Default)]
pub struct SolverArgs {
    /// Absolute convergence tolerance
    #[arg(long, value_parser = decimal_arg)]
    pub tolerance: Option<Decimal>,

    /// Iteration cap
    #[arg(long)]
    pub max_iterations: Option<u32>,
}

impl SolverArgs {
    /// `None` when no flag was given, so the command keeps its own preset.
    pub fn apply(&self, preset: SolverConfig) -> Option<SolverConfig> {
        if self.tolerance.is_none() && self.max_iterations.is_none() {
            return None;
        }
        let mut config = preset;
        if let Some(tol) = self.tolerance {
            config = config.with_tolerance(Tolerance::Absolute(tol));
        }
        if let Some(cap) = self.max_iterations {
            config = config.with_max_iterations(cap);
        }
        Some(config)
    }
}

/// `--input` file first, then piped stdin.
pub fn read_structured<T: DeserializeOwned>(
    path: Option<&str>,
) -> Result<Option<T>, Box<dyn std::error::Error>> {
    if let Some(path) = path {
        return Ok(Some(input::file::read_json(path)?));
    }
    match input::stdin::read_stdin()? {
        Some(data) => Ok(Some(
            serde_json::from_value(data).map_err(CorpFinanceError::from)?,
        )),
        None => Ok(None),
    }
}
