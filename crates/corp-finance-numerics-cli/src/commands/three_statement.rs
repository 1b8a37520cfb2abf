use clap::Args;
use serde_json::Value;

use corp_finance_numerics::circular::CircularConfig;
use corp_finance_numerics::three_statement::model::{self, ThreeStatementInput};

use super::{read_structured, SolverArgs};

/// Arguments for the linked three-statement model
#[derive(Args)]
pub struct ThreeStatementArgs {
    /// Path to JSON input file
    #[arg(long)]
    pub input: Option<String>,

    /// Overrides for the per-year fixed-point fallback
    #[command(flatten)]
    pub solver: SolverArgs,
}

pub fn run_three_statement(args: ThreeStatementArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let mut model_input: ThreeStatementInput = read_structured(args.input.as_deref())?
        .ok_or("--input <file.json> or stdin required for the three-statement model")?;

    let base = model_input.solver.unwrap_or_default();
    if let Some(fixed_point) = args.solver.apply(base.fixed_point) {
        model_input.solver = Some(CircularConfig {
            newton: base.newton,
            fixed_point,
        });
    }

    let result = model::build_three_statement_model(&model_input)?;
    Ok(serde_json::to_value(result)?)
}
