use corp_finance_numerics::circular::ResolutionMethod;
use corp_finance_numerics::three_statement::model::{build_three_statement_model, ThreeStatementInput};
use pretty_assertions::assert_eq;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

const FIVE_YEAR_JSON: &str = r#"{
    "base_revenue": "2000",
    "revenue_growth_rates": ["0.12", "0.10", "0.08", "0.06", "0.05"],
    "cogs_pct": "0.55",
    "sga_pct": "0.12",
    "rnd_pct": "0.03",
    "da_pct": "0.08",
    "interest_rate": "0.07",
    "tax_rate": "0.21",
    "base_cash": 150,
    "base_receivables": 160,
    "base_inventory": 120,
    "base_payables": 90,
    "base_ppe": 900,
    "base_debt": 800,
    "base_equity": 440,
    "dso_days": 30,
    "dio_days": 45,
    "dpo_days": 30,
    "capex_pct": "0.06",
    "debt_repayment_pct": "0.10",
    "dividend_payout_ratio": "0.25",
    "min_cash_balance": 100
}"#;

fn five_year_input() -> ThreeStatementInput {
    serde_json::from_str(FIVE_YEAR_JSON).unwrap()
}

// ===========================================================================
// Linked statements
// ===========================================================================

#[test]
fn test_five_year_model_from_json() {
    let input = five_year_input();
    assert!(input.solver.is_none());

    let result = build_three_statement_model(&input).unwrap();
    let out = &result.result;
    assert_eq!(out.income_statements.len(), 5);
    assert_eq!(out.balance_sheets.len(), 5);
    assert_eq!(out.cash_flow_statements.len(), 5);
    assert_eq!(out.circular_resolution.len(), 5);
    assert_eq!(out.summary.total_years, 5);
}

#[test]
fn test_balance_sheet_balances_every_year() {
    let result = build_three_statement_model(&five_year_input()).unwrap();
    for bs in &result.result.balance_sheets {
        let diff = (bs.total_assets - bs.total_liabilities_and_equity).abs();
        assert!(diff < dec!(0.01), "Year {}: off by {diff}", bs.year);
    }
}

#[test]
fn test_interest_matches_average_debt() {
    let input = five_year_input();
    let result = build_three_statement_model(&input).unwrap();
    let out = &result.result;

    let mut prior_debt = input.base_debt;
    for (is, bs) in out.income_statements.iter().zip(&out.balance_sheets) {
        let implied = (prior_debt + bs.total_debt) / dec!(2) * input.interest_rate;
        assert!(
            (is.interest_expense - implied).abs() < dec!(0.01),
            "Year {}: interest {} vs implied {}",
            is.year,
            is.interest_expense,
            implied
        );
        prior_debt = bs.total_debt;
    }
}

#[test]
fn test_cash_never_below_minimum() {
    let input = five_year_input();
    let result = build_three_statement_model(&input).unwrap();
    for bs in &result.result.balance_sheets {
        assert!(bs.cash >= input.min_cash_balance, "Year {}: cash {}", bs.year, bs.cash);
    }
}

// ===========================================================================
// Summary and diagnostics
// ===========================================================================

#[test]
fn test_summary_ties_to_statements() {
    let result = build_three_statement_model(&five_year_input()).unwrap();
    let out = &result.result;

    let last_bs = out.balance_sheets.last().unwrap();
    assert_eq!(out.summary.ending_debt, last_bs.total_debt);

    let cumulative_fcf: Decimal = out.cash_flow_statements.iter().map(|cf| cf.fcf).sum();
    assert_eq!(out.summary.cumulative_fcf, cumulative_fcf);

    let iterations: u32 = out.circular_resolution.iter().map(|r| r.iterations).sum();
    assert_eq!(out.summary.total_circular_iterations, iterations);
}

#[test]
fn test_resolution_diagnostics_serialise() {
    let result = build_three_statement_model(&five_year_input()).unwrap();
    for r in &result.result.circular_resolution {
        assert_eq!(r.method, ResolutionMethod::NewtonRaphson);
        assert!(r.residual < dec!(0.01));
    }

    let json = serde_json::to_value(&result).unwrap();
    assert_eq!(
        json["result"]["circular_resolution"][0]["method"],
        serde_json::json!("newton_raphson")
    );
}

#[test]
fn test_same_input_same_output() {
    let input = five_year_input();
    let a = serde_json::to_value(build_three_statement_model(&input).unwrap().result).unwrap();
    let b = serde_json::to_value(build_three_statement_model(&input).unwrap().result).unwrap();
    assert_eq!(a, b);
}
