use corp_finance_numerics::circular::{
    resolve_cash_interest, solve_cash_interest_circular, solve_circular, solve_circular_newton,
    CashInterestInput, CircularConfig, CircularState, ResolutionMethod,
};
use corp_finance_numerics::solvers::{FailureReason, Outcome, SolverConfig, Tolerance};
use corp_finance_numerics::CorpFinanceError;
use pretty_assertions::assert_eq;
use proptest::prelude::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

fn sweep_input() -> CashInterestInput {
    CashInterestInput {
        beginning_cash: dec!(100),
        beginning_debt: dec!(500),
        scheduled_repayment: dec!(25),
        interest_rate: dec!(0.10),
        tax_rate: dec!(0.25),
        ebit: dec!(200),
        non_cash_charges: dec!(30),
        other_cash_flows: dec!(-60),
        dividend_payout_ratio: Decimal::ZERO,
        min_cash_balance: dec!(50),
        cash_sweep: true,
        solver: None,
    }
}

// ===========================================================================
// Generic state solver
// ===========================================================================

#[test]
fn test_two_variable_system_resolves() {
    // a = 0.2b + 10, b = 0.5a + 4  ->  a = 11.7647..., b = 9.8823...
    let initial = CircularState::new(
        vec!["a".into(), "b".into()],
        vec![Decimal::ZERO, Decimal::ZERO],
    )
    .unwrap();
    let config = SolverConfig::fixed_point().with_tolerance(Tolerance::Absolute(dec!(0.0000001)));
    let outcome = solve_circular(
        initial,
        |s| {
            let a = s.get("a").unwrap_or_default();
            let b = s.get("b").unwrap_or_default();
            Ok(vec![dec!(0.2) * b + dec!(10), dec!(0.5) * a + dec!(4)])
        },
        &config,
    )
    .unwrap();

    let state = outcome.value().expect("contracting system should converge");
    assert_eq!(state.labels(), &["a".to_string(), "b".to_string()]);
    assert!((state.get("a").unwrap() - dec!(11.7647059)).abs() < dec!(0.000001));
    assert!((state.get("b").unwrap() - dec!(9.8823529)).abs() < dec!(0.000001));
}

#[test]
fn test_update_errors_propagate() {
    let result = solve_circular(
        CircularState::from_values(vec![dec!(1)]),
        |_| Err(CorpFinanceError::invalid("x", "undefined")),
        &SolverConfig::fixed_point(),
    );
    assert!(matches!(result, Err(CorpFinanceError::InvalidInput { .. })));
}

#[test]
fn test_zero_iteration_cap_rejected() {
    let config = SolverConfig::fixed_point().with_max_iterations(0);
    let err = solve_circular(
        CircularState::from_values(vec![dec!(1)]),
        |s| Ok(s.values().to_vec()),
        &config,
    )
    .unwrap_err();
    assert_eq!(err.reason_code(), "InvalidInput");
}

#[test]
fn test_cap_reached_reports_iterations() {
    let outcome = solve_circular(
        CircularState::from_values(vec![dec!(1)]),
        |s| Ok(vec![s.values()[0] + dec!(1)]),
        &SolverConfig::fixed_point().with_max_iterations(7),
    )
    .unwrap();
    match outcome {
        Outcome::Failed {
            reason, iterations, ..
        } => {
            assert_eq!(reason, FailureReason::NoConvergence);
            assert_eq!(iterations, 7);
        }
        Outcome::Converged { .. } => panic!("x = x + 1 cannot converge"),
    }
}

#[test]
fn test_newton_nonlinear_scalar() {
    // x = sqrt(x + 6)  ->  3, f'(x) = 1 / (2 sqrt(x + 6))
    let sqrt = |x: Decimal| rust_decimal::MathematicalOps::sqrt(&(x + dec!(6)));
    let outcome = solve_circular_newton(
        dec!(10),
        |x| sqrt(x).ok_or_else(|| CorpFinanceError::invalid("x", "negative radicand")),
        |x| sqrt(x).map(|s| Decimal::ONE / (dec!(2) * s)),
        &CircularConfig::default(),
    )
    .unwrap();
    let x = *outcome.value().unwrap();
    assert!((x - dec!(3)).abs() < dec!(0.02), "got {x}");
}

// ===========================================================================
// Interest / cash / debt loop
// ===========================================================================

#[test]
fn test_sweep_closed_form() {
    // Linear on the sweep branch: I = 41.5 + 0.0375 I
    let out = resolve_cash_interest(&sweep_input()).unwrap();
    let r = &out.result.resolution;
    assert_eq!(out.result.method, ResolutionMethod::NewtonRaphson);
    assert!((r.interest_expense - dec!(43.1168831)).abs() < dec!(0.00001));
    assert!((r.ending_debt - dec!(362.3376623)).abs() < dec!(0.00001));
    assert_eq!(r.ending_cash, dec!(50));
    assert_eq!(r.scheduled_repayment, dec!(25));
    assert_eq!(r.debt_draw, Decimal::ZERO);
    assert_eq!(r.debt_draw_or_paydown, -r.debt_paydown);
    assert!(out.warnings.is_empty());
}

#[test]
fn test_resolution_is_internally_consistent() {
    let input = sweep_input();
    let r = resolve_cash_interest(&input).unwrap().result.resolution;

    assert_eq!(r.ebt, input.ebit - r.interest_expense);
    assert_eq!(r.net_income, r.ebt - r.taxes);
    assert_eq!(
        r.preliminary_cash,
        input.beginning_cash + r.net_income + input.non_cash_charges + input.other_cash_flows
            - r.scheduled_repayment
            - r.dividends
    );
    assert_eq!(r.ending_cash, r.preliminary_cash + r.debt_draw_or_paydown);
    assert_eq!(
        r.ending_debt,
        input.beginning_debt - r.scheduled_repayment + r.debt_draw_or_paydown
    );
}

#[test]
fn test_scheduled_repayment_capped_at_debt() {
    let mut input = sweep_input();
    input.beginning_debt = dec!(10);
    input.scheduled_repayment = dec!(25);
    let r = resolve_cash_interest(&input).unwrap().result.resolution;
    assert_eq!(r.scheduled_repayment, dec!(10));
    assert_eq!(r.ending_debt, Decimal::ZERO);
    // Interest only accrues on the opening balance: (10 + 0) / 2 * 10%
    assert_eq!(r.interest_expense, dec!(0.5));
}

#[test]
fn test_dividends_reduce_sweep() {
    let mut with_payout = sweep_input();
    with_payout.dividend_payout_ratio = dec!(0.5);
    let base = resolve_cash_interest(&sweep_input()).unwrap().result.resolution;
    let paid = resolve_cash_interest(&with_payout).unwrap().result.resolution;
    assert!(paid.dividends > Decimal::ZERO);
    assert!(paid.debt_paydown < base.debt_paydown);
    assert!(paid.interest_expense > base.interest_expense);
}

#[test]
fn test_loss_making_period_warns() {
    let mut input = sweep_input();
    input.ebit = dec!(-50);
    let out = resolve_cash_interest(&input).unwrap();
    let r = &out.result.resolution;
    assert_eq!(r.taxes, Decimal::ZERO);
    assert!(r.debt_draw > Decimal::ZERO);
    assert!(out.warnings.iter().any(|w| w.contains("negative")));
    assert!(out.warnings.iter().any(|w| w.contains("new debt")));
}

#[test]
fn test_non_convergence_is_an_error() {
    let mut input = sweep_input();
    input.solver = Some(CircularConfig {
        newton: SolverConfig::newton().with_max_iterations(1),
        fixed_point: SolverConfig::fixed_point()
            .with_tolerance(Tolerance::Absolute(dec!(0.0000000001)))
            .with_max_iterations(1),
    });
    let err = resolve_cash_interest(&input).unwrap_err();
    assert_eq!(err.reason_code(), "NoConvergence");
    assert!(matches!(err, CorpFinanceError::ConvergenceFailure { .. }));
}

#[test]
fn test_solutions_repeat_exactly() {
    let input = sweep_input();
    let a = solve_cash_interest_circular(&input, &CircularConfig::default()).unwrap();
    let b = solve_cash_interest_circular(&input, &CircularConfig::default()).unwrap();
    assert_eq!(a, b);
}

#[test]
fn test_state_vector_labels() {
    let r = resolve_cash_interest(&sweep_input()).unwrap().result.resolution;
    let state = r.to_state();
    assert_eq!(state.len(), 5);
    assert_eq!(state.get("interest_expense"), Some(r.interest_expense));
    assert_eq!(state.get("ending_debt"), Some(r.ending_debt));
    assert_eq!(state.get("debt_draw_or_paydown"), Some(r.debt_draw_or_paydown));
}

#[test]
fn test_json_input_with_defaults() {
    let json = r#"{
        "beginning_cash": 100,
        "beginning_debt": "500",
        "interest_rate": "0.08",
        "tax_rate": "0.25",
        "ebit": 150
    }"#;
    let input: CashInterestInput = serde_json::from_str(json).unwrap();
    assert!(input.cash_sweep);
    assert_eq!(input.min_cash_balance, Decimal::ZERO);
    assert!(input.solver.is_none());

    let r = resolve_cash_interest(&input).unwrap().result.resolution;
    assert_eq!(r.ending_cash, Decimal::ZERO);
    assert!(r.ending_debt < dec!(500));
}

// ===========================================================================
// Properties
// ===========================================================================

proptest! {
    #[test]
    fn prop_contraction_converges_from_any_start(start in -1_000_000i64..1_000_000) {
        let outcome = solve_circular(
            CircularState::from_values(vec![Decimal::from(start)]),
            |s| Ok(vec![dec!(0.5) * s.values()[0] + dec!(10)]),
            &SolverConfig::fixed_point(),
        )
        .unwrap();
        let x = outcome.value().unwrap().values()[0];
        prop_assert!((x - dec!(20)).abs() < dec!(0.02));
    }

    #[test]
    fn prop_cash_interest_consistent(
        ebit in 0i64..400,
        other in -300i64..100,
        debt in 0i64..1000,
    ) {
        let mut input = sweep_input();
        input.ebit = Decimal::from(ebit);
        input.other_cash_flows = Decimal::from(other);
        input.beginning_debt = Decimal::from(debt);
        let out = resolve_cash_interest(&input).unwrap();
        let r = out.result.resolution;
        let implied = (input.beginning_debt + r.ending_debt) / dec!(2) * input.interest_rate;
        prop_assert!((implied - r.interest_expense).abs() < dec!(0.01));
        prop_assert!(r.ending_cash >= input.min_cash_balance);
        prop_assert!(r.ending_debt >= Decimal::ZERO);
    }
}
