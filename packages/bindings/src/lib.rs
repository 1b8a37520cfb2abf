use napi::Result as NapiResult;
use napi_derive::napi;
use serde::de::DeserializeOwned;
use serde::Serialize;

use corp_finance_numerics::{CorpFinanceError, CorpFinanceResult};

/// The napi error reason is the JSON `{"code", "message"}` report, so callers
/// can branch on the stable reason code.
fn to_napi_error(e: CorpFinanceError) -> napi::Error {
    let report = e.to_report();
    let reason = serde_json::to_string(&report).unwrap_or(report.message);
    napi::Error::from_reason(reason)
}

/// Parse the JSON input, run the computation and serialise the envelope.
fn call_json<I, O, F>(input_json: &str, compute: F) -> NapiResult<String>
where
    I: DeserializeOwned,
    O: Serialize,
    F: FnOnce(&I) -> CorpFinanceResult<O>,
{
    let input: I = serde_json::from_str(input_json)
        .map_err(|e| to_napi_error(CorpFinanceError::from(e)))?;
    let output = compute(&input).map_err(to_napi_error)?;
    serde_json::to_string(&output).map_err(|e| to_napi_error(CorpFinanceError::from(e)))
}

// ---------------------------------------------------------------------------
// Cash flow analysis
// ---------------------------------------------------------------------------

#[napi]
pub fn calculate_npv(input_json: String) -> NapiResult<String> {
    call_json(&input_json, corp_finance_numerics::cash_flow_analysis::calculate_npv)
}

#[napi]
pub fn calculate_irr(input_json: String) -> NapiResult<String> {
    call_json(&input_json, corp_finance_numerics::cash_flow_analysis::calculate_irr)
}

#[napi]
pub fn calculate_xirr(input_json: String) -> NapiResult<String> {
    call_json(&input_json, corp_finance_numerics::cash_flow_analysis::calculate_xirr)
}

#[napi]
pub fn calculate_moic(input_json: String) -> NapiResult<String> {
    call_json(&input_json, corp_finance_numerics::cash_flow_analysis::calculate_moic)
}

// ---------------------------------------------------------------------------
// Circular references
// ---------------------------------------------------------------------------

#[napi]
pub fn resolve_cash_interest(input_json: String) -> NapiResult<String> {
    call_json(&input_json, corp_finance_numerics::circular::resolve_cash_interest)
}

#[napi]
pub fn build_three_statement(input_json: String) -> NapiResult<String> {
    call_json(
        &input_json,
        corp_finance_numerics::three_statement::model::build_three_statement_model,
    )
}

// ---------------------------------------------------------------------------
// Private Equity
// ---------------------------------------------------------------------------

#[napi]
pub fn calculate_returns(input_json: String) -> NapiResult<String> {
    call_json(&input_json, corp_finance_numerics::pe::returns::calculate_returns)
}

#[napi]
pub fn build_debt_paydown(input_json: String) -> NapiResult<String> {
    call_json(&input_json, corp_finance_numerics::pe::debt_paydown::build_debt_paydown)
}
