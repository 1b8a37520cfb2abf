use serde_json::Value;

/// Headline fields, most specific first. Nested paths are dot-separated.
const PRIORITY_KEYS: [&str; 9] = [
    "irr",
    "xirr",
    "npv",
    "moic",
    "resolution.interest_expense",
    "exit_equity_value",
    "summary.ending_debt",
    "approximate_irr",
    "sponsor_irr.value",
];

/// Print just the key answer value from the output.
pub fn print_minimal(value: &Value) {
    let result_obj = value
        .as_object()
        .and_then(|m| m.get("result"))
        .unwrap_or(value);

    if result_obj.is_object() {
        for key in PRIORITY_KEYS {
            if let Some(val) = lookup(result_obj, key).filter(|v| !v.is_null()) {
                println!("{}", format_minimal(val));
                return;
            }
        }

        if let Some((key, val)) = result_obj.as_object().and_then(|m| m.iter().next()) {
            println!("{}: {}", key, format_minimal(val));
            return;
        }
    }

    println!("{}", format_minimal(result_obj));
}

fn lookup<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(value, |current, key| current.get(key))
}

fn format_minimal(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => "null".to_string(),
        _ => serde_json::to_string(value).unwrap_or_default(),
    }
}
