use serde_json::Value;
use std::io::{self, Read};

use corp_finance_numerics::CorpFinanceError;

/// Read piped JSON from stdin. `None` when stdin is a TTY or empty.
pub fn read_stdin() -> Result<Option<Value>, Box<dyn std::error::Error>> {
    if atty::is(atty::Stream::Stdin) {
        return Ok(None);
    }

    let mut buffer = String::new();
    io::stdin().read_to_string(&mut buffer)?;

    let trimmed = buffer.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }

    let value: Value = serde_json::from_str(trimmed)
        .map_err(|e| CorpFinanceError::SerializationError(format!("stdin: {e}")))?;
    Ok(Some(value))
}
