use serde::de::DeserializeOwned;
use std::fs;
use std::path::{Path, PathBuf};

use corp_finance_numerics::CorpFinanceError;

/// Read a JSON file and deserialise into a typed struct.
///
/// Parse failures come back as `SerializationError` so the CLI reports them
/// with the same reason code as the bindings.
pub fn read_json<T: DeserializeOwned>(path: &str) -> Result<T, Box<dyn std::error::Error>> {
    let canonical = resolve_path(path)?;
    let contents = fs::read_to_string(&canonical)
        .map_err(|e| format!("Failed to read '{}': {}", canonical.display(), e))?;
    serde_json::from_str(&contents).map_err(|e| {
        CorpFinanceError::SerializationError(format!("'{}': {}", canonical.display(), e)).into()
    })
}

fn resolve_path(path: &str) -> Result<PathBuf, Box<dyn std::error::Error>> {
    let p = Path::new(path);
    let canonical = if p.is_absolute() {
        p.to_path_buf()
    } else {
        std::env::current_dir()?.join(p)
    };

    if !canonical.is_file() {
        return Err(format!("Not a readable file: {}", canonical.display()).into());
    }
    Ok(canonical)
}
