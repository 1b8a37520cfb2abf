pub mod cash_flow_analysis;
pub mod circular;
pub mod decimal;
pub mod error;
pub mod solvers;
pub mod time_value;
pub mod types;

#[cfg(feature = "pe")]
pub mod pe;

#[cfg(feature = "three_statement")]
pub mod three_statement;

pub use error::CorpFinanceError;
pub use types::*;

/// Standard result type for all corp-finance operations
pub type CorpFinanceResult<T> = Result<T, CorpFinanceError>;
