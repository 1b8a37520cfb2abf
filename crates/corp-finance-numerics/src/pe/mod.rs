pub mod debt_paydown;
pub mod returns;
