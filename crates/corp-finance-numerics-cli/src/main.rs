mod commands;
mod input;
mod output;

use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use std::process;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use corp_finance_numerics::CorpFinanceError;

use commands::cash_flows::{IrrArgs, MoicArgs, NpvArgs, XirrArgs};
use commands::circular::CashInterestArgs;
use commands::pe::{DebtPaydownArgs, ReturnsArgs};
use commands::three_statement::ThreeStatementArgs;

/// Decimal-exact corporate finance numerics
#[derive(Parser)]
#[command(
    name = "cfn",
    version,
    about = "Decimal-exact IRR, XIRR, MOIC and circular-reference calculations",
    long_about = "A CLI for corporate finance numerics in 128-bit decimal arithmetic. \
                  Supports NPV, IRR, XIRR, MOIC, the interest/cash/debt circular \
                  reference, linked three-statement projections, PE returns and LBO \
                  debt paydown. Iterative results report how they converged."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format
    #[arg(long, default_value = "json", global = true)]
    output: OutputFormat,

    /// Log solver progress to stderr (-v debug, -vv trace); RUST_LOG overrides
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Net present value of periodic cash flows
    Npv(NpvArgs),
    /// Internal rate of return of periodic cash flows
    Irr(IrrArgs),
    /// Internal rate of return of dated cash flows
    Xirr(XirrArgs),
    /// Multiple on invested capital and its approximate annual return
    Moic(MoicArgs),
    /// Resolve one period of the interest / cash / debt circular reference
    CashInterest(CashInterestArgs),
    /// Build a linked three-statement projection
    ThreeStatement(ThreeStatementArgs),
    /// Calculate PE fund returns (IRR, XIRR, MOIC, Cash-on-Cash)
    Returns(ReturnsArgs),
    /// Project LBO debt paydown and sponsor returns
    DebtPaydown(DebtPaydownArgs),
    /// Print version information
    Version,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Csv,
    Minimal,
}

fn init_tracing(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "corp_finance_numerics=debug",
        _ => "corp_finance_numerics=trace",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result: Result<serde_json::Value, Box<dyn std::error::Error>> = match cli.command {
        Commands::Npv(args) => commands::cash_flows::run_npv(args),
        Commands::Irr(args) => commands::cash_flows::run_irr(args),
        Commands::Xirr(args) => commands::cash_flows::run_xirr(args),
        Commands::Moic(args) => commands::cash_flows::run_moic(args),
        Commands::CashInterest(args) => commands::circular::run_cash_interest(args),
        Commands::ThreeStatement(args) => commands::three_statement::run_three_statement(args),
        Commands::Returns(args) => commands::pe::run_returns(args),
        Commands::DebtPaydown(args) => commands::pe::run_debt_paydown(args),
        Commands::Version => {
            println!("cfn {}", env!("CARGO_PKG_VERSION"));
            return;
        }
    };

    match result {
        Ok(value) => {
            output::format_output(&cli.output, &value);
            process::exit(0);
        }
        Err(e) => {
            match e.downcast_ref::<CorpFinanceError>() {
                Some(err) => {
                    let report = err.to_report();
                    eprintln!(
                        "{}[{}]: {}",
                        "error".red().bold(),
                        report.code.yellow(),
                        report.message
                    );
                }
                None => eprintln!("{}: {}", "error".red().bold(), e),
            }
            process::exit(1);
        }
    }
}
