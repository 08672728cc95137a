use anyhow::Result;
use chrono::NaiveDate;
use clap::{CommandFactory, Parser, Subcommand};
use spendly::core::log::init_logging;

#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to optional configuration file
    #[arg(short, long, global = true)]
    config_path: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

impl From<Commands> for spendly::AppCommand {
    fn from(cmd: Commands) -> spendly::AppCommand {
        match cmd {
            Commands::Rate { from, to, date } => spendly::AppCommand::Rate { from, to, date },
            Commands::Convert { amount, from, to } => {
                spendly::AppCommand::Convert { amount, from, to }
            }
            Commands::Refresh => spendly::AppCommand::Refresh,
            Commands::Currencies => spendly::AppCommand::Currencies,
            Commands::Categories => spendly::AppCommand::Categories,
            Commands::Categorize {
                merchant,
                notes,
                user,
            } => spendly::AppCommand::Categorize {
                merchant,
                notes,
                user,
            },
            Commands::Feedback {
                merchant,
                category,
                user,
                rejected,
            } => spendly::AppCommand::Feedback {
                user,
                merchant,
                category,
                accepted: !rejected,
            },
            Commands::Setup => unreachable!("Setup command should be handled separately"),
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Create default configuration
    Setup,
    /// Show the exchange rate between two currencies
    Rate {
        from: String,
        to: String,
        /// Use the stored rate for this day (YYYY-MM-DD)
        #[arg(short, long)]
        date: Option<NaiveDate>,
    },
    /// Convert an amount into one or more currencies
    Convert {
        amount: f64,
        from: String,
        /// Target currencies, defaults to the home currency
        to: Vec<String>,
    },
    /// Fetch and store the latest rates for every currency
    Refresh,
    /// List supported currencies
    Currencies,
    /// List expense categories
    Categories,
    /// Suggest a category for a merchant
    Categorize {
        merchant: String,
        /// Free-form notes passed along to the AI suggestion
        #[arg(short, long)]
        notes: Option<String>,
        /// Use this user's learned preferences
        #[arg(short, long)]
        user: Option<String>,
    },
    /// Record whether a suggested category was right
    Feedback {
        merchant: String,
        /// Category id the user settled on
        category: String,
        #[arg(short, long)]
        user: String,
        /// The suggestion was wrong and the user picked `category` instead
        #[arg(short, long)]
        rejected: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    let result = match cli.command {
        Some(Commands::Setup) => match cli.config_path.as_deref() {
            Some(path) => spendly::cli::setup::setup_at_path(path),
            None => spendly::cli::setup::setup(),
        },
        Some(cmd) => spendly::run_command(cmd.into(), cli.config_path.as_deref()).await,
        None => {
            Cli::command().print_help()?;
            Ok(())
        }
    };

    if let Err(e) = &result {
        tracing::error!(error = %e, "Application failed");
    }
    result
}
