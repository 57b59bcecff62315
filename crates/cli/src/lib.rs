pub mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use saleslens_core::config::{AppConfig, LoadOptions, LogFormat};

use commands::business::NewBusiness;
use commands::promotion::NewPromotion;
use commands::{CommandResult, EXIT_CONFIG};

#[derive(Debug, Parser)]
#[command(
    name = "saleslens",
    about = "SalesLens operator CLI",
    long_about = "Register businesses, ingest sales from CSV uploads or the commerce platform, and inspect product performance and promotion suggestions.",
    after_help = "Examples:\n  saleslens business add --name \"Corner Cafe\" --category cafe\n  saleslens upload --business biz-... march.csv\n  saleslens performance --business biz-..."
)]
pub struct Cli {
    #[arg(long, global = true, help = "Path to a saleslens.toml configuration file")]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations")]
    Migrate,
    #[command(about = "Show effective configuration values with source attribution and redaction")]
    Config,
    #[command(subcommand, about = "Register and connect businesses")]
    Business(BusinessCommand),
    #[command(about = "Ingest a CSV sales file for a business")]
    Upload {
        #[arg(long)]
        business: String,
        file: PathBuf,
    },
    #[command(about = "Pull new orders from the commerce platform")]
    Sync {
        #[arg(long, help = "Sync only this business instead of every connected one")]
        business: Option<String>,
    },
    #[command(about = "Rank products by revenue and classify their trends")]
    Performance {
        #[arg(long)]
        business: String,
    },
    #[command(about = "Daily revenue series for charting")]
    SalesSeries {
        #[arg(long)]
        business: String,
    },
    #[command(about = "Generate and store promotion suggestions")]
    Suggest {
        #[arg(long)]
        business: String,
    },
    #[command(about = "List stored promotion suggestions")]
    Suggestions {
        #[arg(long)]
        business: String,
    },
    #[command(subcommand, about = "Record and list running promotions")]
    Promotion(PromotionCommand),
}

#[derive(Debug, Subcommand)]
enum BusinessCommand {
    Add {
        #[arg(long)]
        name: String,
        #[arg(long)]
        category: Option<String>,
        #[arg(long)]
        target_customers: Option<String>,
        #[arg(long)]
        vibe: Option<String>,
        #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
        utc_offset_minutes: i32,
    },
    List,
    #[command(about = "Store the commerce platform access token for a business")]
    Connect {
        #[arg(long)]
        business: String,
        #[arg(long)]
        token: String,
    },
}

#[derive(Debug, Subcommand)]
enum PromotionCommand {
    Add {
        #[arg(long)]
        business: String,
        #[arg(long)]
        description: String,
        #[arg(long = "product", required = true)]
        products: Vec<String>,
        #[arg(long, help = "First day of the promotion (YYYY-MM-DD)")]
        start: NaiveDate,
        #[arg(long, help = "Last day of the promotion (YYYY-MM-DD); open-ended when omitted")]
        end: Option<NaiveDate>,
    },
    List {
        #[arg(long)]
        business: String,
    },
}

/// Logs go to stderr so stdout carries only the JSON command outcome.
fn init_logging(config: &AppConfig) {
    use tracing::Level;

    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::WARN);
    let builder = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_max_level(log_level);
    let _ = match config.logging.format {
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();
    let result = execute(cli);
    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}

fn execute(cli: Cli) -> CommandResult {
    let options = LoadOptions {
        config_path: cli.config.clone(),
        require_file: cli.config.is_some(),
        ..LoadOptions::default()
    };
    let config = match AppConfig::load(options) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "config",
                "config_validation",
                format!("configuration issue: {error}"),
                EXIT_CONFIG,
            );
        }
    };
    init_logging(&config);

    match cli.command {
        Command::Migrate => commands::migrate::run(&config),
        Command::Config => CommandResult {
            exit_code: 0,
            output: commands::config::run(&config, cli.config.as_deref()),
        },
        Command::Business(BusinessCommand::Add {
            name,
            category,
            target_customers,
            vibe,
            utc_offset_minutes,
        }) => commands::business::add(
            &config,
            NewBusiness { name, category, target_customers, vibe, utc_offset_minutes },
        ),
        Command::Business(BusinessCommand::List) => commands::business::list(&config),
        Command::Business(BusinessCommand::Connect { business, token }) => {
            commands::business::connect(&config, &business, &token)
        }
        Command::Upload { business, file } => commands::upload::run(&config, &business, &file),
        Command::Sync { business } => commands::sync::run(&config, business.as_deref()),
        Command::Performance { business } => commands::report::performance(&config, &business),
        Command::SalesSeries { business } => commands::report::series(&config, &business),
        Command::Suggest { business } => commands::suggest::generate(&config, &business),
        Command::Suggestions { business } => commands::suggest::list(&config, &business),
        Command::Promotion(PromotionCommand::Add {
            business,
            description,
            products,
            start,
            end,
        }) => commands::promotion::add(
            &config,
            &business,
            NewPromotion { description, product_names: products, start_date: start, end_date: end },
        ),
        Command::Promotion(PromotionCommand::List { business }) => {
            commands::promotion::list(&config, &business)
        }
    }
}
