//! Rates CLI
//!
//! One-shot lookups and diagnostics against the live source chain.

use anyhow::Result;
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use rust_decimal::Decimal;
use serde::Serialize;

use rates_app::{Config, build_daemon_service, build_service, init_tracing};
use rates_engine::{DEFAULT_FROM, DEFAULT_TO, Resolution};

#[derive(Parser)]
#[command(name = "rates")]
#[command(author, version, about = "Currency rate engine CLI", long_about = None)]
struct Cli {
    /// Log filter used when RUST_LOG is unset
    #[arg(long, env = "RATES_CLI_LOG", default_value = "warn")]
    log: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct PairArgs {
    /// Base currency
    #[arg(long, default_value = DEFAULT_FROM)]
    from: String,
    /// Quote currency
    #[arg(long, default_value = DEFAULT_TO)]
    to: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Current rate for a pair
    Current {
        #[command(flatten)]
        pair: PairArgs,
    },
    /// Rate on a past date (YYYY-MM-DD)
    Historical {
        date: NaiveDate,
        #[command(flatten)]
        pair: PairArgs,
    },
    /// Average rate over a calendar month
    Monthly {
        year: i32,
        #[arg(value_parser = clap::value_parser!(u32).range(1..=12))]
        month: u32,
        #[command(flatten)]
        pair: PairArgs,
    },
    /// Test-fetch USD/TRY from every source
    Status,
    /// Cache and session pool counters
    Stats,
    /// Clear caches and refresh the tracked currencies
    Refresh,
}

#[derive(Serialize)]
struct RateOutput {
    from: String,
    to: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    date: Option<NaiveDate>,
    rate: Decimal,
    origin: String,
    degraded: bool,
}

impl RateOutput {
    fn new(pair: &PairArgs, date: Option<NaiveDate>, resolution: Resolution) -> Self {
        Self {
            from: pair.from.to_uppercase(),
            to: pair.to.to_uppercase(),
            date,
            rate: resolution.rate,
            degraded: !resolution.origin.is_live(),
            origin: resolution.origin.label(),
        }
    }
}

#[derive(Serialize)]
struct MonthlyOutput {
    from: String,
    to: String,
    year: i32,
    month: u32,
    average: Decimal,
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let config = Config::from_env()?;
    init_tracing(config.log_format, &cli.log);

    match cli.command {
        Commands::Current { pair } => {
            let service = build_service(&config);
            let resolution = service.resolve(&pair.from, &pair.to, None).await;
            print_json(&RateOutput::new(&pair, None, resolution))?;
        }

        Commands::Historical { date, pair } => {
            let service = build_service(&config);
            let resolution = service.resolve(&pair.from, &pair.to, Some(date)).await;
            print_json(&RateOutput::new(&pair, Some(date), resolution))?;
        }

        Commands::Monthly { year, month, pair } => {
            let service = build_service(&config);
            let average = service
                .get_monthly_average_rate(year, month, &pair.from, &pair.to)
                .await;
            print_json(&MonthlyOutput {
                from: pair.from.to_uppercase(),
                to: pair.to.to_uppercase(),
                year,
                month,
                average,
            })?;
        }

        Commands::Status => {
            let service = build_service(&config);
            let status = service.get_provider_status().await;
            print_json(&status)?;
            if !status.values().any(|healthy| *healthy) {
                eprintln!("✗ No source is reachable");
                std::process::exit(1);
            }
        }

        Commands::Stats => {
            let service = build_service(&config);
            print_json(&service.get_detailed_stats())?;
        }

        Commands::Refresh => {
            let service = build_daemon_service(&config);
            if service.force_update().await {
                println!("✓ All tracked currencies refreshed from live sources");
            } else {
                println!("✗ Some tracked currencies fell back to cached or static rates");
                std::process::exit(1);
            }
        }
    }

    Ok(())
}
