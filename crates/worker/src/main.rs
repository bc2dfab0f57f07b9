use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use stockfolio_core::domain::instrument::{RiskTier, Strategy};
use stockfolio_core::optimizer::OptimizerPolicy;

mod jobs;

#[derive(Debug, Parser)]
#[command(name = "stockfolio_worker")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Upsert the built-in sample catalogue.
    Seed {
        /// Do everything except writing to the database.
        #[arg(long)]
        dry_run: bool,
    },
    /// Refetch provider quotes regardless of cache age.
    Refresh {
        /// Comma-separated symbols. Defaults to the whole catalogue.
        #[arg(long, value_delimiter = ',')]
        symbols: Vec<String>,

        /// Fetch and log quotes without writing to the database.
        #[arg(long)]
        dry_run: bool,
    },
    /// Run the allocation engine against the sample table and print the result as JSON.
    Optimize {
        #[arg(long)]
        budget: f64,

        #[arg(long, default_value_t = RiskTier::Medium)]
        risk: RiskTier,

        #[arg(long, default_value_t = Strategy::Greedy)]
        strategy: Strategy,

        /// Comma-separated sample symbols. Defaults to the whole sample table.
        #[arg(long, value_delimiter = ',')]
        symbols: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = stockfolio_core::config::Settings::from_env()?;
    let _sentry_guard = init_sentry(&settings);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer())
        .init();

    let args = Args::parse();

    let res = run(args.command, &settings).await;
    if let Err(err) = &res {
        sentry_anyhow::capture_anyhow(err);
        tracing::error!(error = %format!("{err:#}"), "worker command failed");
    }
    res
}

async fn run(
    command: Command,
    settings: &stockfolio_core::config::Settings,
) -> anyhow::Result<()> {
    match command {
        Command::Seed { dry_run } => {
            if dry_run {
                tracing::info!(
                    dry_run = true,
                    stocks = jobs::sample_symbols().len(),
                    "would seed sample catalogue"
                );
                return Ok(());
            }
            let pool = connect(settings).await?;
            jobs::seed(&pool).await?;
        }
        Command::Refresh { symbols, dry_run } => {
            let provider = stockfolio_core::quotes::provider_from_settings(settings)?;
            if dry_run {
                let targets = if symbols.is_empty() {
                    jobs::sample_symbols()
                } else {
                    symbols
                };
                let found = jobs::refresh_dry_run(provider.as_ref(), &targets).await;
                tracing::info!(
                    dry_run = true,
                    requested = targets.len(),
                    found,
                    "refresh (dry-run) finished"
                );
                return Ok(());
            }
            let pool = connect(settings).await?;
            let targets = jobs::refresh_targets(&pool, &symbols).await?;
            let (_, failed) = jobs::refresh(&pool, provider.as_ref(), &targets).await?;
            if failed > 0 {
                tracing::warn!(failed, "some symbols were not refreshed");
            }
        }
        Command::Optimize {
            budget,
            risk,
            strategy,
            symbols,
        } => {
            let policy = OptimizerPolicy::from_env()?;
            let result = jobs::optimize_sample(policy, budget, risk, strategy, &symbols)?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
    }
    Ok(())
}

async fn connect(settings: &stockfolio_core::config::Settings) -> anyhow::Result<sqlx::PgPool> {
    let db_url = settings.require_database_url()?;
    let pool = stockfolio_core::storage::connect(db_url).await?;
    stockfolio_core::storage::migrate(&pool).await?;
    Ok(pool)
}

fn init_sentry(settings: &stockfolio_core::config::Settings) -> Option<sentry::ClientInitGuard> {
    let dsn = settings.sentry_dsn.as_deref()?;
    Some(sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            ..Default::default()
        },
    )))
}
