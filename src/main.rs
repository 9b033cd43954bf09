use anyhow::Result;
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use atlas_regdata::{EngineConfig, RegulatoryDataEngine};

#[derive(Debug, Parser)]
#[command(name = "atlas-regdata")]
#[command(about = "Local FDA Orange Book / Purple Book data engine")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Download the current datasets and build a new generation
    Refresh,
    /// Show the active generation and freshness state
    Status,
    /// Search Orange Book products by ingredient, trade name or applicant
    Search {
        drug_name: String,
        #[arg(long)]
        include_generics: bool,
    },
    /// Reference listed drugs, AB-rated generics and other products for a drug
    Equivalents { drug_name: String },
    /// Patents and exclusivities filed under an application number
    Patents { application_number: String },
    /// Loss-of-exclusivity forecast
    Cliff {
        drug_name: String,
        #[arg(long, default_value_t = 5)]
        years_ahead: u32,
    },
    /// Reference biologic and its biosimilars
    Purple { drug_name: String },
    /// Interchangeable vs biosimilar-only products for a reference biologic
    Interchangeable { reference_product_name: String },
    /// Keep the store fresh in the foreground, refreshing on an interval
    Watch,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "atlas_regdata=info,sqlx=warn".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let engine = RegulatoryDataEngine::open(EngineConfig::from_env()).await?;

    match cli.command {
        Commands::Refresh => {
            engine.refresh().await?;
            print_json(&engine.status().await)?;
        }
        Commands::Status => print_json(&engine.status().await)?,
        Commands::Search { drug_name, include_generics } => {
            print_json(&engine.search_orange_book(&drug_name, include_generics).await?)?
        }
        Commands::Equivalents { drug_name } => {
            print_json(&engine.get_therapeutic_equivalents(&drug_name).await?)?
        }
        Commands::Patents { application_number } => {
            print_json(&engine.get_patent_exclusivity(&application_number).await?)?
        }
        Commands::Cliff { drug_name, years_ahead } => {
            print_json(&engine.analyze_patent_cliff(&drug_name, years_ahead).await?)?
        }
        Commands::Purple { drug_name } => print_json(&engine.search_purple_book(&drug_name).await?)?,
        Commands::Interchangeable { reference_product_name } => print_json(
            &engine
                .get_biosimilar_interchangeability(&reference_product_name)
                .await?,
        )?,
        Commands::Watch => {
            engine.ensure_ready().await?;
            let scheduler = engine.scheduler();
            tokio::select! {
                _ = scheduler.run() => {}
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("Shutting down; an unfinished build is discarded on next start");
                }
            }
        }
    }

    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
