use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use listing_scout::scrapers::{AdapterRegistry, ChromeSessionFactory, HttpSessionFactory, SessionFactory};
use listing_scout::{plan_jobs, AppConfig, FlagField, OfferStore, Orchestrator, RunContext};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "listing-scout", about = "Scrape and track flat listings")]
struct Cli {
    /// Offer store (CSV)
    #[arg(long, global = true, default_value = "offers.csv")]
    store: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Scrape every configured portal and update the store
    Run {
        #[arg(long, default_value = "config.json")]
        config: PathBuf,
        /// Fetch pages over plain HTTP instead of headless Chrome
        #[arg(long)]
        http: bool,
    },
    /// Show the jobs a run would execute
    Plan {
        #[arg(long, default_value = "config.json")]
        config: PathBuf,
    },
    /// Mark an offer as favorite
    Favorite {
        url: String,
        #[arg(long)]
        unset: bool,
    },
    /// Hide an offer from the default listing
    Hide {
        url: String,
        #[arg(long)]
        unset: bool,
    },
    /// Print stored offers
    List {
        /// Include hidden offers
        #[arg(long)]
        all: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let store = OfferStore::new(&cli.store);

    match cli.command {
        Command::Run { config, http } => {
            let config = AppConfig::load(&config)?;
            let registry = AdapterRegistry::with_builtin_adapters()?;
            let sessions: Box<dyn SessionFactory> = if http {
                Box::new(HttpSessionFactory::new())
            } else {
                Box::new(ChromeSessionFactory::new()?)
            };

            let ctx = RunContext::new();
            let orchestrator = Orchestrator::new(&registry, sessions.as_ref(), &store);
            let summary = orchestrator.run_exclusive(&config, &ctx).await?;

            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        Command::Plan { config } => {
            let config = AppConfig::load(&config)?;
            for (i, job) in plan_jobs(&config).iter().enumerate() {
                println!("{}. {} (max pages: {})", i + 1, job.label(), job.max_pages);
                println!("   {}", job.url);
            }
        }
        Command::Favorite { url, unset } => update_flag(&store, &url, FlagField::Favorite, !unset)?,
        Command::Hide { url, unset } => update_flag(&store, &url, FlagField::Hidden, !unset)?,
        Command::List { all } => {
            let offers = store.load()?;
            for offer in offers.iter().filter(|o| all || !o.is_hidden) {
                let star = if offer.is_favorite { "★ " } else { "" };
                println!("{}. {}{} [{}]", offer.no, star, offer.title, offer.source);
                println!(
                    "   {} | {} | {} | floor: {}",
                    offer.location,
                    offer.price.map(|p| format!("{:.0} zł", p)).unwrap_or_else(|| "?".into()),
                    offer.area.map(|a| format!("{} m²", a)).unwrap_or_else(|| "?".into()),
                    offer.floor.map(|f| f.to_string()).unwrap_or_else(|| "?".into()),
                );
                println!("   {}", offer.url);
            }
        }
    }

    Ok(())
}

fn update_flag(store: &OfferStore, url: &str, field: FlagField, value: bool) -> Result<()> {
    let found = store
        .update_flag(url, field, value)
        .with_context(|| format!("Failed to update {}", field.column()))?;
    if !found {
        anyhow::bail!("Offer not found: {}", url);
    }
    Ok(())
}
