use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use jobmatch_store::{OpportunityStore, StoreConfig};
use jobmatch_update::{maybe_build_scheduler, UpdateConfig, UpdatePipeline};
use jobmatch_web::AppState;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "jobmatch")]
#[command(about = "JobMatch opportunity board command-line interface")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run the HTTP API server.
    Serve,
    /// Run one daily-update pass.
    Update,
    /// Apply database migrations.
    Migrate,
    /// Seed the database from the bundled snapshot.
    Seed,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => serve().await,
        Commands::Update => update().await,
        Commands::Migrate => migrate().await,
        Commands::Seed => seed().await,
    }
}

async fn serve() -> Result<()> {
    let store = Arc::new(OpportunityStore::connect(StoreConfig::from_env()).await);
    let update_config = UpdateConfig::from_env();
    let pipeline = Arc::new(UpdatePipeline::from_config(&update_config)?);

    let scheduler =
        maybe_build_scheduler(&update_config, pipeline.clone(), store.pool().cloned()).await?;
    if let Some(scheduler) = &scheduler {
        scheduler.start().await.context("starting scheduler")?;
    }

    let port = std::env::var("JOBMATCH_PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(3000);
    let webhook_secret = std::env::var("WEBHOOK_SECRET").ok().filter(|s| !s.is_empty());

    jobmatch_web::serve(AppState::new(store, pipeline, webhook_secret), port).await
}

async fn update() -> Result<()> {
    let store = OpportunityStore::connect(StoreConfig::from_env()).await;
    let pipeline = UpdatePipeline::from_config(&UpdateConfig::from_env())?;
    let summary = pipeline.run_once(store.pool(), "manual").await;
    println!(
        "update complete: run_id={} updated={} deactivated={} status={}",
        summary.run_id, summary.opportunities_updated, summary.deactivated, summary.status
    );
    Ok(())
}

async fn migrate() -> Result<()> {
    let config = StoreConfig::from_env();
    let Some(url) = config.database_url else {
        bail!("DATABASE_URL must be set to run migrations");
    };
    let pool = jobmatch_store::connect_pool(&url).await?;
    jobmatch_store::run_migrations(&pool).await?;
    println!("migrations applied");
    Ok(())
}

async fn seed() -> Result<()> {
    let config = StoreConfig::from_env();
    let Some(url) = config.database_url.clone() else {
        bail!("DATABASE_URL must be set to seed the database");
    };
    let snapshot = jobmatch_store::read_snapshot(&config.data_path)?;
    let pool = jobmatch_store::connect_pool(&url).await?;
    let (categories, opportunities) = jobmatch_store::seed_snapshot(&pool, &snapshot).await?;
    println!("seeded {categories} categories and {opportunities} opportunities");
    Ok(())
}
