use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tracing::info;

use coursehub::config;
use coursehub::db;
use coursehub::seed;

#[derive(Debug, Parser)]
#[command(author, version, about = "Load the demo catalog, schedule and accounts")]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    /// Seed file to load instead of the built-in demo data.
    #[arg(long)]
    file: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    let cfg = config::load(Some(&args.config))?;
    cfg.ensure_dirs()?;

    let pool = db::init_pool(&cfg.database_url()).await?;
    db::run_migrations(&pool).await?;

    let data = match &args.file {
        Some(path) => serde_json::from_str(&tokio::fs::read_to_string(path).await?)?,
        None => seed::demo()?,
    };
    seed::apply(&pool, &data).await?;
    info!("demo data loaded");
    Ok(())
}
