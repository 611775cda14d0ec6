use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use trendfeed::app::AppContext;
use trendfeed::cli::{commands, Cli, Commands};
use trendfeed::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    let ctx = AppContext::with_workers(config, cli.workers)?;

    match cli.command {
        Commands::Sources => {
            commands::list_sources(&ctx)?;
        }
        Commands::Fetch {
            id,
            force,
            query,
            limit,
        } => {
            commands::fetch_source(&ctx, &id, force, query, limit).await?;
        }
        Commands::FetchMany { ids, all, limit } => {
            commands::fetch_many(&ctx, &ids, all, limit).await?;
        }
        Commands::Invalidate { key } => {
            commands::invalidate(&ctx, &key)?;
        }
        Commands::ClearCache { expired } => {
            commands::clear_cache(&ctx, expired)?;
        }
    }

    Ok(())
}
