use anyhow::Result;
use clap::Parser;
use menurec::{init_tracing, AppState, Config, InitOutcome};
use tracing::{info, warn};

/// Builds the feature space from the data store and writes the vector cache,
/// so servers can start from a warm cache.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[arg(short, long, default_value = "config/default.toml")]
    config: String,

    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Refit even if a valid cache already exists.
    #[arg(short, long)]
    force: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    std::env::set_var("RUST_LOG", &args.log_level);
    init_tracing();

    info!("Starting Menurec cache builder");

    let config = Config::load_or_default(&args.config)?;
    info!(directory = %config.cache.directory.display(), "Vector cache location");

    let state = AppState::new(config).await?;

    match state.engine.initialize(args.force).await? {
        InitOutcome::NoProducts => {
            warn!("No available products; cache not written");
            return Ok(());
        }
        outcome => info!(?outcome, "Engine initialized"),
    }

    let stats = state.engine.stats();
    info!(
        products = stats.cached_products,
        profiles = stats.cached_profiles,
        dimensions = stats.vector_dimensions,
        "Cache ready"
    );
    Ok(())
}
