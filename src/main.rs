use batchgrid::{api::Server, catalog::Catalog, config::Config, repository::BatchRepository};
use std::sync::Arc;
use tracing::info;

const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// The main entry point for the batch server.
///
/// This function initializes logging, loads the application configuration,
/// opens the batch repository over the storage root, and starts the API
/// server.
#[tokio::main] // Runs the async main function on the Tokio runtime.
async fn main() -> anyhow::Result<()> {
    // Initialize logging using tracing_subscriber.
    // This sets up a default formatter that prints logs to stdout.
    tracing_subscriber::fmt::init();

    // Load the configuration from the first argument, or the default file.
    // `DATA_DIR` in the environment overrides the storage directory.
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());
    let config = Config::load(&config_path)?;
    info!("Batch server starting with config: {:?}", config);

    // Make sure the storage root exists before anything reads it
    let root = config.storage.batches_root();
    tokio::fs::create_dir_all(&root).await?;
    info!("Storing batches under {}", root.display());

    // Open the repository. Nothing is scanned here; the summary index is
    // built on the first listing request.
    let repository = Arc::new(BatchRepository::new(root));
    // The catalog is the set of operations the HTTP handlers call
    let catalog = Catalog::new(repository);

    // Create the API server and start serving. This binds to the configured
    // host and port; the `?` operator propagates bind and serve errors.
    let server = Server::new(config, catalog);
    server.start().await?;

    Ok(())
}
