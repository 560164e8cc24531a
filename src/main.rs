//! fileline-server: serves files and receives uploads
//!
//! Features:
//! - GET: directory listings, text files embedded in HTML, raw images and
//!   binaries
//! - UPLOAD: length-prefixed uploads of .txt, .jpg, .jpeg and .png files
//! - Configuration via CLI arguments or TOML file

use fileline::config::Config;
use fileline::server::Server;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Load configuration
    let config = Config::load()?;

    // Initialize logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    info!(
        listen = %config.listen,
        root = %config.root.display(),
        upload_dir = %config.upload_dir.display(),
        access_log = %config.access_log.display(),
        chunk_size = config.chunk_size,
        max_connections = ?config.max_connections,
        "Starting fileline server"
    );

    let server = Server::new(config).await?;

    tokio::select! {
        result = server.run() => result,
        _ = tokio::signal::ctrl_c() => {
            info!("Shutting down");
            Ok(())
        }
    }
}
