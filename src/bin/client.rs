//! fileline-client: sends requests to a fileline server
//!
//! Requests come from the command line, or from stdin one per line when
//! none are given. Every request runs on its own task and connection.
//!
//! ```bash
//! fileline-client "GET / HTTP/1.1" "UPLOAD notes.txt"
//! ```

use clap::Parser;
use fileline::client::Client;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::task::JoinSet;
use tracing::debug;
use tracing_subscriber::EnvFilter;

/// Command-line arguments for the client
#[derive(Parser, Debug)]
#[command(name = "fileline-client")]
#[command(version = "0.1.0")]
#[command(about = "Send GET and UPLOAD requests to a fileline server", long_about = None)]
struct ClientArgs {
    /// Server address
    #[arg(short, long, default_value = "127.0.0.1:5101")]
    server: String,

    /// Directory upload file names are resolved against
    #[arg(short, long, default_value = ".")]
    dir: PathBuf,

    /// Upload chunk size in bytes
    #[arg(long, default_value_t = 4096)]
    chunk_size: usize,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn")]
    log_level: String,

    /// Request lines, e.g. "GET / HTTP/1.1" or "UPLOAD notes.txt"
    requests: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = ClientArgs::parse();

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let client = Arc::new(
        Client::new(args.server)
            .with_local_dir(args.dir)
            .with_chunk_size(args.chunk_size.max(1)),
    );
    let mut tasks = JoinSet::new();

    if args.requests.is_empty() {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }
            spawn_request(&mut tasks, &client, line);
        }
    } else {
        for request in args.requests {
            spawn_request(&mut tasks, &client, request);
        }
    }

    while let Some(joined) = tasks.join_next().await {
        if let Err(e) = joined {
            debug!(error = %e, "Request task failed");
        }
    }

    Ok(())
}

fn spawn_request(tasks: &mut JoinSet<()>, client: &Arc<Client>, request: String) {
    let client = Arc::clone(client);
    tasks.spawn(async move {
        match client.execute(&request).await {
            Ok(outcome) => println!("{}", outcome),
            Err(e) => eprintln!("{}: {}", request, e),
        }
    });
}
