//! TCP server for the fileline protocol.
//!
//! Accepts connections and hands each one to its own task running a
//! [`Session`]. Nothing is shared between tasks except the storage paths
//! and the access log.

use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::access_log::AccessLog;
use crate::config::Config;
use crate::session::{Session, SessionSettings};
use crate::storage::Storage;

/// Server instance
pub struct Server {
    config: Config,
    storage: Arc<Storage>,
    access_log: Arc<AccessLog>,
    settings: SessionSettings,
    connection_limit: Option<Arc<Semaphore>>,
}

impl Server {
    /// Create a new server instance, opening the access log.
    pub async fn new(config: Config) -> std::io::Result<Self> {
        let access_log = AccessLog::open(&config.access_log).await?;
        Ok(Self::with_access_log(config, access_log))
    }

    /// Create a server writing to an already opened access log.
    pub fn with_access_log(config: Config, access_log: Arc<AccessLog>) -> Self {
        let storage = Storage::new(&config.root, &config.upload_dir);
        let settings = SessionSettings::from(&config);
        let connection_limit = config
            .max_connections
            .map(|max| Arc::new(Semaphore::new(max)));

        Server {
            config,
            storage,
            access_log,
            settings,
            connection_limit,
        }
    }

    /// Bind the configured listen address.
    pub async fn bind(&self) -> std::io::Result<TcpListener> {
        TcpListener::bind(&self.config.listen).await
    }

    /// Bind and accept connections until the listener fails.
    pub async fn run(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let listener = self.bind().await?;
        self.serve(listener).await
    }

    /// Accept connections on `listener`, one task per connection.
    pub async fn serve(
        &self,
        listener: TcpListener,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        info!(address = %listener.local_addr()?, "Server listening");

        loop {
            // Wait for a connection slot when a cap is configured
            let permit = match &self.connection_limit {
                Some(limit) => Some(Arc::clone(limit).acquire_owned().await?),
                None => None,
            };

            match listener.accept().await {
                Ok((stream, addr)) => {
                    debug!(peer = %addr, "New connection");

                    let session = Session::new(
                        stream,
                        Arc::clone(&self.storage),
                        Arc::clone(&self.access_log),
                        self.settings.clone(),
                    );

                    tokio::spawn(
                        async move {
                            if let Err(e) = session.run().await {
                                warn!(error = %e, "Connection error");
                            }
                            debug!("Connection closed");
                            drop(permit);
                        }
                        .instrument(info_span!("connection", peer = %addr)),
                    );
                }
                Err(e) => {
                    error!(error = %e, "Failed to accept connection");
                }
            }
        }
    }

    /// Get a reference to the storage for testing
    #[cfg(test)]
    pub fn storage(&self) -> &Arc<Storage> {
        &self.storage
    }
}
