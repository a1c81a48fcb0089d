//! Server setup and lifecycle management

use crate::api::create_router;
use crate::api::rest::state::AppState;
use crate::config::{DaemonConfig, StorageConfig};
use crate::error::{DaemonError, DaemonResult};
use devory_collab::{CollaborationAllocator, InMemoryNotificationFeed};
use devory_storage::memory::{InMemoryCollaborationStore, InMemoryRateLimiter};
use devory_storage::postgres::{PostgresCollaborationStore, PostgresRateLimiter};
use devory_storage::{CollaborationStore, RateLimitStore};
use std::sync::Arc;
use tokio::net::TcpListener;

/// Devory daemon server
pub struct Server {
    config: DaemonConfig,
    allocator: Arc<CollaborationAllocator>,
    notifications: Arc<InMemoryNotificationFeed>,
}

impl Server {
    /// Create a new server with the given configuration
    pub async fn new(config: DaemonConfig) -> DaemonResult<Self> {
        let (store, rate_limiter): (Arc<dyn CollaborationStore>, Arc<dyn RateLimitStore>) =
            match &config.storage {
                StorageConfig::Memory => {
                    tracing::info!("Using in-memory storage");
                    (
                        Arc::new(InMemoryCollaborationStore::new()),
                        Arc::new(InMemoryRateLimiter::new()),
                    )
                }
                StorageConfig::Postgres {
                    url,
                    max_connections,
                    connect_timeout_secs,
                } => {
                    tracing::info!(max_connections, "Using PostgreSQL storage");
                    let store = PostgresCollaborationStore::connect_with_options(
                        url,
                        *max_connections,
                        *connect_timeout_secs,
                    )
                    .await?;
                    let limiter = PostgresRateLimiter::from_store(&store);
                    (Arc::new(store), Arc::new(limiter))
                }
            };

        let notifications = Arc::new(InMemoryNotificationFeed::new());
        let allocator = CollaborationAllocator::new(store, rate_limiter, notifications.clone())
            .with_config(config.allocator.clone());

        Ok(Self {
            config,
            allocator: Arc::new(allocator),
            notifications,
        })
    }

    /// Run the server
    pub async fn run(self) -> DaemonResult<()> {
        let addr = self.config.server.listen_addr;

        let state = AppState::new(self.allocator.clone(), self.notifications.clone());
        let app = create_router(state, self.config.server.enable_cors);

        let listener = TcpListener::bind(addr).await?;

        let tunables = self.allocator.config();
        tracing::info!(
            %addr,
            join_quota = tunables.join_requests_per_window,
            lock_timeout_ms = tunables.lock_timeout_ms,
            "Devory daemon listening"
        );

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| DaemonError::Server(e.to_string()))?;

        tracing::info!("Devory daemon shutting down");
        Ok(())
    }
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %err, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::warn!(error = %err, "Failed to install terminate handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("Received terminate signal, initiating graceful shutdown");
        }
    }
}
