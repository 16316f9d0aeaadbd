pub mod auth;
pub mod clock;
pub mod config;
pub mod db;
pub mod error;
pub mod sweeper;

use actix_web::HttpResponse;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

pub use error::AppError;
pub type Result<T> = std::result::Result<T, AppError>;
pub use config::Settings;

pub use auth::{AuthService, RateLimitConfig, RateLimiter};
pub use db::{Account, DbOperations, MemoryStore, Session, Store};

use auth::{LogNotifier, Notifier};
use clock::{Clock, SystemClock};
use config::StorageBackend;
use sweeper::{ExpirySweeper, SweeperConfig};

/// Health check endpoint handler
/// Returns a JSON response with server status and timestamp
pub async fn health_check() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

/// Application state shared across all components
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Settings>,
    pub store: Arc<dyn Store>,
    pub clock: Arc<dyn Clock>,
    pub auth_service: Arc<AuthService>,
}

impl AppState {
    /// Connects the configured storage backend and wires the service with
    /// the system clock and the logging notifier.
    pub async fn new(config: Settings) -> Result<Self> {
        let store: Arc<dyn Store> = match config.database.backend {
            StorageBackend::Postgres => {
                let db = DbOperations::new_with_options(
                    &config.database.url,
                    config.database.max_connections,
                    Duration::from_secs(config.database.acquire_timeout_secs),
                )
                .await?;
                db.migrate().await?;
                info!(
                    "Connected to PostgreSQL and applied migrations: {:?}",
                    db.get_pool_status().await
                );
                Arc::new(db)
            }
            StorageBackend::Memory => {
                info!("Using in-memory storage; data will not survive a restart");
                Arc::new(MemoryStore::new())
            }
        };

        Self::with_parts(config, store, Arc::new(LogNotifier), Arc::new(SystemClock))
    }

    pub fn with_parts(
        config: Settings,
        store: Arc<dyn Store>,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let auth_service = AuthService::new(&config, store.clone(), notifier, clock.clone())?;

        Ok(Self {
            config: Arc::new(config),
            store,
            clock,
            auth_service: Arc::new(auth_service),
        })
    }

    pub fn expiry_sweeper(&self) -> ExpirySweeper {
        ExpirySweeper::new(
            self.store.clone(),
            self.clock.clone(),
            SweeperConfig::from(&self.config.sweeper),
        )
    }
}
