/// Application context and dependency injection
use crate::{
    access::{AccessBackend, AccessController},
    clock::{Clock, SystemClock},
    config::PortalConfig,
    db,
    error::PortalResult,
    identity::DeviceResolver,
    rating::RatingManager,
    session::SessionManager,
};
use sqlx::SqlitePool;
use std::sync::Arc;

/// Application context holding all shared services
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<PortalConfig>,
    pub db: SqlitePool,
    pub clock: Arc<dyn Clock>,
    pub sessions: Arc<SessionManager>,
    pub ratings: Arc<RatingManager>,
    pub access: Arc<AccessController>,
    pub resolver: Arc<DeviceResolver>,
}

impl AppContext {
    /// Create a new application context from configuration
    pub async fn new(config: PortalConfig) -> PortalResult<Self> {
        config.validate()?;

        let db = db::create_pool(&config.storage.db_path, db::DatabaseOptions::default()).await?;
        db::run_migrations(&db).await?;
        db::test_connection(&db).await?;

        Ok(Self::assemble(config, db, Arc::new(SystemClock)))
    }

    /// Build a context over an existing pool and clock. Tests assemble one
    /// with an in-memory pool and a manual clock.
    pub fn assemble(config: PortalConfig, db: SqlitePool, clock: Arc<dyn Clock>) -> Self {
        let config = Arc::new(config);

        let backend = if config.access.use_iptables {
            AccessBackend::Iptables {
                dry_run: config.access.dry_run,
            }
        } else {
            AccessBackend::InMemory
        };
        let access = Arc::new(AccessController::new(backend));

        let sessions = Arc::new(SessionManager::new(
            db.clone(),
            Arc::clone(&config),
            Arc::clone(&clock),
            Arc::clone(&access),
        ));
        let ratings = Arc::new(RatingManager::new(db.clone(), Arc::clone(&clock)));
        let resolver = Arc::new(DeviceResolver::default());

        Self {
            config,
            db,
            clock,
            sessions,
            ratings,
            access,
            resolver,
        }
    }
}
