pub mod config;
pub mod database;
pub mod dto;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod utils;

use sqlx::PgPool;
use std::sync::Arc;

use crate::config::Config;
use crate::database::{PgQuestionCatalog, PgSessionStore, QuestionCatalog, SessionStore};
use crate::services::quota_service::{QuotaGuard, WindowQuota};
use crate::services::session_service::SessionService;
use crate::utils::time::{Clock, SystemClock};

#[derive(Clone)]
pub struct AppState {
    pub session_service: SessionService,
    pub quota_guard: Arc<dyn QuotaGuard>,
    pub jwt_secret: Arc<str>,
}

impl AppState {
    pub fn new(
        store: Arc<dyn SessionStore>,
        catalog: Arc<dyn QuestionCatalog>,
        clock: Arc<dyn Clock>,
        quota_guard: Arc<dyn QuotaGuard>,
        jwt_secret: &str,
    ) -> Self {
        Self {
            session_service: SessionService::new(store, catalog, clock),
            quota_guard,
            jwt_secret: Arc::from(jwt_secret),
        }
    }

    /// Production wiring: Postgres storage, wall clock, windowed quota.
    pub fn postgres(pool: PgPool, config: &Config) -> Self {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let quota = WindowQuota::new(
            config.session_create_limit,
            config.session_create_window_secs,
            clock.clone(),
        );
        Self::new(
            Arc::new(PgSessionStore::new(pool.clone())),
            Arc::new(PgQuestionCatalog::new(pool)),
            clock,
            Arc::new(quota),
            &config.jwt_secret,
        )
    }
}
