use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::http::Method;
use axum::routing::get;
use axum::Router;
use sqlx::SqlitePool;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::errors::AppError;
use crate::jwt::JwtConfig;
use crate::locks::KeyedLocks;
use crate::quota::QuotaEnforcer;
use crate::routes::{auth, contractors, health, sites, users, work_logs, work_orders};
use crate::upload::{LocalDiskUploader, Uploader};

const MAX_BODY_BYTES: usize = 50 * 1024 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub jwt: Arc<JwtConfig>,
    pub uploader: Arc<dyn Uploader>,
    pub locks: Arc<KeyedLocks>,
    pub quota: QuotaEnforcer,
}

impl AppState {
    pub fn new(pool: SqlitePool, jwt: JwtConfig, uploader: Arc<dyn Uploader>) -> Self {
        let locks = Arc::new(KeyedLocks::new());
        Self {
            pool,
            jwt: Arc::new(jwt),
            uploader,
            quota: QuotaEnforcer::new(Arc::clone(&locks)),
            locks,
        }
    }
}

pub async fn create_app(pool: SqlitePool) -> Result<Router, AppError> {
    let jwt_config = JwtConfig::from_env()?;
    let uploader: Arc<dyn Uploader> = Arc::new(LocalDiskUploader::from_env());
    Ok(build_router(AppState::new(pool, jwt_config, uploader)))
}

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_origin(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/health", get(health::health))
        .nest("/auth", auth::routes())
        .nest("/users", users::routes())
        .nest("/sites", sites::routes())
        .nest("/contractors", contractors::routes())
        .nest("/work-orders", work_orders::routes())
        .nest("/work-logs", work_logs::routes())
        .with_state(state)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}
