//! Defence HQ incident reporting backend
//!
//! Citizens submit threat reports; headquarters triages them, assigns them to
//! state commanders and tracks resolutions. SQLite persistence, Tantivy search,
//! local media storage and a WebSocket change feed.

mod analytics;
mod api;
mod auth;
mod config;
mod db;
mod errors;
mod filters;
mod models;
mod realtime;
mod search;
mod storage;
mod validation;

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, post, put},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use config::{Config, LogFormat};
use db::Repository;
use realtime::ChangeFeed;
use search::SearchIndex;
use storage::MediaStore;

const SESSION_PURGE_INTERVAL: Duration = Duration::from_secs(3600);

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<Repository>,
    pub search: Arc<SearchIndex>,
    pub media: Arc<MediaStore>,
    pub feed: ChangeFeed,
    pub config: Arc<Config>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::from_env()?;
    init_logging(&config);

    tracing::info!("Starting Defence HQ backend");
    tracing::info!("Database path: {:?}", config.db_path);
    tracing::info!("Index path: {:?}", config.index_path);
    tracing::info!("Media path: {:?}", config.media_path);
    tracing::info!("Bind address: {}", config.bind_addr);

    let state = init_state(config.clone()).await?;

    let purge_repo = state.repo.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(SESSION_PURGE_INTERVAL);
        loop {
            interval.tick().await;
            match purge_repo.purge_expired_sessions().await {
                Ok(0) => {}
                Ok(n) => tracing::info!("Purged {} expired sessions", n),
                Err(e) => tracing::warn!("Session purge failed: {}", e),
            }
        }
    });

    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!("Server listening on {}", config.bind_addr);

    axum::serve(listener, app).await?;

    Ok(())
}

fn init_logging(config: &Config) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    let registry = tracing_subscriber::registry().with(env_filter);

    match config.log_format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

/// Open storage, rebuild the search index and seed the first administrator.
pub async fn init_state(config: Config) -> Result<AppState, Box<dyn std::error::Error>> {
    let pool = db::init_database(&config.db_path).await?;
    let repo = Arc::new(Repository::new(pool));

    let search = Arc::new(SearchIndex::open(&config.index_path)?);
    tracing::info!("Building search index...");
    let reports = repo.list_reports().await?;
    search.rebuild(&reports).await?;

    let media = Arc::new(MediaStore::open(&config.media_path).await?);

    auth::bootstrap_admin(&repo, config.bootstrap_admin.as_ref()).await?;
    let purged = repo.purge_expired_sessions().await?;
    if purged > 0 {
        tracing::info!("Purged {} expired sessions", purged);
    }

    Ok(AppState {
        repo,
        search,
        media,
        feed: ChangeFeed::new(),
        config: Arc::new(config),
    })
}

/// Create the application router with all routes.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let max_upload_bytes = state.config.max_upload_bytes;

    // Back-office routes, session required
    let protected_routes = Router::new()
        // Auth and accounts
        .route("/auth/logout", post(api::logout))
        .route("/auth/me", get(api::me))
        .route("/auth/password", post(api::change_password))
        .route("/users", get(api::list_users).post(api::create_user))
        .route("/users/{id}", put(api::update_user))
        // Reports
        .route("/reports", get(api::list_reports))
        .route("/reports/search", get(api::search_reports))
        .route(
            "/reports/{id}",
            get(api::get_report)
                .put(api::update_report)
                .delete(api::delete_report),
        )
        .route("/reports/{id}/status", put(api::update_report_status))
        .route(
            "/reports/{id}/eligible-commanders",
            get(api::list_eligible_commanders),
        )
        // Assignments
        .route(
            "/assignments",
            get(api::list_assignments).post(api::create_assignment),
        )
        .route("/assignments/{id}", get(api::get_assignment))
        .route("/assignments/{id}/accept", post(api::accept_assignment))
        .route("/assignments/{id}/resolve", post(api::resolve_assignment))
        .route("/assignments/{id}/cancel", post(api::cancel_assignment))
        // Commanders
        .route(
            "/commanders",
            get(api::list_commanders).post(api::create_commander),
        )
        .route(
            "/commanders/{id}",
            get(api::get_commander)
                .put(api::update_commander)
                .delete(api::delete_commander),
        )
        .route("/commanders/{id}/dashboard", get(api::get_commander_dashboard))
        .route("/me/dashboard", get(api::get_my_dashboard))
        // Audit and analytics
        .route("/audit", get(api::get_audit_trail))
        .route("/audit/changes", get(api::list_audit_changes))
        .route("/audit/access", get(api::list_access_logs))
        .route("/analytics", get(api::get_analytics))
        // Notifications
        .route("/notifications", get(api::list_notifications))
        .route(
            "/notifications/read-all",
            post(api::mark_all_notifications_read),
        )
        .route("/notifications/{id}/read", post(api::mark_notification_read))
        // Sync
        .route("/revision", get(api::get_revision))
        .route("/realtime", get(realtime::realtime_handler))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_session,
        ));

    let api_routes = protected_routes.route("/auth/login", post(api::login));

    // Citizen routes, no auth
    let public_routes = Router::new()
        .route("/reports", post(api::submit_report))
        .route("/reports/{id}", get(api::track_report))
        .route("/media", post(api::upload_report_media));

    let open_routes = Router::new()
        .route("/health", get(health_check))
        .route("/media/{bucket}/{key}", get(api::download_media));

    Router::new()
        .nest("/api", api_routes)
        .nest("/public", public_routes)
        .merge(open_routes)
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Health check endpoint.
async fn health_check() -> &'static str {
    "OK"
}

#[cfg(test)]
mod tests;
