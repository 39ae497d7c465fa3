use axum::{
    routing::{get, post, put},
    Router,
};
use nd_core::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::info;

pub mod error;
pub mod handlers;
pub mod state;

pub use error::{ApiError, ApiResult};
pub use state::AppState;

pub fn create_app(state: AppState) -> Router {
    let cors = CorsLayer::permissive();

    let api = Router::new()
        .route(
            "/articles",
            get(handlers::list_articles).post(handlers::scrape_articles),
        )
        .route("/articles/categories", get(handlers::list_categories))
        .route("/scheduler/start", post(handlers::start_scheduler))
        .route("/scheduler/stop", post(handlers::stop_scheduler))
        .route("/scheduler/status", get(handlers::scheduler_status))
        .route("/scheduler/trigger", post(handlers::trigger_scheduler))
        .route("/scheduler/update", put(handlers::update_scheduler))
        .route("/scheduler/restart", post(handlers::restart_scheduler));

    Router::new()
        .route("/health", get(handlers::health))
        .nest("/api/v1", api)
        .layer(cors)
        .with_state(Arc::new(state))
}

pub async fn serve(addr: SocketAddr, state: AppState) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("🌐 Listening on http://{}", listener.local_addr()?);
    axum::serve(listener, create_app(state)).await?;
    Ok(())
}

pub mod prelude {
    pub use crate::{create_app, serve, AppState};
    pub use nd_core::{Error, Result};
}
