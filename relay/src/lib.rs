pub mod api;
pub mod backend;
pub mod config;
pub mod contents;
pub mod cors;
pub mod errors;
pub mod metrics_defs;
pub mod target;
pub mod upload;

#[cfg(test)]
mod testutils;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::middleware;
use backend::Backend;
use shared::admin_service::admin_router;
use shared::http::{bind, run_http_service, serve};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;

#[derive(thiserror::Error, Debug)]
pub enum RelayServerError {
    #[error("invalid configuration: {0}")]
    Config(#[from] config::ValidationError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Full inbound application: the API surface, the single-page UI and the CORS policy.
pub fn router(config: &config::Config) -> Router {
    let state = api::AppState::new(Backend::new(&config.upstream));
    let static_dir = &config.static_dir;

    api::routes()
        .with_state(state)
        .route_service("/", ServeFile::new(static_dir.join("index.html")))
        .nest_service("/static", ServeDir::new(static_dir))
        .layer(DefaultBodyLimit::max(config.max_body_bytes))
        .layer(middleware::from_fn(cors::cors))
        .layer(TraceLayer::new_for_http())
}

pub async fn run(config: config::Config) -> Result<(), RelayServerError> {
    config.validate()?;
    shared::metrics_defs::describe(metrics_defs::ALL_METRICS);

    let ready = Arc::new(AtomicBool::new(false));
    let app = router(&config);

    let listener = bind(&config.listener.host, config.listener.port).await?;
    ready.store(true, Ordering::Relaxed);
    let relay_task = serve(listener, app);

    match &config.admin_listener {
        Some(admin) => {
            let flag = ready.clone();
            let admin_app = admin_router(move || flag.load(Ordering::Relaxed));
            let admin_task = run_http_service(&admin.host, admin.port, admin_app);
            tokio::try_join!(relay_task, admin_task)?;
        }
        None => relay_task.await?,
    }

    Ok(())
}
