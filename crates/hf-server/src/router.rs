//! Axum router construction.
//!
//! Builds the API routes, static serving of the output root under
//! `/videos`, and the middleware layers.

use axum::routing::get;
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::context::AppContext;
use crate::packages::VIDEOS_PREFIX;
use crate::routes;

/// Build the application router.
pub fn build_router(ctx: AppContext) -> Router {
    let api = Router::new()
        .route("/health", get(routes::status::health))
        .route("/videos", get(routes::videos::list_videos))
        .route("/videos/{*id}", get(routes::videos::get_video))
        .route("/progress", get(routes::status::progress))
        .route(
            "/jobs",
            get(routes::jobs::list_jobs).post(routes::jobs::submit_job),
        )
        .route("/events", get(routes::status::recent_events))
        .route("/tools", get(routes::status::tools));

    let output_root = ctx.config.packaging.output_root.clone();
    tracing::info!("Serving packages from {}", output_root.display());

    let mut app = Router::new()
        .nest("/api", api)
        .nest_service(VIDEOS_PREFIX, ServeDir::new(output_root))
        .layer(TraceLayer::new_for_http());

    if ctx.config.server.cors {
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
        app = app.layer(cors);
    }

    app.with_state(ctx)
}
