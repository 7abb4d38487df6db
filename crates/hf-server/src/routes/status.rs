//! Health, progress, event and tool status route handlers.

use axum::extract::{Query, State};
use axum::Json;
use hf_core::events::Event;
use hf_package::RenditionProgress;
use serde::{Deserialize, Serialize};

use crate::context::AppContext;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

/// GET /api/health
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// GET /api/progress
pub async fn progress(State(ctx): State<AppContext>) -> Json<Vec<RenditionProgress>> {
    Json(ctx.progress.snapshot())
}

#[derive(Deserialize)]
pub struct EventsQuery {
    pub limit: Option<usize>,
}

/// GET /api/events?limit=N
pub async fn recent_events(
    State(ctx): State<AppContext>,
    Query(query): Query<EventsQuery>,
) -> Json<Vec<Event>> {
    Json(ctx.event_bus.recent_events(query.limit.unwrap_or(50)))
}

/// GET /api/tools
pub async fn tools(State(ctx): State<AppContext>) -> Json<Vec<hf_av::ToolInfo>> {
    Json(ctx.tools.check_all())
}
