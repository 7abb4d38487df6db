//! Package listing route handlers.

use axum::extract::{Path, State};
use axum::Json;

use crate::context::AppContext;
use crate::error::AppError;
use crate::packages::{self, PackageDetail, PackageSummary};

/// GET /api/videos
pub async fn list_videos(State(ctx): State<AppContext>) -> Json<Vec<PackageSummary>> {
    let root = ctx.config.packaging.output_root.clone();
    let packages = tokio::task::spawn_blocking(move || packages::list_packages(&root))
        .await
        .unwrap_or_default();
    Json(packages)
}

/// GET /api/videos/{*id}
pub async fn get_video(
    State(ctx): State<AppContext>,
    Path(id): Path<String>,
) -> Result<Json<PackageDetail>, AppError> {
    let root = ctx.config.packaging.output_root.clone();
    let prober = ctx.prober.clone();
    let detail = tokio::task::spawn_blocking(move || {
        packages::package_detail(&root, &id, prober.as_ref())
    })
    .await
    .map_err(|e| hf_core::Error::Internal(format!("package lookup panicked: {e}")))??;
    Ok(Json(detail))
}
