use super::error::ApiError;
use crate::config::FlagsUpdate;
use crate::context::AppContext;
use crate::error::EngineError;
use crate::state::JobStatus;
use axum::{
    extract::{Path, State},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use watchforge_common::JobId;

pub fn api_routes() -> Router<AppContext> {
    Router::new()
        .route("/files", get(list_files))
        .route("/files/:id", get(get_file))
        .route("/config", get(get_config).post(update_config))
        .route("/status", get(status))
}

async fn list_files(State(ctx): State<AppContext>) -> impl IntoResponse {
    Json(ctx.store.snapshot())
}

async fn get_file(
    State(ctx): State<AppContext>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let id: JobId = id
        .parse()
        .map_err(|_| ApiError::bad_request(format!("invalid job id: {}", id)))?;
    let job = ctx.store.get(id).ok_or(EngineError::JobNotFound(id))?;
    Ok(Json(job))
}

async fn get_config(State(ctx): State<AppContext>) -> impl IntoResponse {
    Json(ctx.flags.snapshot())
}

async fn update_config(
    State(ctx): State<AppContext>,
    Json(update): Json<FlagsUpdate>,
) -> impl IntoResponse {
    let snapshot = ctx.flags.apply(update);
    tracing::info!(
        auto_convert = snapshot.auto_convert,
        delete_after = snapshot.delete_after,
        overwrite_existing = snapshot.overwrite_existing,
        "Runtime flags updated"
    );
    Json(snapshot)
}

async fn status(State(ctx): State<AppContext>) -> impl IntoResponse {
    let jobs = ctx.store.snapshot();
    let count = |status: JobStatus| jobs.iter().filter(|j| j.status == status).count();
    Json(serde_json::json!({
        "version": env!("CARGO_PKG_VERSION"),
        "startedAt": ctx.started_at,
        "jobs": jobs.len(),
        "queued": count(JobStatus::Queued),
        "processing": count(JobStatus::Processing),
        "availableSlots": ctx.slots.available_permits(),
        "subscribers": ctx.hub.subscriber_count(),
    }))
}
