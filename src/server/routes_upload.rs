//! Multipart upload into the watched directory.
//!
//! Each part is streamed into the upload directory first and moved into the
//! watched directory only once complete, so the watcher never sees a
//! half-written upload under its final name.

use super::error::ApiError;
use crate::context::AppContext;
use axum::{
    extract::{multipart::Field, DefaultBodyLimit, Multipart, State},
    routing::post,
    Json, Router,
};
use std::path::Path;
use tokio::io::AsyncWriteExt;

pub fn upload_routes() -> Router<AppContext> {
    Router::new()
        .route("/upload", post(upload))
        .layer(DefaultBodyLimit::disable())
}

/// Reduce a client-supplied name to its final path component.
pub fn sanitize_file_name(name: &str) -> Option<String> {
    let base = name.rsplit(['/', '\\']).next()?.trim();
    if base.is_empty() || base == "." || base == ".." {
        return None;
    }
    Some(base.to_string())
}

async fn upload(
    State(ctx): State<AppContext>,
    mut multipart: Multipart,
) -> Result<Json<Vec<String>>, ApiError> {
    let upload_dir = &ctx.config.upload.dir;
    let watch_dir = &ctx.config.watch.dir;
    tokio::fs::create_dir_all(upload_dir).await?;

    let mut stored = Vec::new();

    while let Some(mut field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(e.to_string()))?
    {
        if field.name() != Some("files") {
            continue;
        }

        let Some(name) = field.file_name().and_then(sanitize_file_name) else {
            return Err(ApiError::bad_request("upload part has no usable file name"));
        };

        let staged = upload_dir.join(&name);
        if let Err(e) = stage_field(&mut field, &staged).await {
            let _ = tokio::fs::remove_file(&staged).await;
            tracing::warn!(file = %name, "Upload aborted, staged file removed");
            return Err(e);
        }

        let dest = watch_dir.join(&name);
        move_file(&staged, &dest).await?;
        tracing::info!(file = %name, "Upload stored");
        stored.push(name);
    }

    Ok(Json(stored))
}

/// Stream one part into `staged`. The file is closed on return.
async fn stage_field(field: &mut Field<'_>, staged: &Path) -> Result<(), ApiError> {
    let mut file = tokio::fs::File::create(staged).await?;
    while let Some(chunk) = field
        .chunk()
        .await
        .map_err(|e| ApiError::bad_request(e.to_string()))?
    {
        file.write_all(&chunk).await?;
    }
    file.flush().await?;
    Ok(())
}

/// Rename, falling back to copy and delete across filesystems.
async fn move_file(from: &Path, to: &Path) -> std::io::Result<()> {
    match tokio::fs::rename(from, to).await {
        Ok(()) => Ok(()),
        Err(_) => {
            tokio::fs::copy(from, to).await?;
            tokio::fs::remove_file(from).await
        }
    }
}
