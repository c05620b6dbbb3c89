use axum::extract::{Path, Query, State};
use axum::response::Response;
use serde::Deserialize;
use tracing::instrument;

use super::serve::serve_file;
use crate::error::{AppError, ErrorBody};
use crate::state::AppState;
use crate::thumbs;

#[derive(Debug, Deserialize)]
pub struct PreviewQuery {
    /// Requested thumbnail width; absent serves the full image.
    w: Option<String>,
}

#[utoipa::path(
    get,
    path = "/preview/{uuid}",
    tag = "Images",
    operation_id = "previewImage",
    params(
        ("uuid" = String, Path, description = "Image UUID"),
        ("w" = Option<u32>, Query, description = "Thumbnail width (1..=4096)"),
    ),
    responses(
        (status = 200, description = "Image bytes", content_type = "image/*"),
        (status = 400, description = "Invalid width or uuid", body = ErrorBody),
        (status = 404, description = "Unknown image", body = ErrorBody),
        (status = 500, description = "Thumbnail generation failed", body = ErrorBody),
    ),
)]
#[instrument(skip(state))]
pub async fn preview_image(
    State(state): State<AppState>,
    Path(uuid): Path<String>,
    Query(query): Query<PreviewQuery>,
) -> Result<Response, AppError> {
    if let Some(raw_width) = query.w {
        let width: u32 = raw_width
            .parse()
            .map_err(|_| AppError::Validation(format!("Invalid thumbnail width: {raw_width}")))?;
        let target = thumbs::thumbnail(
            &state.store,
            &state.config.tools.thumbnailer,
            &uuid,
            width,
        )
        .await?;
        return serve_file(&target).await;
    }

    let path = state
        .store
        .resolve(&uuid)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("No image {uuid}")))?;
    serve_file(&path).await
}
