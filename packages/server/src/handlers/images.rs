use axum::Json;
use axum::extract::{DefaultBodyLimit, Multipart, State};
use chrono::Utc;
use sea_orm::{EntityTrait, QueryOrder, Set};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::entity::input_image;
use crate::error::{AppError, ErrorBody};
use crate::models::image::{InputImageResponse, UploadResponse};
use crate::state::AppState;
use crate::utils::filename::{storage_extension, validate_upload_filename};

pub fn upload_body_limit() -> DefaultBodyLimit {
    DefaultBodyLimit::max(128 * 1024 * 1024) // 128 MB
}

#[utoipa::path(
    post,
    path = "/upload",
    tag = "Images",
    operation_id = "uploadImages",
    summary = "Upload input images",
    description = "Accepts one or more files in the `files[]` multipart field. Each file is \
        assigned a fresh UUID, stored under that UUID with its original extension, and \
        recorded in the input image table.",
    request_body(content_type = "multipart/form-data", description = "Image files"),
    responses(
        (status = 200, description = "Upload complete", body = UploadResponse),
        (status = 400, description = "Validation error (VALIDATION_ERROR)", body = ErrorBody),
    ),
)]
#[instrument(skip(state, multipart))]
pub async fn upload_images(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, AppError> {
    let mut uploaded = 0u32;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(format!("Multipart error: {e}")))?
    {
        match field.name() {
            Some("files[]") | Some("files") => {}
            _ => continue, // Ignore unknown fields.
        }

        let filename = field
            .file_name()
            .map(str::to_string)
            .ok_or_else(|| AppError::Validation("File field must have a filename".into()))?;
        let filename = validate_upload_filename(&filename)
            .map_err(|e| AppError::Validation(e.message().into()))?
            .to_string();

        let data = field
            .bytes()
            .await
            .map_err(|e| AppError::Validation(format!("Failed to read file: {e}")))?;

        let uuid = Uuid::new_v4();
        let path = state
            .store
            .original_path(uuid, storage_extension(&filename).as_deref());

        // File first, row second: the record invariant is that the file
        // exists when the row appears.
        tokio::fs::write(&path, &data)
            .await
            .map_err(|e| AppError::Internal(format!("Failed to store upload: {e}")))?;

        let row = input_image::ActiveModel {
            uuid: Set(uuid),
            original_filename: Set(filename.clone()),
            upload_timestamp: Set(Utc::now()),
        };
        input_image::Entity::insert(row)
            .exec_without_returning(&state.db)
            .await?;

        info!(%uuid, filename = %filename, bytes = data.len(), "stored input image");
        uploaded += 1;
    }

    info!(uploaded, "upload request complete");
    Ok(Json(UploadResponse {
        message: "Upload complete.",
    }))
}

#[utoipa::path(
    get,
    path = "/images",
    tag = "Images",
    operation_id = "listImages",
    responses(
        (status = 200, description = "All uploaded images, newest first", body = [InputImageResponse]),
    ),
)]
#[instrument(skip(state))]
pub async fn list_images(
    State(state): State<AppState>,
) -> Result<Json<Vec<InputImageResponse>>, AppError> {
    let rows = input_image::Entity::find()
        .order_by_desc(input_image::Column::UploadTimestamp)
        .all(&state.db)
        .await?;

    Ok(Json(rows.into_iter().map(InputImageResponse::from).collect()))
}
