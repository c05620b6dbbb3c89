use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Serialize, ToSchema)]
pub struct UploadResponse {
    pub message: &'static str,
}

/// One uploaded image as presented to the picker list.
#[derive(Serialize, ToSchema)]
pub struct InputImageResponse {
    pub uuid: Uuid,
    pub original_filename: String,
    pub upload_timestamp: DateTime<Utc>,
}

impl From<crate::entity::input_image::Model> for InputImageResponse {
    fn from(model: crate::entity::input_image::Model) -> Self {
        Self {
            uuid: model.uuid,
            original_filename: model.original_filename,
            upload_timestamp: model.upload_timestamp,
        }
    }
}
