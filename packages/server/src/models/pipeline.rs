use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Deserialize, ToSchema)]
pub struct RunRequest {
    pub idproject: i32,
    pub input_uuid: String,
}

#[derive(Serialize, ToSchema)]
pub struct RunResponse {
    pub result_uuid: String,
    pub url: String,
}

#[derive(Deserialize, ToSchema)]
pub struct OutputsRequest {
    pub input_uuids: Vec<String>,
}

/// Per-input result of a batch evaluation. Exactly one of `output_uuid` /
/// `error` is present.
#[derive(Serialize, ToSchema)]
pub struct OutputEntry {
    pub input_uuid: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_uuid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl OutputEntry {
    pub fn ok(input_uuid: String, output_uuid: uuid::Uuid) -> Self {
        Self {
            input_uuid,
            url: Some(format!("/VIPS/preview/{output_uuid}")),
            output_uuid: Some(output_uuid.to_string()),
            error: None,
        }
    }

    pub fn failed(input_uuid: String, error: String) -> Self {
        Self {
            input_uuid,
            output_uuid: None,
            url: None,
            error: Some(error),
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct ToggleResponse {
    pub success: u8,
    #[serde(rename = "newState")]
    pub new_state: u8,
}
