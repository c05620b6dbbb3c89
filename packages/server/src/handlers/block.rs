use axum::Json;
use axum::extract::{Path, State};
use tracing::{info, instrument};

use crate::error::AppError;
use crate::invalidation;
use crate::models::pipeline::ToggleResponse;
use crate::state::AppState;

/// Flip a block's enabled flag.
///
/// Disabling deletes the physical files behind every cache row in the
/// block's downstream closure, so nothing stale can be served afterwards.
/// Registered for any HTTP method.
#[instrument(skip(state))]
pub async fn toggle_enabled(
    State(state): State<AppState>,
    Path(block_id): Path<i32>,
) -> Result<Json<ToggleResponse>, AppError> {
    let new_state = invalidation::toggle_enabled(&state.db, &state.store, block_id).await?;

    info!(block = block_id, enabled = new_state, "toggled block");
    Ok(Json(ToggleResponse {
        success: 1,
        new_state: new_state as u8,
    }))
}
