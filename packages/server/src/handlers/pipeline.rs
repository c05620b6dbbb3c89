use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::response::Response;
use tracing::{info, instrument};
use uuid::Uuid;

use super::serve::{serve_file, serve_png};
use crate::cache;
use crate::error::{AppError, ErrorBody};
use crate::eval::{self, EvalContext, EvalError, Evaluator};
use crate::models::pipeline::{OutputEntry, OutputsRequest, RunRequest, RunResponse};
use crate::state::AppState;

#[utoipa::path(
    post,
    path = "/run",
    tag = "Pipeline",
    operation_id = "runPipeline",
    summary = "Evaluate a project's terminal block",
    description = "Walks the project's block graph upward from its terminal block, reusing \
        cached derived images where possible and invoking block commands for the rest, and \
        returns the UUID of the resulting image.",
    request_body = RunRequest,
    responses(
        (status = 200, description = "Pipeline result", body = RunResponse),
        (status = 404, description = "Project has no terminal block", body = ErrorBody),
        (status = 500, description = "Evaluation failed", body = ErrorBody),
    ),
)]
#[instrument(skip(state, payload))]
pub async fn run_pipeline(
    State(state): State<AppState>,
    payload: Result<Json<RunRequest>, JsonRejection>,
) -> Result<Json<RunResponse>, AppError> {
    let Json(request) = payload.map_err(reject_pipeline_json)?;
    let input = parse_uuid(&request.input_uuid)?;
    let terminal = eval::find_terminal_block(&state.db, request.idproject)
        .await?
        .ok_or_else(|| {
            AppError::NotFound(format!("Project {} has no terminal block", request.idproject))
        })?;

    let evaluator = Evaluator::new(&state.db, &state.store);
    let mut ctx = EvalContext::new();
    let result = evaluator.result_of(terminal.id, input, &mut ctx).await?;

    info!(idproject = request.idproject, result = %result, "pipeline evaluated");
    Ok(Json(RunResponse {
        result_uuid: result.to_string(),
        url: format!("/VIPS/preview/{result}"),
    }))
}

#[utoipa::path(
    get,
    path = "/block/{block_id}/image",
    tag = "Pipeline",
    operation_id = "latestBlockImage",
    params(("block_id" = i32, Path)),
    responses(
        (status = 200, description = "Most recent cached output, as PNG", content_type = "image/png"),
        (status = 404, description = "No cached output", body = ErrorBody),
    ),
)]
#[instrument(skip(state))]
pub async fn latest_block_image(
    State(state): State<AppState>,
    Path(block_id): Path<i32>,
) -> Result<Response, AppError> {
    let row = cache::latest_for_block(&state.db, block_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("No cached output for block {block_id}")))?;

    match state.store.resolve(&row.uuid.to_string()).await? {
        Some(path) => serve_png(&path).await,
        None => {
            // The newest row lost its file; heal it and report nothing.
            cache::delete_by_uuid(&state.db, row.uuid).await?;
            Err(AppError::NotFound(format!(
                "No cached output for block {block_id}"
            )))
        }
    }
}

#[utoipa::path(
    get,
    path = "/block/{block_id}/image/{input_uuid}",
    tag = "Pipeline",
    operation_id = "blockImageForInput",
    params(("block_id" = i32, Path), ("input_uuid" = String, Path)),
    responses(
        (status = 200, description = "Evaluated output image", content_type = "image/*"),
        (status = 404, description = "Evaluation failed", body = ErrorBody),
    ),
)]
#[instrument(skip(state))]
pub async fn block_image_for_input(
    State(state): State<AppState>,
    Path((block_id, input_uuid)): Path<(i32, String)>,
) -> Result<Response, AppError> {
    let input = parse_uuid(&input_uuid)?;

    let evaluator = Evaluator::new(&state.db, &state.store);
    let mut ctx = EvalContext::new();
    let result = match evaluator.result_of(block_id, input, &mut ctx).await {
        Ok(uuid) => uuid,
        // This route reports any evaluation outcome as absence.
        Err(err @ (EvalError::Db(_) | EvalError::Store(_))) => return Err(err.into()),
        Err(err) => return Err(AppError::NotFound(err.to_string())),
    };

    let path = evaluator
        .resolve_output(result)
        .await
        .map_err(AppError::from)?
        .ok_or_else(|| AppError::NotFound(format!("No image {result}")))?;
    serve_file(&path).await
}

#[utoipa::path(
    get,
    path = "/project/{projectid}/image/{input_uuid}",
    tag = "Pipeline",
    operation_id = "projectImage",
    params(("projectid" = i32, Path), ("input_uuid" = String, Path)),
    responses(
        (status = 200, description = "Terminal block output, as PNG", content_type = "image/png"),
        (status = 404, description = "Project has no terminal block", body = ErrorBody),
        (status = 500, description = "Evaluation failed", body = ErrorBody),
    ),
)]
#[instrument(skip(state))]
pub async fn project_image(
    State(state): State<AppState>,
    Path((projectid, input_uuid)): Path<(i32, String)>,
) -> Result<Response, AppError> {
    let input = parse_uuid(&input_uuid)?;
    let terminal = eval::find_terminal_block(&state.db, projectid)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Project {projectid} has no terminal block")))?;

    let evaluator = Evaluator::new(&state.db, &state.store);
    let mut ctx = EvalContext::new();
    let result = evaluator.result_of(terminal.id, input, &mut ctx).await?;

    let path = evaluator
        .resolve_output(result)
        .await
        .map_err(AppError::from)?
        .ok_or_else(|| AppError::NotFound(format!("No image {result}")))?;
    serve_png(&path).await
}

#[utoipa::path(
    post,
    path = "/project/{projectid}/outputs",
    tag = "Pipeline",
    operation_id = "projectOutputs",
    summary = "Evaluate the terminal block for a batch of inputs",
    params(("projectid" = i32, Path)),
    request_body = OutputsRequest,
    responses(
        (status = 200, description = "Per-input results, input order preserved", body = [OutputEntry]),
        (status = 404, description = "Project has no terminal block", body = ErrorBody),
    ),
)]
#[instrument(skip(state, payload))]
pub async fn project_outputs(
    State(state): State<AppState>,
    Path(projectid): Path<i32>,
    payload: Result<Json<OutputsRequest>, JsonRejection>,
) -> Result<Json<Vec<OutputEntry>>, AppError> {
    let Json(request) = payload.map_err(reject_pipeline_json)?;
    info!(inputs = request.input_uuids.len(), "batch evaluation requested");
    let terminal = eval::find_terminal_block(&state.db, projectid)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Project {projectid} has no terminal block")))?;

    let evaluator = Evaluator::new(&state.db, &state.store);
    // One memoization map spans the whole batch; keying by (block, input)
    // keeps per-input results distinct.
    let mut ctx = EvalContext::new();

    let mut entries = Vec::with_capacity(request.input_uuids.len());
    for raw in request.input_uuids {
        let entry = match Uuid::parse_str(&raw) {
            Err(_) => OutputEntry::failed(raw, "invalid input uuid".into()),
            Ok(input) => match evaluator.result_of(terminal.id, input, &mut ctx).await {
                Ok(output) => OutputEntry::ok(raw, output),
                Err(err) => OutputEntry::failed(raw, err.to_string()),
            },
        };
        entries.push(entry);
    }

    Ok(Json(entries))
}

fn parse_uuid(raw: &str) -> Result<Uuid, AppError> {
    Uuid::parse_str(raw).map_err(|_| AppError::Validation(format!("Invalid input uuid: {raw}")))
}

/// Map a malformed pipeline request body onto the structured error
/// envelope, so clients see the same `{code, message}` shape as every other
/// failure.
fn reject_pipeline_json(rejection: JsonRejection) -> AppError {
    AppError::Validation(rejection.body_text())
}
