use axum::http::HeaderValue;
use axum::http::header::{CACHE_CONTROL, EXPIRES};
use axum::routing::any;
use tower_http::set_header::SetResponseHeaderLayer;
use utoipa_axum::{router::OpenApiRouter, routes};

use crate::handlers;
use crate::state::AppState;

/// All core routes, mounted under `/VIPS` by the caller.
pub fn vips_routes() -> OpenApiRouter<AppState> {
    let upload = OpenApiRouter::new()
        .routes(routes!(handlers::images::upload_images))
        .layer(handlers::images::upload_body_limit());

    OpenApiRouter::new()
        .routes(routes!(handlers::images::list_images))
        .routes(routes!(handlers::preview::preview_image))
        .routes(routes!(handlers::pipeline::run_pipeline))
        .routes(routes!(handlers::pipeline::latest_block_image))
        .routes(routes!(handlers::pipeline::block_image_for_input))
        .routes(routes!(handlers::pipeline::project_image))
        .routes(routes!(handlers::pipeline::project_outputs))
        // The toggle answers any method, so it is registered without docs.
        .route(
            "/block/{block_id}/toggle_enabled",
            any(handlers::block::toggle_enabled),
        )
        .merge(upload)
}

/// Header layers forbidding browser caching on every response: derived
/// images change identity under invalidation, and a cached preview would
/// show the patchbay stale pixels.
pub fn no_store_layers() -> [SetResponseHeaderLayer<HeaderValue>; 2] {
    [
        SetResponseHeaderLayer::overriding(
            EXPIRES,
            HeaderValue::from_static("Thu, 01 Jan 1970 00:00:00 GMT"),
        ),
        SetResponseHeaderLayer::overriding(CACHE_CONTROL, HeaderValue::from_static("no-store")),
    ]
}
