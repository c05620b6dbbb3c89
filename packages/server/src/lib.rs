pub mod cache;
pub mod config;
pub mod database;
pub mod entity;
pub mod error;
pub mod eval;
pub mod handlers;
pub mod invalidation;
pub mod models;
pub mod routes;
pub mod seed;
pub mod state;
pub mod thumbs;
pub mod utils;

use crate::state::AppState;

/// Build the application router.
pub fn build_router(state: AppState) -> axum::Router {
    let (router, _api) = routes::vips_routes().split_for_parts();
    let [expires, cache_control] = routes::no_store_layers();

    axum::Router::new()
        .nest("/VIPS", router)
        .layer(expires)
        .layer(cache_control)
        .with_state(state)
}
