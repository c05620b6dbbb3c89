use std::net::SocketAddr;
use std::time::Duration;

use axum::http::{HeaderName, HeaderValue, Method};
use common::ImageStore;
use tower_http::cors::CorsLayer;
use tracing::{Level, info};

use server::config::AppConfig;
use server::state::AppState;
use server::{build_router, database, seed};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .with_target(false)
        .init();

    let config = AppConfig::load()?;

    let db = database::init_db(&config.database).await?;
    seed::ensure_indexes(&db).await?;

    let store = ImageStore::open(config.store.root.clone()).await?;
    info!(root = %store.root().display(), "image store ready");

    let mut cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([HeaderName::from_static("content-type")])
        .max_age(Duration::from_secs(config.server.cors.max_age));
    for origin in &config.server.cors.allow_origins {
        cors = cors.allow_origin(origin.parse::<HeaderValue>()?);
    }

    let addr = SocketAddr::new(config.server.host.parse()?, config.server.port);
    let state = AppState {
        db,
        config,
        store,
    };

    let app = build_router(state).layer(cors);

    info!("Server running at http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
