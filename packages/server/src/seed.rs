use sea_orm::sea_query::{Index, PostgresQueryBuilder};
use sea_orm::*;
use tracing::info;

use crate::entity::image_cache;

/// Ensure the secondary indexes the hot paths rely on.
pub async fn ensure_indexes(db: &DatabaseConnection) -> Result<(), DbErr> {
    // Consult index for the cache key:
    // SELECT * FROM image_cache WHERE idblock = ? AND parameters_json = ? AND input_uuids_json = ?
    let stmt = Index::create()
        .if_not_exists()
        .name("idx_image_cache_key")
        .table(image_cache::Entity)
        .col(image_cache::Column::Idblock)
        .col(image_cache::Column::ParametersJson)
        .col(image_cache::Column::InputUuidsJson)
        .to_string(PostgresQueryBuilder);

    match db.execute_unprepared(&stmt).await {
        Ok(_) => {
            info!("Ensured index idx_image_cache_key exists");
        }
        Err(e) => {
            tracing::warn!("Failed to create index idx_image_cache_key: {}", e);
        }
    }

    Ok(())
}
