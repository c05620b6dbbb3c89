//! Cache index operations over `image_cache`.
//!
//! All operations are single-statement; the core needs no multi-statement
//! transactions. Self-heal (delete of an orphaned row) is a lookup followed
//! by a conditional delete; double deletion is idempotent.

use chrono::Utc;
use sea_orm::{ColumnTrait, DbErr, EntityTrait, QueryFilter, QueryOrder, Set};
use sea_orm::{ConnectionTrait, QuerySelect};
use uuid::Uuid;

use crate::entity::image_cache;

/// Look up the derived image recorded for a cache key.
pub async fn lookup<C: ConnectionTrait>(
    db: &C,
    idblock: i32,
    parameters_json: &str,
    input_uuids_json: &str,
) -> Result<Option<image_cache::Model>, DbErr> {
    image_cache::Entity::find()
        .filter(image_cache::Column::Idblock.eq(idblock))
        .filter(image_cache::Column::ParametersJson.eq(parameters_json))
        .filter(image_cache::Column::InputUuidsJson.eq(input_uuids_json))
        .one(db)
        .await
}

/// Record a derived image for a cache key.
///
/// The caller guarantees the file already exists on disk. Two concurrent
/// executions of the same key both insert; the later row is the canonical
/// mapping and the earlier file becomes an orphan collected by self-heal.
pub async fn insert<C: ConnectionTrait>(
    db: &C,
    uuid: Uuid,
    idblock: i32,
    parameters_json: String,
    input_uuids_json: String,
) -> Result<(), DbErr> {
    let row = image_cache::ActiveModel {
        uuid: Set(uuid),
        idblock: Set(idblock),
        parameters_json: Set(parameters_json),
        input_uuids_json: Set(input_uuids_json),
        creation_timestamp: Set(Utc::now()),
    };
    image_cache::Entity::insert(row)
        .exec_without_returning(db)
        .await?;
    Ok(())
}

/// Delete the row for a derived image. Idempotent.
pub async fn delete_by_uuid<C: ConnectionTrait>(db: &C, uuid: Uuid) -> Result<(), DbErr> {
    image_cache::Entity::delete_many()
        .filter(image_cache::Column::Uuid.eq(uuid))
        .exec(db)
        .await?;
    Ok(())
}

/// All derived-image UUIDs recorded for the given block instances.
pub async fn list_uuids_for_blocks<C: ConnectionTrait>(
    db: &C,
    ids: &[i32],
) -> Result<Vec<Uuid>, DbErr> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }
    image_cache::Entity::find()
        .select_only()
        .column(image_cache::Column::Uuid)
        .filter(image_cache::Column::Idblock.is_in(ids.iter().copied()))
        .into_tuple()
        .all(db)
        .await
}

/// Newest row for a block instance, if any.
pub async fn latest_for_block<C: ConnectionTrait>(
    db: &C,
    idblock: i32,
) -> Result<Option<image_cache::Model>, DbErr> {
    image_cache::Entity::find()
        .filter(image_cache::Column::Idblock.eq(idblock))
        .order_by_desc(image_cache::Column::CreationTimestamp)
        .one(db)
        .await
}
