use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Durable memoization index for derived images.
///
/// The triple `(idblock, parameters_json, input_uuids_json)` is the cache
/// key; `uuid` is the derived image it produced. Rows may be orphaned (file
/// deleted out from under them); lookups self-heal by deleting such rows.
#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "image_cache")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub uuid: Uuid,

    /// Block *instance* id, not type id: two identically configured
    /// instances do not share rows.
    #[sea_orm(indexed)]
    pub idblock: i32,

    /// Canonical serialization of the block's settings object.
    #[sea_orm(column_type = "Text")]
    pub parameters_json: String,

    /// Ordered list of the input UUIDs consumed.
    #[sea_orm(column_type = "Text")]
    pub input_uuids_json: String,

    pub creation_timestamp: DateTimeUtc,
}

impl ActiveModelBehavior for ActiveModel {}
