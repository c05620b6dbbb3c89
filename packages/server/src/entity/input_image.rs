use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "input_images")]
pub struct Model {
    /// Content handle; a file named `{uuid}[.ext]` exists in the store root
    /// at record-creation time.
    #[sea_orm(primary_key, auto_increment = false)]
    pub uuid: Uuid,

    /// Filename as supplied by the uploader.
    #[sea_orm(indexed)]
    pub original_filename: String,

    pub upload_timestamp: DateTimeUtc,
}

impl ActiveModelBehavior for ActiveModel {}
