use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Catalogue of block *types*. `name` also dispatches the special behaviors
/// (`Input`, `Load Image`, `Image Preview`); everything else runs `command`.
#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "blocks_catalogue")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    pub name: String,

    /// External executable path. NULL for the special block kinds.
    pub command: Option<String>,

    /// printf-style template whose `%s`/`%d` placeholders are filled from
    /// settings; may also carry literal flag tokens.
    pub parameter_template: Option<String>,

    /// Nested mapping: field name -> { raw value -> substituted value }.
    #[sea_orm(column_type = "JsonBinary", nullable)]
    pub parameter_mappings: Option<Json>,

    /// Ordered list of user-exposed setting names.
    #[sea_orm(column_type = "JsonBinary", nullable)]
    pub gui_fields: Option<Json>,

    /// Declared output ports. NULL marks the terminal block type of a
    /// project.
    #[sea_orm(column_type = "JsonBinary", nullable)]
    pub outputs: Option<Json>,

    #[sea_orm(has_many)]
    pub instances: HasMany<super::block::Entity>,
}

impl ActiveModelBehavior for ActiveModel {}
