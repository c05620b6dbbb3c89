use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// A block *instance*: position in a project's graph, wiring, and settings.
#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "blocks")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    #[sea_orm(indexed)]
    pub idproject: i32,

    /// Block type this instance is an occurrence of.
    pub idblock: i32,

    /// Mapping: input-port name -> upstream block instance id. The edges it
    /// defines must form a DAG within the project.
    #[sea_orm(column_type = "JsonBinary", nullable)]
    pub connections: Option<Json>,

    /// Per-instance settings object as supplied by the frontend.
    #[sea_orm(column_type = "JsonBinary", nullable)]
    pub output_value: Option<Json>,

    /// Tri-valued: absent means enabled.
    pub enabled: Option<bool>,

    #[sea_orm(belongs_to, from = "idblock", to = "id")]
    pub block_type: HasOne<super::block_type::Entity>,
}

impl ActiveModelBehavior for ActiveModel {}
