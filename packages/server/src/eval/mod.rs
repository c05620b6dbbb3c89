//! The pipeline evaluator.
//!
//! `Evaluator::result_of` walks the `connections` graph upward from a block
//! and materializes that block's output image, consulting the durable cache
//! index and invoking the block's external command on a miss. A request-
//! scoped [`EvalContext`] memoizes per `(block, initial input)` so diamond
//! dependencies evaluate once, and doubles as the cycle detector.

pub mod exec;
pub mod params;

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::PathBuf;

use common::{ImageStore, StoreError};
use futures::FutureExt;
use futures::future::BoxFuture;
use sea_orm::{ColumnTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter};
use serde_json::Value;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::cache;
use crate::entity::{block, block_type, input_image};

use exec::ExecError;

/// Block type names with hardwired behavior.
pub const INPUT_BLOCK: &str = "Input";
pub const LOAD_IMAGE_BLOCK: &str = "Load Image";
pub const IMAGE_PREVIEW_BLOCK: &str = "Image Preview";

/// Why an evaluation failed.
#[derive(Debug)]
pub enum EvalError {
    BlockNotFound(i32),
    BlockTypeNotFound { block: i32, idblock: i32 },
    /// A block was revisited before its own evaluation finished.
    Cycle(i32),
    /// Graph or catalogue misconfiguration (arity, template, missing
    /// command).
    Configuration { block: i32, detail: String },
    /// `Load Image` names a filename with no `input_images` row.
    UnknownImage(String),
    /// An input UUID did not resolve to a file.
    MissingInput { block: i32, uuid: String },
    Execution { block: i32, source: ExecError },
    Db(DbErr),
    Store(StoreError),
}

impl std::fmt::Display for EvalError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BlockNotFound(id) => write!(f, "block {id} does not exist"),
            Self::BlockTypeNotFound { block, idblock } => {
                write!(f, "block {block} references unknown catalogue entry {idblock}")
            }
            Self::Cycle(id) => write!(f, "cycle detected at block {id}"),
            Self::Configuration { block, detail } => {
                write!(f, "block {block} is misconfigured: {detail}")
            }
            Self::UnknownImage(filename) => {
                write!(f, "no input image named {filename:?}")
            }
            Self::MissingInput { block, uuid } => {
                write!(f, "block {block}: input image {uuid} is not in the store")
            }
            Self::Execution { block, source } => {
                write!(f, "block {block} execution failed: {source}")
            }
            Self::Db(err) => write!(f, "database error: {err}"),
            Self::Store(err) => write!(f, "store error: {err}"),
        }
    }
}

impl std::error::Error for EvalError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Execution { source, .. } => Some(source),
            Self::Db(err) => Some(err),
            Self::Store(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DbErr> for EvalError {
    fn from(err: DbErr) -> Self {
        Self::Db(err)
    }
}

impl From<StoreError> for EvalError {
    fn from(err: StoreError) -> Self {
        Self::Store(err)
    }
}

/// Request-scoped evaluation state.
///
/// The memo map is valid for the duration of one request (inclusive of
/// transitive recursion, and shared across all inputs of a batch request);
/// it is distinct from the durable cache index, which memoizes across
/// requests. The in-flight set turns graph cycles into fast failures.
#[derive(Debug, Default)]
pub struct EvalContext {
    memo: HashMap<(i32, Uuid), Uuid>,
    in_flight: HashSet<(i32, Uuid)>,
}

impl EvalContext {
    pub fn new() -> Self {
        Self::default()
    }
}

pub struct Evaluator<'a> {
    db: &'a DatabaseConnection,
    store: &'a ImageStore,
}

impl<'a> Evaluator<'a> {
    pub fn new(db: &'a DatabaseConnection, store: &'a ImageStore) -> Self {
        Self { db, store }
    }

    /// Compute the output UUID of `block_id` for `initial_input`.
    pub async fn result_of(
        &self,
        block_id: i32,
        initial_input: Uuid,
        ctx: &mut EvalContext,
    ) -> Result<Uuid, EvalError> {
        let key = (block_id, initial_input);
        if let Some(&memoized) = ctx.memo.get(&key) {
            return Ok(memoized);
        }
        if !ctx.in_flight.insert(key) {
            return Err(EvalError::Cycle(block_id));
        }

        let result = self.eval_block(block_id, initial_input, ctx).await;

        ctx.in_flight.remove(&key);
        if let Ok(uuid) = &result {
            ctx.memo.insert(key, *uuid);
        }
        result
    }

    /// Type-erased recursion point for `result_of`.
    fn recurse<'s>(
        &'s self,
        block_id: i32,
        initial_input: Uuid,
        ctx: &'s mut EvalContext,
    ) -> BoxFuture<'s, Result<Uuid, EvalError>> {
        self.result_of(block_id, initial_input, ctx).boxed()
    }

    async fn eval_block(
        &self,
        block_id: i32,
        initial_input: Uuid,
        ctx: &mut EvalContext,
    ) -> Result<Uuid, EvalError> {
        let blk = block::Entity::find_by_id(block_id)
            .one(self.db)
            .await?
            .ok_or(EvalError::BlockNotFound(block_id))?;
        let kind = block_type::Entity::find_by_id(blk.idblock)
            .one(self.db)
            .await?
            .ok_or(EvalError::BlockTypeNotFound {
                block: block_id,
                idblock: blk.idblock,
            })?;

        // An explicitly disabled block passes its lexicographically-first
        // input through untouched, with no cache traffic.
        if blk.enabled == Some(false) {
            let connections = connection_map(blk.id, blk.connections.as_ref());
            let upstream = connections.values().next().copied().ok_or_else(|| {
                EvalError::Configuration {
                    block: block_id,
                    detail: "disabled block has no input to pass through".into(),
                }
            })?;
            return self.recurse(upstream, initial_input, ctx).await;
        }

        match kind.name.as_str() {
            INPUT_BLOCK => Ok(initial_input),
            LOAD_IMAGE_BLOCK => self.eval_load_image(&blk).await,
            IMAGE_PREVIEW_BLOCK => {
                let connections = connection_map(blk.id, blk.connections.as_ref());
                let mut upstreams = connections.values();
                match (upstreams.next(), upstreams.next()) {
                    (Some(&upstream), None) => {
                        self.recurse(upstream, initial_input, ctx).await
                    }
                    _ => Err(EvalError::Configuration {
                        block: block_id,
                        detail: format!(
                            "preview block must have exactly one input, found {}",
                            connections.len()
                        ),
                    }),
                }
            }
            _ => self.eval_general(&blk, &kind, initial_input, ctx).await,
        }
    }

    async fn eval_load_image(&self, blk: &block::Model) -> Result<Uuid, EvalError> {
        let filename = blk
            .output_value
            .as_ref()
            .and_then(|settings| settings.get("filename"))
            .and_then(Value::as_str)
            .ok_or_else(|| EvalError::Configuration {
                block: blk.id,
                detail: "load block has no filename setting".into(),
            })?;

        let row = input_image::Entity::find()
            .filter(input_image::Column::OriginalFilename.eq(filename))
            .one(self.db)
            .await?
            .ok_or_else(|| EvalError::UnknownImage(filename.to_string()))?;
        Ok(row.uuid)
    }

    async fn eval_general(
        &self,
        blk: &block::Model,
        kind: &block_type::Model,
        initial_input: Uuid,
        ctx: &mut EvalContext,
    ) -> Result<Uuid, EvalError> {
        // Resolve inputs in lexicographic port order; this fixes the order
        // of input_uuids_json and therefore the cache key.
        let connections = connection_map(blk.id, blk.connections.as_ref());
        let mut input_uuids = Vec::with_capacity(connections.len());
        for (_, upstream) in &connections {
            input_uuids.push(self.recurse(*upstream, initial_input, ctx).await?);
        }

        let parameters_json = canonical_settings_json(blk.output_value.as_ref());
        let input_uuids_json = uuid_list_json(&input_uuids);

        // Consult the durable index; a hit must still be backed by a file.
        if let Some(row) =
            cache::lookup(self.db, blk.id, &parameters_json, &input_uuids_json).await?
        {
            match self.store.resolve(&row.uuid.to_string()).await? {
                Some(_) => {
                    debug!(block = blk.id, uuid = %row.uuid, "cache hit");
                    return Ok(row.uuid);
                }
                None => {
                    // Self-heal: the file vanished under the row.
                    info!(block = blk.id, uuid = %row.uuid, "cache row orphaned, removing");
                    cache::delete_by_uuid(self.db, row.uuid).await?;
                }
            }
        }

        let gui_fields = gui_field_list(kind);
        let assembled = params::assemble(
            blk.output_value.as_ref().unwrap_or(&Value::Null),
            kind.parameter_mappings.as_ref(),
            &gui_fields,
            kind.parameter_template.as_deref(),
        )
        .map_err(|err| EvalError::Configuration {
            block: blk.id,
            detail: err.to_string(),
        })?;

        let mut input_paths = Vec::with_capacity(input_uuids.len());
        for uuid in &input_uuids {
            let path = self
                .store
                .resolve(&uuid.to_string())
                .await?
                .ok_or_else(|| EvalError::MissingInput {
                    block: blk.id,
                    uuid: uuid.to_string(),
                })?;
            input_paths.push(path);
        }

        let command = kind.command.as_deref().ok_or_else(|| {
            EvalError::Configuration {
                block: blk.id,
                detail: format!("block type {:?} has no command", kind.name),
            }
        })?;

        let (output_uuid, output_path) = self.store.allocate_derived();
        info!(
            block = blk.id,
            kind = %kind.name,
            output = %output_uuid,
            "executing block command"
        );

        exec::run(exec::Invocation {
            command,
            block_name: &kind.name,
            input_paths: &input_paths,
            output_path: &output_path,
            positional: &assembled.positional,
            templated: &assembled.templated,
        })
        .await
        .map_err(|source| EvalError::Execution {
            block: blk.id,
            source,
        })?;

        // File first, row second: a cache row never precedes its file.
        cache::insert(
            self.db,
            output_uuid,
            blk.id,
            parameters_json,
            input_uuids_json,
        )
        .await?;

        Ok(output_uuid)
    }

    /// Resolve an already-evaluated UUID to a servable path.
    pub async fn resolve_output(&self, uuid: Uuid) -> Result<Option<PathBuf>, EvalError> {
        Ok(self.store.resolve(&uuid.to_string()).await?)
    }
}

/// Parse a block's `connections` value into upstream ids keyed by port
/// name. BTreeMap iteration gives the lexicographic port order the
/// evaluator relies on.
pub fn connection_map(block_id: i32, connections: Option<&Value>) -> BTreeMap<String, i32> {
    let Some(object) = connections.and_then(Value::as_object) else {
        return BTreeMap::new();
    };

    let mut map = BTreeMap::new();
    for (port, upstream) in object {
        let id = match upstream {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.parse::<i64>().ok(),
            _ => None,
        };
        let Some(id) = id else {
            warn!(block = block_id, port = %port, "ignoring non-numeric connection");
            continue;
        };
        map.insert(port.clone(), id as i32);
    }
    map
}

/// Canonical serialization of a block's settings object. serde_json
/// serializes object keys in sorted order, so two settings objects that
/// differ only in key order produce the same cache key.
fn canonical_settings_json(settings: Option<&Value>) -> String {
    match settings {
        Some(value) => serde_json::to_string(value).unwrap_or_else(|_| "{}".into()),
        None => "{}".into(),
    }
}

fn uuid_list_json(uuids: &[Uuid]) -> String {
    let strings: Vec<String> = uuids.iter().map(Uuid::to_string).collect();
    serde_json::to_string(&strings).unwrap_or_else(|_| "[]".into())
}

fn gui_field_list(kind: &block_type::Model) -> Vec<String> {
    kind.gui_fields
        .as_ref()
        .and_then(Value::as_array)
        .map(|fields| {
            fields
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// The project's terminal block: the one whose catalogue entry declares no
/// outputs.
pub async fn find_terminal_block(
    db: &DatabaseConnection,
    idproject: i32,
) -> Result<Option<block::Model>, DbErr> {
    let blocks = block::Entity::find()
        .filter(block::Column::Idproject.eq(idproject))
        .all(db)
        .await?;
    if blocks.is_empty() {
        return Ok(None);
    }

    let type_ids: Vec<i32> = blocks.iter().map(|b| b.idblock).collect();
    let kinds = block_type::Entity::find()
        .filter(block_type::Column::Id.is_in(type_ids))
        .all(db)
        .await?;
    let terminal_types: HashSet<i32> = kinds
        .iter()
        .filter(|k| k.outputs.is_none())
        .map(|k| k.id)
        .collect();

    Ok(blocks
        .into_iter()
        .find(|b| terminal_types.contains(&b.idblock)))
}
