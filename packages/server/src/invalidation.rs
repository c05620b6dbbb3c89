//! Enable/disable toggling with downstream cache invalidation.
//!
//! Disabling a block makes every cached output at or below it stale, so the
//! toggle deletes the physical files referenced by cache rows for the whole
//! downstream closure. Rows are deleted eagerly as well; a row that slips
//! through self-heals on the next lookup. Enabling invalidates nothing.

use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;

use common::{ImageStore, StoreError};
use sea_orm::{ActiveModelTrait, ColumnTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter, Set};
use tracing::info;

use crate::cache;
use crate::entity::block;
use crate::eval::connection_map;

#[derive(Debug)]
pub enum InvalidateError {
    BlockNotFound(i32),
    Db(DbErr),
    Store(StoreError),
}

impl fmt::Display for InvalidateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BlockNotFound(id) => write!(f, "block {id} does not exist"),
            Self::Db(err) => write!(f, "database error: {err}"),
            Self::Store(err) => write!(f, "store error: {err}"),
        }
    }
}

impl std::error::Error for InvalidateError {}

impl From<DbErr> for InvalidateError {
    fn from(err: DbErr) -> Self {
        Self::Db(err)
    }
}

impl From<StoreError> for InvalidateError {
    fn from(err: StoreError) -> Self {
        Self::Store(err)
    }
}

/// Flip a block's enabled flag. Returns the new state.
///
/// absent/true -> false (with downstream invalidation); false -> true.
pub async fn toggle_enabled(
    db: &DatabaseConnection,
    store: &ImageStore,
    block_id: i32,
) -> Result<bool, InvalidateError> {
    let blk = block::Entity::find_by_id(block_id)
        .one(db)
        .await?
        .ok_or(InvalidateError::BlockNotFound(block_id))?;

    let new_state = !blk.enabled.unwrap_or(true);
    let idproject = blk.idproject;

    let mut active: block::ActiveModel = blk.into();
    active.enabled = Set(Some(new_state));
    active.update(db).await?;

    if !new_state {
        invalidate_downstream(db, store, idproject, block_id).await?;
    }
    Ok(new_state)
}

/// Delete the cached outputs of every block in the downstream closure of
/// `start` (inclusive) within its project.
async fn invalidate_downstream(
    db: &DatabaseConnection,
    store: &ImageStore,
    idproject: i32,
    start: i32,
) -> Result<(), InvalidateError> {
    // One batched fetch feeds the whole walk.
    let blocks = block::Entity::find()
        .filter(block::Column::Idproject.eq(idproject))
        .all(db)
        .await?;

    let mut edges = Vec::new();
    for blk in &blocks {
        for (_, upstream) in connection_map(blk.id, blk.connections.as_ref()) {
            edges.push((blk.id, upstream));
        }
    }

    let closure = downstream_closure(&edges, start);
    let uuids = cache::list_uuids_for_blocks(db, &closure).await?;

    let mut removed = 0usize;
    for uuid in uuids {
        if let Some(path) = store.resolve(&uuid.to_string()).await? {
            if store.remove_file(&path).await? {
                removed += 1;
            }
        }
        cache::delete_by_uuid(db, uuid).await?;
    }

    info!(
        block = start,
        blocks_invalidated = closure.len(),
        files_removed = removed,
        "downstream cache invalidated"
    );
    Ok(())
}

/// BFS over the edge relation "B depends on A" starting at `start`,
/// inclusive. Edges are `(dependent, upstream)` pairs.
fn downstream_closure(edges: &[(i32, i32)], start: i32) -> Vec<i32> {
    // dependents[a] = blocks whose connections reference a.
    let mut dependents: HashMap<i32, Vec<i32>> = HashMap::new();
    for &(dependent, upstream) in edges {
        dependents.entry(upstream).or_default().push(dependent);
    }

    let mut seen: HashSet<i32> = HashSet::from([start]);
    let mut queue: VecDeque<i32> = VecDeque::from([start]);
    let mut closure = Vec::new();
    while let Some(id) = queue.pop_front() {
        closure.push(id);
        if let Some(next) = dependents.get(&id) {
            for &dependent in next {
                if seen.insert(dependent) {
                    queue.push_back(dependent);
                }
            }
        }
    }
    closure
}
