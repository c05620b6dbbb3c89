//! Disable-toggle invalidation: the downstream closure loses its cached
//! files, and a disabled block acts as identity on the next run.

use sea_orm::EntityTrait;
use serde_json::json;

use server::entity::image_cache;
use server::eval::{EvalContext, Evaluator};
use server::invalidation::toggle_enabled;

use crate::common::TestEnv;

/// Chain: Input -> Invert -> Blur (terminal general block). Disabling
/// Invert removes the cached files of Invert *and* Blur.
#[tokio::test]
async fn disabling_removes_downstream_files() {
    let env = TestEnv::new().await;
    let input_type = env.block_type("Input", None, None, None, false).await;
    let counter = env.counter_path("runs");
    let tool = env.copy_tool("tool", &counter);
    let invert_type = env
        .block_type("Invert", Some(&tool), None, None, false)
        .await;
    // The terminal is a general block here so both closure members own
    // cache rows.
    let blur_type = env.block_type("Blur", Some(&tool), None, None, true).await;

    let image = env.seed_input("a.png", b"pixels").await;
    let input = env.block(1, input_type, None, None, None).await;
    let invert = env
        .block(1, invert_type, Some(json!({"in": input})), Some(json!({})), None)
        .await;
    let blur = env
        .block(1, blur_type, Some(json!({"in": invert})), Some(json!({})), None)
        .await;

    let evaluator = Evaluator::new(&env.db, &env.store);
    let mut ctx = EvalContext::new();
    let first = evaluator.result_of(blur, image, &mut ctx).await.unwrap();

    assert_eq!(env.derived_files().len(), 2);
    assert_eq!(
        image_cache::Entity::find().all(&env.db).await.unwrap().len(),
        2
    );

    // absent -> false, with downstream invalidation.
    let new_state = toggle_enabled(&env.db, &env.store, invert).await.unwrap();
    assert!(!new_state);

    // No file referenced by any cache row of the closure survives.
    assert!(env.derived_files().is_empty());
    assert!(
        image_cache::Entity::find()
            .all(&env.db)
            .await
            .unwrap()
            .is_empty()
    );

    // The next run passes through the disabled Invert: Blur now consumes
    // the raw input and produces a fresh output.
    let mut ctx = EvalContext::new();
    let second = evaluator.result_of(blur, image, &mut ctx).await.unwrap();
    assert_ne!(second, first);

    let rows = image_cache::Entity::find().all(&env.db).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].idblock, blur);
    assert_eq!(rows[0].input_uuids_json, format!(r#"["{image}"]"#));
}

/// Disabling a mid-graph block leaves unrelated ancestors' caches alone.
#[tokio::test]
async fn invalidation_spares_ancestors() {
    let env = TestEnv::new().await;
    let input_type = env.block_type("Input", None, None, None, false).await;
    let counter = env.counter_path("runs");
    let tool = env.copy_tool("tool", &counter);
    let a_type = env.block_type("Sharpen", Some(&tool), None, None, false).await;
    let b_type = env.block_type("Blur", Some(&tool), None, None, true).await;

    let image = env.seed_input("a.png", b"pixels").await;
    let input = env.block(1, input_type, None, None, None).await;
    let ancestor = env
        .block(1, a_type, Some(json!({"in": input})), Some(json!({})), None)
        .await;
    let descendant = env
        .block(1, b_type, Some(json!({"in": ancestor})), Some(json!({})), None)
        .await;

    let evaluator = Evaluator::new(&env.db, &env.store);
    let mut ctx = EvalContext::new();
    evaluator.result_of(descendant, image, &mut ctx).await.unwrap();
    assert_eq!(env.derived_files().len(), 2);

    toggle_enabled(&env.db, &env.store, descendant).await.unwrap();

    // Only the descendant's output is gone.
    assert_eq!(env.derived_files().len(), 1);
    let rows = image_cache::Entity::find().all(&env.db).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].idblock, ancestor);
}

/// Toggling twice re-enables; enabling invalidates nothing.
#[tokio::test]
async fn toggle_round_trip() {
    let env = TestEnv::new().await;
    let counter = env.counter_path("runs");
    let tool = env.copy_tool("tool", &counter);
    let kind = env.block_type("Invert", Some(&tool), None, None, false).await;
    let block = env.block(1, kind, None, Some(json!({})), None).await;

    assert!(!toggle_enabled(&env.db, &env.store, block).await.unwrap());
    assert!(toggle_enabled(&env.db, &env.store, block).await.unwrap());
}
