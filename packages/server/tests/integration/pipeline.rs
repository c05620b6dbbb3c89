//! End-to-end evaluator scenarios against a real store, database, and stub
//! block commands.

use sea_orm::EntityTrait;
use serde_json::json;
use uuid::Uuid;

use server::entity::image_cache;
use server::eval::{EvalContext, EvalError, Evaluator};

use crate::common::TestEnv;

async fn cache_rows(env: &TestEnv) -> Vec<image_cache::Model> {
    image_cache::Entity::find().all(&env.db).await.unwrap()
}

/// Upload -> identity pipeline: Input feeding the terminal preview is a
/// pure pass-through.
#[tokio::test]
async fn identity_pipeline_returns_the_input() {
    let env = TestEnv::new().await;
    let types = env.special_types().await;
    let image = env.seed_input("a.png", b"pixels").await;

    let input = env.block(1, types.input, None, None, None).await;
    let preview = env
        .block(1, types.preview_terminal, Some(json!({"in": input})), None, None)
        .await;

    let evaluator = Evaluator::new(&env.db, &env.store);
    let mut ctx = EvalContext::new();
    let result = evaluator.result_of(preview, image, &mut ctx).await.unwrap();

    assert_eq!(result, image);
    // Pass-throughs produce no derived file and no cache row.
    assert!(env.derived_files().is_empty());
    assert!(cache_rows(&env).await.is_empty());

    // Re-running changes nothing.
    let mut ctx = EvalContext::new();
    let again = evaluator.result_of(preview, image, &mut ctx).await.unwrap();
    assert_eq!(again, image);
    assert!(env.derived_files().is_empty());
}

/// General block: first run executes and caches, second run hits the index
/// without spawning the command.
#[tokio::test]
async fn general_block_misses_then_hits() {
    let env = TestEnv::new().await;
    let types = env.special_types().await;
    let counter = env.counter_path("invert_runs");
    let tool = env.copy_tool("invert", &counter);
    let invert_type = env
        .block_type("Invert", Some(&tool), None, None, false)
        .await;

    let image = env.seed_input("a.png", b"pixels").await;
    let input = env.block(1, types.input, None, None, None).await;
    let invert = env
        .block(1, invert_type, Some(json!({"in": input})), Some(json!({})), None)
        .await;
    let preview = env
        .block(1, types.preview_terminal, Some(json!({"in": invert})), None, None)
        .await;

    let evaluator = Evaluator::new(&env.db, &env.store);

    let mut ctx = EvalContext::new();
    let first = evaluator.result_of(preview, image, &mut ctx).await.unwrap();
    assert_ne!(first, image);
    assert_eq!(env.invocations(&counter), 1);
    assert_eq!(env.derived_files().len(), 1);

    let rows = cache_rows(&env).await;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].uuid, first);
    assert_eq!(rows[0].idblock, invert);
    assert_eq!(rows[0].input_uuids_json, format!(r#"["{image}"]"#));

    // Second evaluation in a fresh request context: cache hit, no new
    // process, no new file.
    let mut ctx = EvalContext::new();
    let second = evaluator.result_of(preview, image, &mut ctx).await.unwrap();
    assert_eq!(second, first);
    assert_eq!(env.invocations(&counter), 1);
    assert_eq!(env.derived_files().len(), 1);
}

/// Deleting the derived file behind a cache row forces a re-execution and
/// removes the stale row.
#[tokio::test]
async fn orphaned_cache_row_self_heals() {
    let env = TestEnv::new().await;
    let types = env.special_types().await;
    let counter = env.counter_path("invert_runs");
    let tool = env.copy_tool("invert", &counter);
    let invert_type = env
        .block_type("Invert", Some(&tool), None, None, false)
        .await;

    let image = env.seed_input("a.png", b"pixels").await;
    let input = env.block(1, types.input, None, None, None).await;
    let invert = env
        .block(1, invert_type, Some(json!({"in": input})), Some(json!({})), None)
        .await;

    let evaluator = Evaluator::new(&env.db, &env.store);
    let mut ctx = EvalContext::new();
    let first = evaluator.result_of(invert, image, &mut ctx).await.unwrap();

    // Forcibly delete the derived file out from under the index.
    let path = env.store.resolve(&first.to_string()).await.unwrap().unwrap();
    tokio::fs::remove_file(&path).await.unwrap();

    let mut ctx = EvalContext::new();
    let second = evaluator.result_of(invert, image, &mut ctx).await.unwrap();
    assert_ne!(second, first);
    assert_eq!(env.invocations(&counter), 2);

    let rows = cache_rows(&env).await;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].uuid, second);
}

/// Two instances of the same type with the same settings do not share cache
/// rows: the key is the instance id.
#[tokio::test]
async fn cache_key_is_scoped_by_instance() {
    let env = TestEnv::new().await;
    let types = env.special_types().await;
    let counter = env.counter_path("invert_runs");
    let tool = env.copy_tool("invert", &counter);
    let invert_type = env
        .block_type("Invert", Some(&tool), None, None, false)
        .await;

    let image = env.seed_input("a.png", b"pixels").await;
    let input = env.block(1, types.input, None, None, None).await;
    let first_instance = env
        .block(1, invert_type, Some(json!({"in": input})), Some(json!({})), None)
        .await;
    let second_instance = env
        .block(1, invert_type, Some(json!({"in": input})), Some(json!({})), None)
        .await;

    let evaluator = Evaluator::new(&env.db, &env.store);
    let mut ctx = EvalContext::new();
    let a = evaluator
        .result_of(first_instance, image, &mut ctx)
        .await
        .unwrap();
    let b = evaluator
        .result_of(second_instance, image, &mut ctx)
        .await
        .unwrap();

    assert_ne!(a, b);
    assert_eq!(env.invocations(&counter), 2);
    assert_eq!(cache_rows(&env).await.len(), 2);
}

/// A diamond above the terminal block evaluates its shared ancestor once
/// per request.
#[tokio::test]
async fn diamond_ancestor_evaluates_once() {
    let env = TestEnv::new().await;
    let types = env.special_types().await;
    let counter_a = env.counter_path("a_runs");
    let counter_m = env.counter_path("m_runs");
    let tool_a = env.copy_tool("tool_a", &counter_a);
    // Two-input merge: argv is [name, in1, in2, output].
    let tool_m = env.tool(
        "tool_m",
        &format!("echo run >> {}\ncat \"$2\" \"$3\" > \"$4\"", counter_m.display()),
    );

    let type_a = env.block_type("Sharpen", Some(&tool_a), None, None, false).await;
    let type_m = env.block_type("Blend", Some(&tool_m), None, None, false).await;

    let image = env.seed_input("a.png", b"pixels").await;
    let input = env.block(1, types.input, None, None, None).await;
    let shared = env
        .block(1, type_a, Some(json!({"in": input})), Some(json!({})), None)
        .await;
    let merge = env
        .block(
            1,
            type_m,
            Some(json!({"left": shared, "right": shared})),
            Some(json!({})),
            None,
        )
        .await;

    let evaluator = Evaluator::new(&env.db, &env.store);
    let mut ctx = EvalContext::new();
    evaluator.result_of(merge, image, &mut ctx).await.unwrap();

    // The shared ancestor ran once; request-local memoization covered the
    // second edge.
    assert_eq!(env.invocations(&counter_a), 1);
    assert_eq!(env.invocations(&counter_m), 1);
}

/// Template with more placeholders than gui fields: configuration failure,
/// nothing executed, nothing cached.
#[tokio::test]
async fn template_arity_failure_leaves_no_trace() {
    let env = TestEnv::new().await;
    let types = env.special_types().await;
    let counter = env.counter_path("runs");
    let tool = env.copy_tool("tool", &counter);
    let bad_type = env
        .block_type(
            "Resize",
            Some(&tool),
            Some("%s %s"),
            Some(json!(["only_field"])),
            false,
        )
        .await;

    let image = env.seed_input("a.png", b"pixels").await;
    let input = env.block(1, types.input, None, None, None).await;
    let bad = env
        .block(1, bad_type, Some(json!({"in": input})), Some(json!({"only_field": "x"})), None)
        .await;

    let evaluator = Evaluator::new(&env.db, &env.store);
    let mut ctx = EvalContext::new();
    let err = evaluator.result_of(bad, image, &mut ctx).await.unwrap_err();

    assert!(matches!(err, EvalError::Configuration { .. }));
    assert_eq!(env.invocations(&counter), 0);
    assert!(env.derived_files().is_empty());
    assert!(cache_rows(&env).await.is_empty());
}

/// Settings flow through mapping, template fill, and word splitting into
/// discrete argv elements; shell metacharacters stay inert.
#[tokio::test]
async fn settings_reach_the_command_as_argv_elements() {
    let env = TestEnv::new().await;
    let types = env.special_types().await;
    let argv_capture = env.dir.path().join("argv.txt");
    let tool = env.tool(
        "capture",
        &format!(
            "printf '%s\\n' \"$@\" > {}\ncp \"$2\" \"$3\"",
            argv_capture.display()
        ),
    );
    let capture_type = env
        .block_type(
            "Caption",
            Some(&tool),
            Some("--label %s --size %d"),
            Some(json!(["mode", "label", "size"])),
            false,
        )
        .await;

    let image = env.seed_input("a.png", b"pixels").await;
    let input = env.block(1, types.input, None, None, None).await;
    let caption = env
        .block(
            1,
            capture_type,
            Some(json!({"in": input})),
            Some(json!({"mode": "fast", "label": "two; words", "size": "12"})),
            None,
        )
        .await;

    let evaluator = Evaluator::new(&env.db, &env.store);
    let mut ctx = EvalContext::new();
    evaluator.result_of(caption, image, &mut ctx).await.unwrap();

    let argv = std::fs::read_to_string(&argv_capture).unwrap();
    let lines: Vec<&str> = argv.lines().collect();
    // [block_name, input, output, positional..., templated...]
    assert_eq!(lines[0], "Caption");
    assert_eq!(lines[3], "fast");
    assert_eq!(&lines[4..], &["--label", "two;", "words", "--size", "12"]);
}

/// `Load Image` resolves a stored upload by filename; unknown names fail.
#[tokio::test]
async fn load_image_block_resolves_by_filename() {
    let env = TestEnv::new().await;
    let load_type = env.block_type("Load Image", None, None, None, false).await;
    let image = env.seed_input("sunset.png", b"pixels").await;

    let load = env
        .block(1, load_type, None, Some(json!({"filename": "sunset.png"})), None)
        .await;
    let missing = env
        .block(1, load_type, None, Some(json!({"filename": "nope.png"})), None)
        .await;

    let evaluator = Evaluator::new(&env.db, &env.store);
    let mut ctx = EvalContext::new();
    let result = evaluator
        .result_of(load, Uuid::new_v4(), &mut ctx)
        .await
        .unwrap();
    assert_eq!(result, image);

    let err = evaluator
        .result_of(missing, Uuid::new_v4(), &mut ctx)
        .await
        .unwrap_err();
    assert!(matches!(err, EvalError::UnknownImage(_)));
}

/// A disabled block passes its lexicographically-first input through and
/// writes no cache rows; with no inputs it fails.
#[tokio::test]
async fn disabled_block_passes_first_input_through() {
    let env = TestEnv::new().await;
    let types = env.special_types().await;
    let counter = env.counter_path("runs");
    let tool = env.copy_tool("invert", &counter);
    let invert_type = env
        .block_type("Invert", Some(&tool), None, None, false)
        .await;

    let image = env.seed_input("a.png", b"pixels").await;
    let input = env.block(1, types.input, None, None, None).await;
    let disabled = env
        .block(
            1,
            invert_type,
            Some(json!({"in": input})),
            Some(json!({})),
            Some(false),
        )
        .await;

    let evaluator = Evaluator::new(&env.db, &env.store);
    let mut ctx = EvalContext::new();
    let result = evaluator.result_of(disabled, image, &mut ctx).await.unwrap();

    assert_eq!(result, image);
    assert_eq!(env.invocations(&counter), 0);
    assert!(cache_rows(&env).await.is_empty());

    // Zero inputs: nothing to pass through.
    let orphan = env
        .block(1, invert_type, None, Some(json!({})), Some(false))
        .await;
    let mut ctx = EvalContext::new();
    let err = evaluator.result_of(orphan, image, &mut ctx).await.unwrap_err();
    assert!(matches!(err, EvalError::Configuration { .. }));
}

/// A preview block with any arity other than one is a configuration error.
#[tokio::test]
async fn preview_arity_is_enforced() {
    let env = TestEnv::new().await;
    let types = env.special_types().await;
    let image = env.seed_input("a.png", b"pixels").await;

    let a = env.block(1, types.input, None, None, None).await;
    let b = env.block(1, types.input, None, None, None).await;
    let two_inputs = env
        .block(1, types.preview_terminal, Some(json!({"a": a, "b": b})), None, None)
        .await;
    let no_inputs = env.block(1, types.preview_terminal, None, None, None).await;

    let evaluator = Evaluator::new(&env.db, &env.store);
    let mut ctx = EvalContext::new();
    for block in [two_inputs, no_inputs] {
        let err = evaluator.result_of(block, image, &mut ctx).await.unwrap_err();
        assert!(matches!(err, EvalError::Configuration { .. }));
    }
}

/// A connection cycle fails fast instead of recursing forever.
#[tokio::test]
async fn cycles_fail_fast() {
    let env = TestEnv::new().await;
    let counter = env.counter_path("runs");
    let tool = env.copy_tool("invert", &counter);
    let invert_type = env
        .block_type("Invert", Some(&tool), None, None, false)
        .await;

    let image = env.seed_input("a.png", b"pixels").await;

    // Two blocks wired to each other. Ids are assigned sequentially, so
    // wire the first to the not-yet-created second and fix it up after.
    let first = env
        .block(1, invert_type, None, Some(json!({})), None)
        .await;
    let second = env
        .block(1, invert_type, Some(json!({"in": first})), Some(json!({})), None)
        .await;

    use sea_orm::{ActiveModelTrait, Set};
    let mut fix: server::entity::block::ActiveModel =
        server::entity::block::Entity::find_by_id(first)
            .one(&env.db)
            .await
            .unwrap()
            .unwrap()
            .into();
    fix.connections = Set(Some(json!({"in": second})));
    fix.update(&env.db).await.unwrap();

    let evaluator = Evaluator::new(&env.db, &env.store);
    let mut ctx = EvalContext::new();
    let err = evaluator.result_of(second, image, &mut ctx).await.unwrap_err();
    assert!(matches!(err, EvalError::Cycle(_)));
    assert_eq!(env.invocations(&counter), 0);
}

/// One shared context across a batch keys results per input.
#[tokio::test]
async fn shared_context_keeps_inputs_distinct() {
    let env = TestEnv::new().await;
    let types = env.special_types().await;
    let counter = env.counter_path("runs");
    let tool = env.copy_tool("invert", &counter);
    let invert_type = env
        .block_type("Invert", Some(&tool), None, None, false)
        .await;

    let image_a = env.seed_input("a.png", b"aaaa").await;
    let image_b = env.seed_input("b.png", b"bbbb").await;
    let input = env.block(1, types.input, None, None, None).await;
    let invert = env
        .block(1, invert_type, Some(json!({"in": input})), Some(json!({})), None)
        .await;

    let evaluator = Evaluator::new(&env.db, &env.store);
    let mut ctx = EvalContext::new();
    let out_a = evaluator.result_of(invert, image_a, &mut ctx).await.unwrap();
    let out_b = evaluator.result_of(invert, image_b, &mut ctx).await.unwrap();

    assert_ne!(out_a, out_b);
    // Both again, same context: memoized, no further executions.
    assert_eq!(
        evaluator.result_of(invert, image_a, &mut ctx).await.unwrap(),
        out_a
    );
    assert_eq!(env.invocations(&counter), 2);
}

/// A failing command aborts the evaluation, deletes partial output, and
/// caches nothing.
#[tokio::test]
async fn failing_command_caches_nothing() {
    let env = TestEnv::new().await;
    let types = env.special_types().await;
    let tool = env.tool("broken", "cp \"$2\" \"$3\"\necho boom >&2\nexit 3");
    let broken_type = env
        .block_type("Invert", Some(&tool), None, None, false)
        .await;

    let image = env.seed_input("a.png", b"pixels").await;
    let input = env.block(1, types.input, None, None, None).await;
    let broken = env
        .block(1, broken_type, Some(json!({"in": input})), Some(json!({})), None)
        .await;

    let evaluator = Evaluator::new(&env.db, &env.store);
    let mut ctx = EvalContext::new();
    let err = evaluator.result_of(broken, image, &mut ctx).await.unwrap_err();

    match err {
        EvalError::Execution { .. } => {}
        other => panic!("unexpected error: {other}"),
    }
    // Partial output was cleaned up and nothing was indexed.
    assert!(env.derived_files().is_empty());
    assert!(cache_rows(&env).await.is_empty());
}
