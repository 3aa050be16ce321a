#![deny(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
//! End-to-end scenarios straight from the spec's "seed the suite" list:
//! import-preserving file moves, the cycle guard, and atomic batch
//! rollback, driven through the same `RefactorService`/`WorkflowExecutor`
//! stack the MCP tools use. None of these need a live language server —
//! every extension here falls back to the anchored-regex import rewriter.

use std::path::PathBuf;
use std::sync::Arc;

use warpline::bridge::PathValidator;
use warpline::config::Config;
use warpline::lsp::ClientManager;
use warpline::refactor::{RefactorService, RenameFileOptions};
use warpline::registry::ServiceContext;
use warpline::symbol::SymbolService;
use warpline::workflow::{BatchOptions, Operation, WorkflowExecutor};

fn test_context(root: PathBuf) -> (Arc<ServiceContext>, Arc<warpline::registry::ToolRegistry>) {
    let client_manager = Arc::new(ClientManager::new(Config::default(), root.clone()));
    let symbols = Arc::new(SymbolService::new(client_manager.clone()));
    let refactor = Arc::new(RefactorService::new(client_manager.clone(), symbols.clone()));
    let validator = Arc::new(PathValidator::new(vec![root]));
    let context = Arc::new(ServiceContext {
        symbols,
        refactor,
        servers: client_manager,
        validator,
    });
    #[allow(
        clippy::expect_used,
        reason = "registry construction is infallible for the fixed tool set"
    )]
    let registry = warpline::tools::build_registry().expect("tool registry builds");
    (context, registry)
}

/// Scenario 2 from spec §8: import-preserving move. `src/util.ts` is moved
/// to `src/helpers/util.ts`; its sole importer's relative specifier is
/// rewritten in place and the old path no longer exists.
#[tokio::test]
async fn import_preserving_move_rewrites_importer() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let src = dir.path().join("src");
    tokio::fs::create_dir_all(&src).await?;

    let util = src.join("util.ts");
    let app = src.join("app.ts");
    tokio::fs::write(&util, "export function helper() {}\n").await?;
    tokio::fs::write(
        &app,
        "import { helper } from \"./util\";\nhelper();\n",
    )
    .await?;

    let (context, _registry) = test_context(dir.path().to_path_buf());

    let new_util = src.join("helpers").join("util.ts");
    let result = context
        .refactor
        .rename_file(&util, &new_util, RenameFileOptions::default())
        .await?;

    assert_eq!(result.moved, vec![(util.clone(), new_util.clone())]);
    assert_eq!(result.importers, vec![app.clone()]);

    assert!(!util.exists(), "old path must no longer exist");
    assert!(new_util.exists(), "new path must exist with original contents");
    let moved_contents = tokio::fs::read_to_string(&new_util).await?;
    assert!(moved_contents.contains("export function helper"));

    let app_contents = tokio::fs::read_to_string(&app).await?;
    assert!(
        app_contents.contains("from \"./helpers/util\""),
        "importer specifier should be rewritten, got: {app_contents}"
    );
    assert!(app_contents.contains("helper();"));

    Ok(())
}

/// Scenario 3 from spec §8: moving a file into a directory that one of its
/// own importers lives under (or above) is rejected before anything
/// touches disk.
#[tokio::test]
async fn move_into_importer_ancestor_is_rejected() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let lib = dir.path().join("lib");
    let sub = lib.join("sub");
    tokio::fs::create_dir_all(&sub).await?;

    let types = lib.join("types.ts");
    let consumer = sub.join("consumer.ts");
    tokio::fs::write(&types, "export interface Thing {}\n").await?;
    tokio::fs::write(
        &consumer,
        "import { Thing } from \"../types\";\n",
    )
    .await?;

    let (context, _registry) = test_context(dir.path().to_path_buf());

    let new_types = sub.join("types.ts");
    let err = context
        .refactor
        .rename_file(&types, &new_types, RenameFileOptions::default())
        .await
        .expect_err("moving types.ts under its own importer must be rejected");

    assert!(
        matches!(err, warpline::error::BridgeError::WouldCreateCycle { .. }),
        "expected WouldCreateCycle, got {err:?}"
    );

    // Disk is untouched: both original files remain exactly where they were.
    assert!(types.exists());
    assert!(consumer.exists());
    assert!(!new_types.exists());
    let consumer_contents = tokio::fs::read_to_string(&consumer).await?;
    assert!(consumer_contents.contains("\"../types\""));

    Ok(())
}

/// Scenario 5 from spec §8: an atomic batch where one step is fine and a
/// second would create a cycle rolls back to zero changes on disk.
#[tokio::test]
async fn atomic_batch_rolls_back_on_later_cycle() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let src = dir.path().join("src");
    tokio::fs::create_dir_all(&src).await?;

    // Step 1: an innocuous, independently-valid move.
    let ok_old = src.join("ok.ts");
    tokio::fs::write(&ok_old, "export const ok = 1;\n").await?;
    let ok_new = src.join("moved_ok.ts");

    // Step 2: a move that creates a cycle, same shape as the previous test.
    let lib = dir.path().join("lib2");
    let sub = lib.join("sub");
    tokio::fs::create_dir_all(&sub).await?;
    let types = lib.join("types.ts");
    let consumer = sub.join("consumer.ts");
    tokio::fs::write(&types, "export interface Thing {}\n").await?;
    tokio::fs::write(&consumer, "import { Thing } from \"../types\";\n").await?;
    let bad_new = sub.join("types.ts");

    let (context, registry) = test_context(dir.path().to_path_buf());
    let executor = WorkflowExecutor::new(registry, context);

    let ops = vec![
        Operation {
            tool: "rename_file".to_string(),
            args: serde_json::json!({
                "old_path": ok_old.to_string_lossy(),
                "new_path": ok_new.to_string_lossy(),
            }),
            id: Some("step-ok".to_string()),
        },
        Operation {
            tool: "rename_file".to_string(),
            args: serde_json::json!({
                "old_path": types.to_string_lossy(),
                "new_path": bad_new.to_string_lossy(),
            }),
            id: Some("step-cycle".to_string()),
        },
    ];

    let result = executor
        .batch_execute(
            ops,
            BatchOptions {
                atomic: true,
                parallel: false,
                dry_run: false,
                stop_on_error: true,
            },
        )
        .await?;

    assert!(result.aborted, "batch must abort before any commit");
    assert_eq!(result.results.len(), 2);
    assert!(result.results[0].success, "first step's dry-run plan alone succeeds");
    assert!(!result.results[1].success, "second step's dry-run plan fails");

    // Nothing actually moved: every original file is exactly where it was.
    assert!(ok_old.exists(), "ok.ts must not have moved");
    assert!(!ok_new.exists());
    assert!(types.exists(), "types.ts must not have moved");
    assert!(!bad_new.exists());

    Ok(())
}

/// Directory rename recurses leaves-first: every file under the old
/// directory ends up at the corresponding path under the new one, and the
/// old directory is gone.
#[tokio::test]
async fn directory_rename_recurses_leaves_first() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let old_dir = dir.path().join("pkg");
    let old_sub = old_dir.join("sub");
    tokio::fs::create_dir_all(&old_sub).await?;

    tokio::fs::write(old_dir.join("inner.py"), "VALUE = 1\n").await?;
    tokio::fs::write(old_sub.join("deep.py"), "DEEP = 2\n").await?;

    let (context, _registry) = test_context(dir.path().to_path_buf());

    let new_dir = dir.path().join("renamed_pkg");
    let result = context
        .refactor
        .rename_file(&old_dir, &new_dir, RenameFileOptions::default())
        .await?;

    assert!(!old_dir.exists());
    assert!(new_dir.join("inner.py").exists());
    assert!(new_dir.join("sub").join("deep.py").exists());
    assert_eq!(result.moved.len(), 2);

    Ok(())
}
