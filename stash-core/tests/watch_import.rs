mod common;

use std::time::Duration;

use common::{Harness, drain, eventually, png, write};
use stash_core::{
    import::{FsImportConfig, ImportOptions, Importer},
    inspect::InspecterRegistry,
};
use tokio_util::sync::CancellationToken;

fn watch_harness(watch_dir: Option<std::path::PathBuf>) -> Harness {
    Harness::with_config(FsImportConfig {
        watch_dir,
        workers: 2,
        debounce: Duration::from_millis(200),
    })
}

fn exists(path: &std::path::Path) -> impl std::future::Future<Output = bool> + use<> {
    let found = path.exists();
    async move { found }
}

fn accepted() -> ImportOptions {
    ImportOptions::default().mime_types(InspecterRegistry::with_defaults().mime_types())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn new_files_are_imported_once_quiet() {
    let harness = watch_harness(None);
    let inbox = harness.dir.path().join("inbox");
    let shutdown = CancellationToken::new();
    let errors = harness.importer.watch(
        ImportOptions {
            dir: Some(inbox.clone()),
            ..accepted()
        },
        shutdown.clone(),
    );

    // The watcher creates the directory; give it a moment to attach.
    assert!(eventually(Duration::from_secs(5), || exists(&inbox)).await);
    tokio::time::sleep(Duration::from_millis(300)).await;

    let bytes = png(42);
    // Several writes in quick succession: still one import.
    for _ in 0..3 {
        write(&inbox.join("a.png"), &bytes);
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    write(&inbox.join("ignored.txt"), b"nope");
    write(&inbox.join(".partial.png"), &png(43));

    let index = harness.index.clone();
    let imported = eventually(Duration::from_secs(10), move || {
        let index = index.clone();
        async move { index.len().await == 1 }
    })
    .await;
    assert!(imported, "watched file was not imported");

    shutdown.cancel();
    let errors = drain(errors).await;
    assert!(errors.is_empty(), "{errors:?}");

    let items = harness.stored_items().await;
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].name, "a.png");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn falls_back_to_the_configured_directory() {
    let elsewhere = tempfile::tempdir().unwrap();
    let inbox = elsewhere.path().join("configured");
    let harness = watch_harness(Some(inbox.clone()));

    let shutdown = CancellationToken::new();
    let errors = harness.importer.watch(accepted(), shutdown.clone());
    assert!(eventually(Duration::from_secs(5), || exists(&inbox)).await);

    shutdown.cancel();
    assert!(drain(errors).await.is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn no_directory_means_idle_until_shutdown() {
    let harness = watch_harness(None);
    let shutdown = CancellationToken::new();
    let mut errors = harness.importer.watch(accepted(), shutdown.clone());

    let early = tokio::time::timeout(Duration::from_millis(200), errors.recv()).await;
    assert!(early.is_err(), "channel closed before shutdown");

    shutdown.cancel();
    assert!(errors.recv().await.is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn shutdown_waits_for_pending_debounce() {
    let harness = Harness::with_config(FsImportConfig {
        watch_dir: None,
        workers: 2,
        debounce: Duration::from_millis(400),
    });
    let inbox = harness.dir.path().join("inbox");
    let shutdown = CancellationToken::new();
    let errors = harness.importer.watch(
        ImportOptions {
            dir: Some(inbox.clone()),
            ..accepted()
        },
        shutdown.clone(),
    );
    assert!(eventually(Duration::from_secs(5), || exists(&inbox)).await);
    tokio::time::sleep(Duration::from_millis(300)).await;

    write(&inbox.join("a.png"), &png(7));
    // Well inside the quiet period: the import has not run yet.
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(harness.index.len().await, 0);

    shutdown.cancel();
    let errors = drain(errors).await;
    assert!(errors.is_empty(), "{errors:?}");

    let items = harness.stored_items().await;
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].name, "a.png");
    assert_eq!(harness.index.len().await, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn unusable_directory_is_reported_and_waits_for_shutdown() {
    let harness = watch_harness(None);
    let blocker = harness.dir.path().join("blocker");
    write(&blocker, b"a file, not a directory");

    let shutdown = CancellationToken::new();
    let mut errors = harness.importer.watch(
        ImportOptions {
            dir: Some(blocker.join("inbox")),
            ..accepted()
        },
        shutdown.clone(),
    );

    let first = tokio::time::timeout(Duration::from_secs(5), errors.recv()).await;
    assert!(matches!(first, Ok(Some(_))), "expected a reported error, got {first:?}");

    let early = tokio::time::timeout(Duration::from_millis(200), errors.recv()).await;
    assert!(early.is_err(), "channel closed before shutdown");

    shutdown.cancel();
    assert!(errors.recv().await.is_none());
}
