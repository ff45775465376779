//! Remote backend resolution and mirroring between machines.

use hoard_cache::StoreOptions;
use hoard_core::Error;
use hoard_core::ports::LegacyRemoteCache;
use hoard_remote::SharedFsConfig;
use hoard_tests::{
    DirectoryLegacyCache, FixedMachineId, MACHINE_A, MemoryTransport, StaticManagedClient, TestWorkspace,
    options_with_remote, task,
};
use pretty_assertions::assert_eq;
use std::sync::Arc;

#[tokio::test]
async fn test_record_travels_between_machines_legacy_store() {
    let remote = MemoryTransport::new();
    let producer = TestWorkspace::new();
    producer.write("dist/app.js", "shared");
    let store = producer
        .store_with(producer.config(false), options_with_remote(MACHINE_A, remote.backend()))
        .await;
    store
        .put(&task("h1"), Some("from a"), &["dist".to_string()], 2)
        .await
        .unwrap();
    assert_eq!(remote.keys(), vec!["h1.tar.zst".to_string()]);

    let consumer = TestWorkspace::new();
    let store = consumer
        .store_with(consumer.config(false), options_with_remote("machine-b", remote.backend()))
        .await;
    let hit = store.get(&task("h1")).await.unwrap().expect("remote hit");
    assert!(hit.remote);
    assert_eq!(hit.terminal_output, "from a");
    assert_eq!(hit.code, 2);

    store
        .copy_files_from_cache(&task("h1"), &hit, &["dist".to_string()])
        .await
        .unwrap();
    assert_eq!(consumer.read("dist/app.js").as_deref(), Some("shared"));

    // the adopted record now belongs to the consumer
    let again = store.get(&task("h1")).await.unwrap().unwrap();
    assert!(!again.remote);
}

#[tokio::test]
async fn test_record_travels_between_machines_indexed_store() {
    let remote = MemoryTransport::new();
    let producer = TestWorkspace::new();
    producer.write("dist/app.js", "shared");
    producer
        .store_with(producer.config(true), options_with_remote(MACHINE_A, remote.backend()))
        .await
        .put(&task("h1"), Some("from a"), &["dist".to_string()], 0)
        .await
        .unwrap();

    let consumer = TestWorkspace::new();
    let store = consumer
        .store_with(consumer.config(true), options_with_remote("machine-b", remote.backend()))
        .await;
    let hit = store.get(&task("h1")).await.unwrap().expect("remote hit");
    assert!(hit.remote);
    assert_eq!(hit.outputs_path, consumer.cache_dir().join("h1"));
    assert!(hit.outputs_path.join("dist/app.js").exists());
    assert_eq!(store.used_cache_space().await.unwrap(), "shared".len() as u64);

    let again = store.get(&task("h1")).await.unwrap().unwrap();
    assert!(!again.remote);
    assert_eq!(again.terminal_output, "from a");
}

#[tokio::test]
async fn test_transient_upload_failures_are_retried() {
    let remote = MemoryTransport::new();
    let ws = TestWorkspace::new();
    let store = ws
        .store_with(ws.config(false), options_with_remote(MACHINE_A, remote.backend()))
        .await;

    remote.fail_next(2);
    store.put(&task("h1"), None, &[], 0).await.unwrap();

    assert_eq!(remote.uploads(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_upload_failure_surfaces_after_last_attempt() {
    let remote = MemoryTransport::new();
    let ws = TestWorkspace::new();
    let store = ws
        .store_with(ws.config(false), options_with_remote(MACHINE_A, remote.backend()))
        .await;

    remote.fail_next(usize::MAX);
    let err = store.put(&task("h1"), None, &[], 0).await.unwrap_err();

    assert!(matches!(err, Error::Network(ref message) if message == "injected failure"));
    assert_eq!(remote.uploads(), 0);
}

#[tokio::test]
async fn test_retrieve_failure_is_a_miss() {
    let remote = MemoryTransport::new();
    let ws = TestWorkspace::new();
    let store = ws
        .store_with(ws.config(false), options_with_remote(MACHINE_A, remote.backend()))
        .await;

    remote.fail_next(1);
    assert_eq!(store.get(&task("h1")).await.unwrap(), None);
}

#[tokio::test]
async fn test_skip_remote_cache_wins_over_managed_client() {
    let remote = MemoryTransport::new();
    let ws = TestWorkspace::new();
    let mut options = options_with_remote(MACHINE_A, remote.backend());
    options.skip_remote_cache = true;
    let store = ws.store_with(ws.config(false), options).await;

    store.put(&task("h1"), None, &[], 0).await.unwrap();

    assert!(remote.keys().is_empty());
}

#[tokio::test]
async fn test_legacy_client_cache_is_adapted_for_indexed_store() {
    let shared = tempfile::tempdir().unwrap();
    let legacy = Arc::new(DirectoryLegacyCache::new(shared.path()));
    let legacy_cache: Arc<dyn LegacyRemoteCache> = legacy.clone();
    let client = Arc::new(StaticManagedClient {
        remote: None,
        legacy: Some(legacy_cache),
    });

    let producer = TestWorkspace::new();
    producer.write("dist/app.js", "legacy");
    let options = StoreOptions::default()
        .with_machine_id(Arc::new(FixedMachineId::new(MACHINE_A)))
        .with_managed_client(client.clone());
    producer
        .store_with(producer.config(true), options)
        .await
        .put(&task("h1"), Some("old protocol"), &["dist".to_string()], 1)
        .await
        .unwrap();

    // older caches hold nested records
    let stored = legacy.record_dir("h1");
    assert!(stored.join("outputs/dist/app.js").exists());
    assert_eq!(std::fs::read_to_string(stored.join("terminalOutput")).unwrap(), "old protocol");
    assert_eq!(std::fs::read_to_string(stored.join("code")).unwrap(), "1");

    let consumer = TestWorkspace::new();
    let options = StoreOptions::default()
        .with_machine_id(Arc::new(FixedMachineId::new("machine-b")))
        .with_managed_client(client);
    let store = consumer.store_with(consumer.config(true), options).await;
    let hit = store.get(&task("h1")).await.unwrap().expect("remote hit");

    assert!(hit.remote);
    assert_eq!(hit.terminal_output, "old protocol");
    assert_eq!(hit.code, 1);
    assert!(consumer.cache_dir().join("h1/dist/app.js").exists());
    assert!(!consumer.cache_dir().join("h1/outputs").exists());
}

#[tokio::test]
async fn test_shared_filesystem_backend_from_config() {
    let shared = tempfile::tempdir().unwrap();
    let producer = TestWorkspace::new();
    producer.write("out.txt", "on the share");

    let mut config = producer.config(false);
    config.remote.shared_fs = Some(SharedFsConfig {
        path: shared.path().to_path_buf(),
    });
    let options = StoreOptions::from_config(&config).with_machine_id(Arc::new(FixedMachineId::new(MACHINE_A)));
    producer
        .store_with(config, options)
        .await
        .put(&task("h1"), None, &["out.txt".to_string()], 0)
        .await
        .unwrap();
    assert!(shared.path().join("h1.tar.zst").exists());

    let consumer = TestWorkspace::new();
    let mut config = consumer.config(false);
    config.remote.shared_fs = Some(SharedFsConfig {
        path: shared.path().to_path_buf(),
    });
    let options = StoreOptions::from_config(&config).with_machine_id(Arc::new(FixedMachineId::new("machine-b")));
    let store = consumer.store_with(config, options).await;
    let hit = store.get(&task("h1")).await.unwrap().expect("remote hit");
    store
        .copy_files_from_cache(&task("h1"), &hit, &["out.txt".to_string()])
        .await
        .unwrap();

    assert_eq!(consumer.read("out.txt").as_deref(), Some("on the share"));
}
