//! SQLite-indexed store behavior through the public factory.

use hoard_core::Error;
use hoard_core::size::CacheSizeSetting;
use hoard_tests::{TestWorkspace, task};
use pretty_assertions::assert_eq;
use std::time::Duration;

#[tokio::test]
async fn test_round_trip_with_flat_layout() {
    let ws = TestWorkspace::new();
    ws.write("dist/app.js", "bundle");
    let store = ws.store(true).await;
    assert_eq!(store.name(), "indexed");

    store
        .put(&task("h1"), Some("done"), &["dist".to_string()], 4)
        .await
        .unwrap();
    ws.remove("dist");

    let hit = store.get(&task("h1")).await.unwrap().expect("cache hit");
    assert_eq!(hit.terminal_output, "done");
    assert_eq!(hit.code, 4);
    assert_eq!(hit.outputs_path, ws.cache_dir().join("h1"));
    assert!(ws.cache_dir().join("h1/dist/app.js").exists());
    assert!(!ws.cache_dir().join("h1.commit").exists());
    assert_eq!(
        std::fs::read_to_string(store.temporary_output_path(&task("h1"))).unwrap(),
        "done"
    );

    store
        .copy_files_from_cache(&task("h1"), &hit, &["dist".to_string()])
        .await
        .unwrap();
    assert_eq!(ws.read("dist/app.js").as_deref(), Some("bundle"));
}

#[tokio::test]
async fn test_index_survives_reopen() {
    let ws = TestWorkspace::new();
    ws.write("out.txt", "12345");
    ws.store(true).await.put(&task("h1"), None, &["out.txt".to_string()], 0).await.unwrap();

    let reopened = ws.store(true).await;
    assert_eq!(reopened.used_cache_space().await.unwrap(), 5);
    assert!(reopened.get(&task("h1")).await.unwrap().is_some());
}

#[tokio::test]
async fn test_foreign_record_rejected_despite_override() {
    let ws = TestWorkspace::new();
    ws.store(true).await.put(&task("h1"), None, &[], 0).await.unwrap();

    let mut config = ws.config(true);
    config.reject_unknown_local_cache = false;
    let other = ws.store_with(config, ws.options("machine-b")).await;

    let err = other.get(&task("h1")).await.unwrap_err();
    assert!(matches!(err, Error::TrustViolation { .. }));
}

#[tokio::test]
async fn test_eviction_keeps_cache_within_bound() {
    let ws = TestWorkspace::new();
    let mut config = ws.config(true);
    config.max_cache_size = Some(CacheSizeSetting::Text("1 KB".to_string()));
    let store = ws.store_with(config, ws.options(hoard_tests::MACHINE_A)).await;

    for i in 0..5 {
        let name = format!("blob{}", i);
        ws.write(&name, &"x".repeat(300));
        store
            .put(&task(&format!("h{}", i)), None, &[name], 0)
            .await
            .unwrap();
        assert!(store.used_cache_space().await.unwrap() <= 1024);
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    // the three most recent fit, the oldest two were evicted
    assert_eq!(store.get(&task("h0")).await.unwrap(), None);
    assert_eq!(store.get(&task("h1")).await.unwrap(), None);
    assert!(!ws.cache_dir().join("h0").exists());
    for hash in ["h2", "h3", "h4"] {
        assert!(store.get(&task(hash)).await.unwrap().is_some());
    }
}

#[tokio::test]
async fn test_recently_read_records_survive_eviction() {
    let ws = TestWorkspace::new();
    let mut config = ws.config(true);
    config.max_cache_size = Some(CacheSizeSetting::Bytes(700));
    let store = ws.store_with(config, ws.options(hoard_tests::MACHINE_A)).await;

    ws.write("a", &"x".repeat(300));
    store.put(&task("a"), None, &["a".to_string()], 0).await.unwrap();
    tokio::time::sleep(Duration::from_millis(5)).await;
    ws.write("b", &"x".repeat(300));
    store.put(&task("b"), None, &["b".to_string()], 0).await.unwrap();
    tokio::time::sleep(Duration::from_millis(5)).await;

    assert!(store.get(&task("a")).await.unwrap().is_some());
    tokio::time::sleep(Duration::from_millis(5)).await;

    ws.write("c", &"x".repeat(300));
    store.put(&task("c"), None, &["c".to_string()], 0).await.unwrap();

    assert!(store.get(&task("a")).await.unwrap().is_some());
    assert_eq!(store.get(&task("b")).await.unwrap(), None);
}

#[tokio::test]
async fn test_housekeeping_forgets_deleted_directories() {
    let ws = TestWorkspace::new();
    let store = ws.store(true).await;
    ws.write("f", "abc");
    store.put(&task("h1"), None, &["f".to_string()], 0).await.unwrap();
    std::fs::remove_dir_all(ws.cache_dir().join("h1")).unwrap();

    store.remove_old_cache_records().await.unwrap();

    assert_eq!(store.used_cache_space().await.unwrap(), 0);
    assert!(!store.temporary_output_path(&task("h1")).exists());
}

#[tokio::test]
async fn test_legacy_store_selected_when_index_disabled() {
    let ws = TestWorkspace::new();
    let store = ws.store(false).await;
    assert_eq!(store.name(), "local");
    assert!(!ws.cache_dir().join("index.db").exists());
}
