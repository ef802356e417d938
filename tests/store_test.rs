use std::time::Duration;

use resource_engine::host::disk_store::DiskStore;
use resource_engine::host::mem_store::MemoryStore;
use resource_engine::host::traits::KeyValueStore;

#[test]
fn test_disk_store_put_and_get() {
    let dir = tempfile::tempdir().unwrap();
    let store = DiskStore::new(dir.path()).unwrap();

    store.put("user:1/profile", b"alpha").unwrap();
    assert_eq!(store.get("user:1/profile").unwrap().unwrap(), b"alpha");
    assert!(store.get("missing").unwrap().is_none());

    // Overwrite replaces the value.
    store.put("user:1/profile", b"beta").unwrap();
    assert_eq!(store.get("user:1/profile").unwrap().unwrap(), b"beta");
}

#[test]
fn test_disk_store_sweep_drops_only_old_entries() {
    let dir = tempfile::tempdir().unwrap();
    let store = DiskStore::new(dir.path()).unwrap();

    store.put("old", b"x").unwrap();
    std::thread::sleep(Duration::from_millis(300));
    store.put("fresh", b"y").unwrap();

    let removed = store.sweep(Duration::from_millis(150)).unwrap();
    assert_eq!(removed, 1);
    assert!(store.get("old").unwrap().is_none());
    assert!(store.get("fresh").unwrap().is_some());

    // Nothing is old enough for a generous cutoff.
    let removed = store.sweep(Duration::from_secs(3600)).unwrap();
    assert_eq!(removed, 0);
}

#[test]
fn test_disk_store_clear_is_unconditional() {
    let dir = tempfile::tempdir().unwrap();
    let store = DiskStore::new(dir.path()).unwrap();

    store.put("a", b"1").unwrap();
    store.put("b", b"2").unwrap();
    store.clear().unwrap();

    assert!(store.get("a").unwrap().is_none());
    assert!(store.get("b").unwrap().is_none());
}

#[tokio::test(start_paused = true)]
async fn test_memory_store_sweep_by_insertion_age() {
    let store = MemoryStore::new();

    store.put("old", b"x").unwrap();
    tokio::time::sleep(Duration::from_millis(300)).await;
    store.put("fresh", b"y").unwrap();

    let removed = store.sweep(Duration::from_millis(150)).unwrap();
    assert_eq!(removed, 1);
    assert_eq!(store.len(), 1);
    assert!(store.get("fresh").unwrap().is_some());

    store.clear().unwrap();
    assert!(store.is_empty());
}
