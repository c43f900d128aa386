use shopdeck_storage::{KeyValueStore, MemoryStore};
use std::sync::Arc;
use std::thread;

#[test]
fn set_then_get_roundtrip() {
    let store = MemoryStore::new();
    store.set("license.record", b"payload").unwrap();
    assert_eq!(store.get("license.record").unwrap(), Some(b"payload".to_vec()));
}

#[test]
fn get_missing_returns_none() {
    let store = MemoryStore::new();
    assert_eq!(store.get("absent").unwrap(), None);
}

#[test]
fn set_replaces_previous_value() {
    let store = MemoryStore::new();
    store.set("flag", b"first").unwrap();
    store.set("flag", b"second").unwrap();
    assert_eq!(store.get("flag").unwrap(), Some(b"second".to_vec()));
}

#[test]
fn clear_removes_value() {
    let store = MemoryStore::new();
    store.set("flag", b"x").unwrap();
    store.clear("flag").unwrap();
    assert_eq!(store.get("flag").unwrap(), None);
    store.clear("flag").unwrap(); // clearing again is fine
}

#[test]
fn len_and_is_empty_track_keys() {
    let store = MemoryStore::new();
    assert!(store.is_empty());
    store.set("a", b"1").unwrap();
    store.set("b", b"2").unwrap();
    store.set("a", b"3").unwrap(); // replace, not a new key
    assert_eq!(store.len(), 2);
    store.clear("a").unwrap();
    assert_eq!(store.len(), 1);
}

#[test]
fn default_is_empty() {
    let store = MemoryStore::default();
    assert!(store.is_empty());
}

#[test]
fn shared_across_threads() {
    let store = Arc::new(MemoryStore::new());
    let handles: Vec<_> = (0..8)
        .map(|i| {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                let key = format!("key-{i}");
                store.set(&key, &[i]).unwrap();
                store.get(&key).unwrap()
            })
        })
        .collect();
    for (i, handle) in handles.into_iter().enumerate() {
        assert_eq!(handle.join().unwrap(), Some(vec![i as u8]));
    }
    assert_eq!(store.len(), 8);
}
