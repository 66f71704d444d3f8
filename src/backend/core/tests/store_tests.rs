//! Concurrency and expiry tests for the in-memory token store.

use std::sync::Arc;
use std::time::Duration;

use tollgate_core::csrf::{MemoryStore, RandomTokenGenerator, TokenGenerator, TokenStore};

#[tokio::test]
async fn test_concurrent_set_and_contains() {
    let store = Arc::new(MemoryStore::new());
    let generator = RandomTokenGenerator::default();
    let tokens: Vec<String> = (0..200).map(|_| generator.generate()).collect();

    let mut handles = Vec::new();
    for token in tokens.clone() {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            store.set(&token, Duration::from_secs(60)).await.unwrap();
            store.contains(&token).await.unwrap()
        }));
    }

    for handle in handles {
        assert!(handle.await.unwrap());
    }
    assert_eq!(store.len(), tokens.len());
}

#[tokio::test]
async fn test_concurrent_deletes_are_idempotent() {
    let store = Arc::new(MemoryStore::new());
    store.set("shared", Duration::from_secs(60)).await.unwrap();

    let handles: Vec<_> = (0..32)
        .map(|_| {
            let store = store.clone();
            tokio::spawn(async move { store.delete("shared").await })
        })
        .collect();

    for handle in handles {
        assert!(handle.await.unwrap().is_ok());
    }
    assert!(!store.contains("shared").await.unwrap());
}

#[tokio::test]
async fn test_racing_issuance_keeps_both_tokens() {
    let store = Arc::new(MemoryStore::new());

    let (a, b) = tokio::join!(
        store.set("first", Duration::from_secs(60)),
        store.set("second", Duration::from_secs(60)),
    );
    a.unwrap();
    b.unwrap();

    assert!(store.contains("first").await.unwrap());
    assert!(store.contains("second").await.unwrap());
}

#[tokio::test]
async fn test_expiry_under_concurrent_reads() {
    let store = Arc::new(MemoryStore::new());
    store.set("short", Duration::from_millis(20)).await.unwrap();
    store.set("long", Duration::from_secs(60)).await.unwrap();

    tokio::time::sleep(Duration::from_millis(40)).await;

    let reads: Vec<_> = (0..16)
        .map(|_| {
            let store = store.clone();
            tokio::spawn(async move {
                (
                    store.contains("short").await.unwrap(),
                    store.contains("long").await.unwrap(),
                )
            })
        })
        .collect();

    for read in reads {
        assert_eq!(read.await.unwrap(), (false, true));
    }
    assert_eq!(store.len(), 1);
}

#[tokio::test]
async fn test_store_usable_as_trait_object() {
    let store: Arc<dyn TokenStore> = Arc::new(MemoryStore::new());

    store.set("token", Duration::from_secs(1)).await.unwrap();
    assert!(store.contains("token").await.unwrap());
    assert_eq!(store.name(), "memory");
}
