use sentra_core::kv::{InMemoryKv, KvStore};
use std::time::Duration;

#[tokio::test]
async fn set_then_get_round_trips() {
    let kv = InMemoryKv::new();
    kv.set("a", b"hello".to_vec(), None).await.unwrap();
    assert_eq!(kv.get("a").await.unwrap(), Some(b"hello".to_vec()));
    assert_eq!(kv.get("missing").await.unwrap(), None);
}

#[tokio::test]
async fn ttl_expiry_hides_the_value_after_it_elapses() {
    let kv = InMemoryKv::new();
    kv.set("ttl-key", b"v".to_vec(), Some(Duration::from_millis(20))).await.unwrap();
    assert!(kv.exists("ttl-key").await.unwrap());
    tokio::time::sleep(Duration::from_millis(60)).await;
    assert!(!kv.exists("ttl-key").await.unwrap());
}

#[tokio::test]
async fn incr_and_decr_are_additive() {
    let kv = InMemoryKv::new();
    assert_eq!(kv.incr("counter", 5).await.unwrap(), 5);
    assert_eq!(kv.incr("counter", 3).await.unwrap(), 8);
    assert_eq!(kv.decr("counter", 2).await.unwrap(), 6);
}

#[tokio::test]
async fn set_if_absent_only_succeeds_once() {
    let kv = InMemoryKv::new();
    assert!(kv.set_if_absent("once", b"first".to_vec(), None).await.unwrap());
    assert!(!kv.set_if_absent("once", b"second".to_vec(), None).await.unwrap());
    assert_eq!(kv.get("once").await.unwrap(), Some(b"first".to_vec()));
}

#[tokio::test]
async fn keys_matching_supports_glob_wildcards() {
    let kv = InMemoryKv::new();
    kv.set("user:1:requests", b"1".to_vec(), None).await.unwrap();
    kv.set("user:1:tokens", b"1".to_vec(), None).await.unwrap();
    kv.set("user:2:requests", b"1".to_vec(), None).await.unwrap();

    let mut matched = kv.keys_matching("user:1:*").await.unwrap();
    matched.sort();
    assert_eq!(matched, vec!["user:1:requests".to_string(), "user:1:tokens".to_string()]);
}

#[tokio::test]
async fn rl_decr_rejects_going_negative() {
    let kv = InMemoryKv::new();
    kv.rl_incr("bucket", 10.0, 100.0).await.unwrap();
    assert!(kv.rl_decr("bucket", 5.0).await.is_ok());
    assert!(kv.rl_decr("bucket", 1000.0).await.is_err());
}

#[tokio::test]
async fn rl_incr_saturates_at_capacity() {
    let kv = InMemoryKv::new();
    let level = kv.rl_incr("saturating", 1000.0, 50.0).await.unwrap();
    assert_eq!(level, 50.0);
}

#[tokio::test]
async fn flush_clears_every_shard() {
    let kv = InMemoryKv::new();
    for i in 0..32 {
        kv.set(&format!("k{i}"), b"v".to_vec(), None).await.unwrap();
    }
    kv.flush().await.unwrap();
    for i in 0..32 {
        assert_eq!(kv.get(&format!("k{i}")).await.unwrap(), None);
    }
}
