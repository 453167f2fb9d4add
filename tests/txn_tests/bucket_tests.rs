//! Bucket Tests
//!
//! These tests verify:
//! - Bucket creation, lookup and listing
//! - Buckets are independent key spaces
//! - Argument validation on keys, values and names
//! - Values larger than a page round-trip through overflow pages

use burrowkv::btree::MAX_KEY_SIZE;
use burrowkv::{BurrowError, TxManager};

use crate::common::{config, db_path, get, put, setup_manager};

#[test]
fn test_create_bucket_twice_fails() {
    let (_dir, txm) = setup_manager(4096);

    let mut txn = txm.begin_write().unwrap();
    assert!(matches!(
        txn.create_bucket("items"),
        Err(BurrowError::BucketExists(_))
    ));
    txn.create_bucket_if_not_exists("items").unwrap();

    txn.create_bucket("fresh").unwrap();
    assert!(matches!(
        txn.create_bucket("fresh"),
        Err(BurrowError::BucketExists(_))
    ));
    txn.commit().unwrap();

    assert!(txm.begin_read().bucket("fresh").unwrap().is_some());
}

#[test]
fn test_missing_bucket() {
    let (_dir, txm) = setup_manager(4096);

    assert!(txm.begin_read().bucket("nope").unwrap().is_none());

    let mut txn = txm.begin_write().unwrap();
    assert!(matches!(
        txn.bucket_mut("nope"),
        Err(BurrowError::BucketNotFound(_))
    ));
}

#[test]
fn test_bucket_names_sorted() {
    let (_dir, txm) = setup_manager(4096);

    let mut txn = txm.begin_write().unwrap();
    txn.create_bucket("zeta").unwrap();
    txn.create_bucket("alpha").unwrap();
    txn.commit().unwrap();

    assert_eq!(
        txm.begin_read().bucket_names().unwrap(),
        vec!["alpha".to_string(), "items".to_string(), "zeta".to_string()]
    );
}

#[test]
fn test_buckets_are_isolated() {
    let (_dir, txm) = setup_manager(4096);

    let mut txn = txm.begin_write().unwrap();
    txn.create_bucket("other").unwrap();
    txn.bucket_mut("items").unwrap().put(b"k", b"items-value").unwrap();
    txn.bucket_mut("other").unwrap().put(b"k", b"other-value").unwrap();
    txn.commit().unwrap();

    let reader = txm.begin_read();
    let items = reader.bucket("items").unwrap().unwrap();
    let other = reader.bucket("other").unwrap().unwrap();
    assert_eq!(items.get(b"k").unwrap(), Some(b"items-value".to_vec()));
    assert_eq!(other.get(b"k").unwrap(), Some(b"other-value".to_vec()));

    let report = reader.check().unwrap();
    assert_eq!(report.buckets, 2);
    assert_eq!(report.keys, 2);
}

#[test]
fn test_new_bucket_visible_in_same_txn() {
    let (_dir, txm) = setup_manager(4096);

    let mut txn = txm.begin_write().unwrap();
    txn.create_bucket("logs").unwrap();
    let mut logs = txn.bucket_mut("logs").unwrap();
    logs.put(b"line:1", b"started").unwrap();
    assert_eq!(logs.get(b"line:1").unwrap(), Some(b"started".to_vec()));
    txn.commit().unwrap();

    let reader = txm.begin_read();
    let logs = reader.bucket("logs").unwrap().unwrap();
    assert_eq!(logs.get(b"line:1").unwrap(), Some(b"started".to_vec()));
}

#[test]
fn test_cursor_over_bucket() {
    let (_dir, txm) = setup_manager(1024);
    for i in 0..100u32 {
        put(&txm, format!("k{:03}", i).as_bytes(), b"v");
    }

    let bucket = txm.begin_read().bucket("items").unwrap().unwrap();
    let mut cursor = bucket.cursor();
    let (first, _) = cursor.first().unwrap().unwrap();
    assert_eq!(first, b"k000".to_vec());
    let (found, _) = cursor.seek(b"k0505").unwrap().unwrap();
    assert_eq!(found, b"k051".to_vec());

    // the cursor keeps its snapshot alive after the handle is gone
    drop(bucket);
    put(&txm, b"k052", b"changed");
    let (next, value) = cursor.next().unwrap().unwrap();
    assert_eq!(next, b"k052".to_vec());
    assert_eq!(value, b"v".to_vec());
}

// =============================================================================
// Validation Tests
// =============================================================================

#[test]
fn test_invalid_keys_and_values() {
    let (_dir, txm) = setup_manager(4096);
    let mut txn = txm.begin_write().unwrap();
    let mut bucket = txn.bucket_mut("items").unwrap();

    assert!(matches!(
        bucket.put(b"", b"v"),
        Err(BurrowError::InvalidArgument(_))
    ));
    assert!(matches!(
        bucket.put(b"k", b""),
        Err(BurrowError::InvalidArgument(_))
    ));
    let long_key = vec![b'k'; MAX_KEY_SIZE + 1];
    assert!(matches!(
        bucket.put(&long_key, b"v"),
        Err(BurrowError::InvalidArgument(_))
    ));

    // deletes of impossible keys are simply absent
    assert!(!bucket.delete(b"").unwrap());
    assert!(!bucket.delete(&long_key).unwrap());
}

#[test]
fn test_invalid_bucket_names() {
    let (_dir, txm) = setup_manager(4096);
    let mut txn = txm.begin_write().unwrap();

    assert!(matches!(
        txn.create_bucket(""),
        Err(BurrowError::InvalidArgument(_))
    ));
    let long_name = "b".repeat(MAX_KEY_SIZE + 1);
    assert!(matches!(
        txn.create_bucket(&long_name),
        Err(BurrowError::InvalidArgument(_))
    ));
}

#[test]
fn test_max_size_key_accepted() {
    let (_dir, txm) = setup_manager(4096);
    let key = vec![b'k'; MAX_KEY_SIZE];
    put(&txm, &key, b"v");
    assert_eq!(get(&txm, &key), Some(b"v".to_vec()));
    txm.begin_read().check().unwrap();
}

#[test]
fn test_large_value_round_trip() {
    let (dir, txm) = setup_manager(4096);
    let value: Vec<u8> = (0..100 * 1024).map(|i| (i % 251) as u8).collect();

    put(&txm, b"small", b"1");
    put(&txm, b"blob", &value);
    put(&txm, b"tiny", b"2");
    assert_eq!(get(&txm, b"blob"), Some(value.clone()));

    drop(txm);
    let txm = TxManager::open(config(&db_path(&dir), 4096)).unwrap();
    assert_eq!(get(&txm, b"blob"), Some(value));
    assert_eq!(get(&txm, b"small"), Some(b"1".to_vec()));
    txm.begin_read().check().unwrap();
}
