//! Recovery Tests
//!
//! These tests verify:
//! - Data survives close and reopen
//! - A torn or corrupt newest meta page falls back to the previous commit
//! - Files with no valid meta page are refused
//! - The page size recorded in the file wins over the configured one

use std::fs::{self, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use burrowkv::pager::PAGE_HEADER_SIZE;
use burrowkv::{BurrowError, TxManager};
use tempfile::TempDir;

use crate::common::{config, db_path, get, put, setup_manager};

// =============================================================================
// Helper Functions
// =============================================================================

fn read_bytes(path: &Path, len: usize) -> Vec<u8> {
    let mut buf = vec![0u8; len];
    fs::File::open(path).unwrap().read_exact(&mut buf).unwrap();
    buf
}

fn write_bytes(path: &Path, offset: u64, bytes: &[u8]) {
    let mut file = OpenOptions::new().write(true).open(path).unwrap();
    file.seek(SeekFrom::Start(offset)).unwrap();
    file.write_all(bytes).unwrap();
    file.sync_all().unwrap();
}

/// Flip one byte inside the checksummed body of a meta slot
fn corrupt_meta(path: &Path, slot: u64, page_size: usize) {
    let offset = slot * page_size as u64 + PAGE_HEADER_SIZE as u64 + 8;
    let mut file = OpenOptions::new().read(true).write(true).open(path).unwrap();
    let mut byte = [0u8; 1];
    file.seek(SeekFrom::Start(offset)).unwrap();
    file.read_exact(&mut byte).unwrap();
    file.seek(SeekFrom::Start(offset)).unwrap();
    file.write_all(&[byte[0] ^ 0xFF]).unwrap();
    file.sync_all().unwrap();
}

fn reopen(dir: &TempDir, page_size: usize) -> TxManager {
    TxManager::open(config(&db_path(dir), page_size)).unwrap()
}

// =============================================================================
// Tests
// =============================================================================

#[test]
fn test_fresh_file_layout() {
    let dir = TempDir::new().unwrap();
    let txm = TxManager::open(config(&db_path(&dir), 4096)).unwrap();

    let stats = txm.stats();
    assert_eq!(stats.txid, 1);
    assert_eq!(stats.page_size, 4096);
    assert_eq!(stats.page_count, 4);
    assert_eq!(stats.free_pages, 0);

    let report = txm.begin_read().check().unwrap();
    assert_eq!(report.buckets, 0);
    assert_eq!(report.keys, 0);
}

#[test]
fn test_reopen_preserves_data() {
    let (dir, txm) = setup_manager(4096);
    for i in 0..300u32 {
        put(&txm, format!("key:{:04}", i).as_bytes(), format!("value:{}", i).as_bytes());
    }
    let txid = txm.stats().txid;
    drop(txm);

    let txm = reopen(&dir, 4096);
    assert_eq!(txm.stats().txid, txid);
    for i in 0..300u32 {
        assert_eq!(
            get(&txm, format!("key:{:04}", i).as_bytes()),
            Some(format!("value:{}", i).into_bytes())
        );
    }

    let report = txm.begin_read().check().unwrap();
    assert_eq!(report.buckets, 1);
    assert_eq!(report.keys, 300);
}

#[test]
fn test_unwritten_meta_discards_commit() {
    let (dir, txm) = setup_manager(4096);
    put(&txm, b"stable", b"1");
    let txid = txm.stats().txid;
    drop(txm);

    // meta pages as they were before the next commit
    let metas = read_bytes(&db_path(&dir), 2 * 4096);

    let txm = reopen(&dir, 4096);
    let mut txn = txm.begin_write().unwrap();
    {
        let mut bucket = txn.bucket_mut("items").unwrap();
        bucket.put(b"stable", b"2").unwrap();
        bucket.put(b"lost", b"3").unwrap();
    }
    txn.commit().unwrap();
    drop(txm);

    // simulate a crash before the meta write reached the disk
    write_bytes(&db_path(&dir), 0, &metas);

    let txm = reopen(&dir, 4096);
    assert_eq!(txm.stats().txid, txid);
    assert_eq!(get(&txm, b"stable"), Some(b"1".to_vec()));
    assert_eq!(get(&txm, b"lost"), None);
    txm.begin_read().check().unwrap();

    // writing resumes from the recovered commit
    put(&txm, b"after", b"4");
    assert_eq!(txm.stats().txid, txid + 1);
    txm.begin_read().check().unwrap();
}

#[test]
fn test_corrupt_newest_meta_falls_back() {
    let (dir, txm) = setup_manager(4096);
    put(&txm, b"k", b"old");
    put(&txm, b"k", b"new");
    let txid = txm.stats().txid;
    drop(txm);

    corrupt_meta(&db_path(&dir), txid % 2, 4096);

    let txm = reopen(&dir, 4096);
    assert_eq!(txm.stats().txid, txid - 1);
    assert_eq!(get(&txm, b"k"), Some(b"old".to_vec()));
    txm.begin_read().check().unwrap();

    // the next commit overwrites the corrupt slot
    put(&txm, b"k", b"newer");
    assert_eq!(txm.stats().txid, txid);
    drop(txm);

    let txm = reopen(&dir, 4096);
    assert_eq!(get(&txm, b"k"), Some(b"newer".to_vec()));
}

#[test]
fn test_both_metas_corrupt() {
    let (dir, txm) = setup_manager(4096);
    put(&txm, b"k", b"v");
    drop(txm);

    corrupt_meta(&db_path(&dir), 0, 4096);
    corrupt_meta(&db_path(&dir), 1, 4096);

    let result = TxManager::open(config(&db_path(&dir), 4096));
    assert!(matches!(result, Err(BurrowError::Corruption(_))));
}

#[test]
fn test_truncated_file_refused() {
    let (dir, txm) = setup_manager(1024);
    for i in 0..200u32 {
        put(&txm, format!("k{:04}", i).as_bytes(), &[b'x'; 50]);
    }
    drop(txm);

    let file = OpenOptions::new().write(true).open(db_path(&dir)).unwrap();
    file.set_len(3 * 1024).unwrap();
    drop(file);

    let result = TxManager::open(config(&db_path(&dir), 1024));
    assert!(matches!(result, Err(BurrowError::Corruption(_))));
}

#[test]
fn test_page_size_comes_from_file() {
    let (dir, txm) = setup_manager(1024);
    put(&txm, b"k", b"v");
    drop(txm);

    let txm = reopen(&dir, 8192);
    assert_eq!(txm.stats().page_size, 1024);
    assert_eq!(get(&txm, b"k"), Some(b"v".to_vec()));

    put(&txm, b"k2", b"v2");
    txm.begin_read().check().unwrap();
}

#[test]
fn test_invalid_page_size_rejected() {
    let dir = TempDir::new().unwrap();
    for page_size in [0, 512, 1000, 131072] {
        let result = TxManager::open(config(&db_path(&dir), page_size));
        assert!(matches!(result, Err(BurrowError::Config(_))));
    }
    assert!(!db_path(&dir).exists());
}
