//! Pager File Tests
//!
//! These tests verify:
//! - Page writes and reads at the right offsets
//! - Overflow pages are read together with their first page
//! - Header id mismatches are reported as corruption
//! - Spans past the end of the file are corruption, not a crash
//! - Concurrent readers share the file without a cursor

use std::sync::Arc;
use std::thread;

use burrowkv::btree::{LeafEntry, Node};
use burrowkv::pager::{PageHeader, PageKind, Pager};
use burrowkv::BurrowError;
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn setup_temp_pager(page_size: usize) -> (TempDir, Pager) {
    let temp_dir = TempDir::new().unwrap();
    let pager = Pager::open(&temp_dir.path().join("pages.db"), page_size).unwrap();
    (temp_dir, pager)
}

fn leaf(pairs: &[(&[u8], &[u8])]) -> Node {
    Node::Leaf(
        pairs
            .iter()
            .map(|(k, v)| LeafEntry {
                key: k.to_vec(),
                value: v.to_vec(),
            })
            .collect(),
    )
}

// =============================================================================
// Tests
// =============================================================================

#[test]
fn test_new_file_is_empty() {
    let (_dir, pager) = setup_temp_pager(4096);
    assert!(pager.is_empty().unwrap());
    assert_eq!(pager.page_size(), 4096);
}

#[test]
fn test_grow_extends_file() {
    let (_dir, pager) = setup_temp_pager(1024);
    pager.grow(5).unwrap();
    assert_eq!(pager.len().unwrap(), 5 * 1024);

    // never shrinks
    pager.grow(2).unwrap();
    assert_eq!(pager.len().unwrap(), 5 * 1024);
}

#[test]
fn test_write_and_read_page() {
    let (_dir, pager) = setup_temp_pager(4096);
    let node = leaf(&[(b"alpha", b"1"), (b"beta", b"2")]);

    pager.grow(4).unwrap();
    pager.write_pages(3, &node.encode(3, 4096).unwrap()).unwrap();

    let page = pager.read_page(3).unwrap();
    assert_eq!(page.len(), 4096);
    assert_eq!(Node::decode(&page).unwrap(), node);

    let header = pager.read_header(3).unwrap();
    assert_eq!(header.kind, PageKind::Leaf);
    assert_eq!(header.count, 2);
}

#[test]
fn test_overflow_page_read() {
    let (_dir, pager) = setup_temp_pager(4096);
    let big = vec![0x5A; 10_000];
    let node = leaf(&[(b"big", &big)]);

    let bytes = node.encode(2, 4096).unwrap();
    assert_eq!(bytes.len(), 3 * 4096);

    pager.grow(5).unwrap();
    pager.write_pages(2, &bytes).unwrap();

    let page = pager.read_page(2).unwrap();
    assert_eq!(page.len(), 3 * 4096);
    assert_eq!(pager.read_header(2).unwrap().span(), 3);
    assert_eq!(Node::decode(&page).unwrap(), node);
}

#[test]
fn test_write_partial_page_rejected() {
    let (_dir, pager) = setup_temp_pager(4096);
    let err = pager.write_pages(2, &[0u8; 100]).unwrap_err();
    assert!(matches!(err, BurrowError::InvalidArgument(_)));
}

#[test]
fn test_header_id_mismatch() {
    let (_dir, pager) = setup_temp_pager(4096);
    let node = leaf(&[(b"k", b"v")]);

    pager.grow(4).unwrap();
    // encoded for page 7, stored at page 2
    pager.write_pages(2, &node.encode(7, 4096).unwrap()).unwrap();

    assert!(matches!(pager.read_page(2), Err(BurrowError::Corruption(_))));
    assert!(matches!(pager.read_header(2), Err(BurrowError::Corruption(_))));
}

#[test]
fn test_read_past_end() {
    let (_dir, pager) = setup_temp_pager(4096);
    pager.grow(2).unwrap();
    assert!(matches!(pager.read_page(9), Err(BurrowError::Io(_))));
}

#[test]
fn test_overflow_past_end_is_corruption() {
    let (_dir, pager) = setup_temp_pager(1024);
    pager.grow(4).unwrap();

    let mut page = vec![0u8; 1024];
    PageHeader {
        id: 3,
        kind: PageKind::Leaf,
        count: 0,
        overflow: u32::MAX,
    }
    .encode_into(&mut page);
    pager.write_pages(3, &page).unwrap();

    assert!(matches!(pager.read_page(3), Err(BurrowError::Corruption(_))));
}

#[test]
fn test_read_raw_huge_count_is_corruption() {
    let (_dir, pager) = setup_temp_pager(1024);
    pager.grow(4).unwrap();

    assert_eq!(pager.read_raw(2, 2).unwrap().len(), 2048);
    assert!(matches!(pager.read_raw(2, 3), Err(BurrowError::Corruption(_))));
    assert!(matches!(
        pager.read_raw(2, u64::MAX),
        Err(BurrowError::Corruption(_))
    ));
}

#[test]
fn test_concurrent_positional_reads() {
    let (_dir, pager) = setup_temp_pager(1024);
    pager.grow(10).unwrap();
    for id in 2..10u64 {
        let value = id.to_le_bytes();
        let node = leaf(&[(b"page", &value)]);
        pager.write_pages(id, &node.encode(id, 1024).unwrap()).unwrap();
    }

    let pager = Arc::new(pager);
    let handles: Vec<_> = (0..4)
        .map(|_| {
            let pager = Arc::clone(&pager);
            thread::spawn(move || {
                for _ in 0..200 {
                    for id in 2..10u64 {
                        let node = Node::decode(&pager.read_page(id).unwrap()).unwrap();
                        let value = id.to_le_bytes();
                        assert_eq!(node, leaf(&[(b"page", &value)]));
                    }
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }
}
