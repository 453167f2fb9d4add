//! Tree Tests
//!
//! These tests verify:
//! - Inserts, overwrites and deletes through the arena
//! - Splits and merges keep the tree balanced and ordered
//! - Spilled trees read back from committed pages
//! - Copy-on-write never touches the pages of an older root

use std::collections::HashSet;

use burrowkv::btree::{check_tree, lookup, NodeArena, NodeRef, TreeMut};
use burrowkv::pager::PageKind;

use crate::common::{committed_tree, empty_tree, key, setup_temp_pager, spill_to, value};

// =============================================================================
// In-Arena Mutation
// =============================================================================

#[test]
fn test_insert_and_get_before_spill() {
    let (_dir, pager) = setup_temp_pager(4096);
    let (mut arena, mut root) = empty_tree();
    let mut tree = TreeMut::new(&mut arena, &pager, &mut root);

    tree.insert(b"banana", b"yellow").unwrap();
    tree.insert(b"apple", b"red").unwrap();
    tree.insert(b"cherry", b"dark").unwrap();

    assert_eq!(tree.get(b"apple").unwrap(), Some(b"red".to_vec()));
    assert_eq!(tree.get(b"banana").unwrap(), Some(b"yellow".to_vec()));
    assert_eq!(tree.get(b"durian").unwrap(), None);
}

#[test]
fn test_overwrite() {
    let (_dir, pager) = setup_temp_pager(4096);
    let (mut arena, mut root) = empty_tree();
    let mut tree = TreeMut::new(&mut arena, &pager, &mut root);

    tree.insert(b"k", b"one").unwrap();
    tree.insert(b"k", b"two").unwrap();
    assert_eq!(tree.get(b"k").unwrap(), Some(b"two".to_vec()));
}

#[test]
fn test_delete_in_arena() {
    let (_dir, pager) = setup_temp_pager(4096);
    let (mut arena, mut root) = empty_tree();
    let mut tree = TreeMut::new(&mut arena, &pager, &mut root);

    tree.insert(b"k", b"v").unwrap();
    assert!(tree.delete(b"k").unwrap());
    assert!(!tree.delete(b"k").unwrap());
    assert_eq!(tree.get(b"k").unwrap(), None);
}

// =============================================================================
// Spill And Read Back
// =============================================================================

#[test]
fn test_large_tree_spills_into_branches() {
    let (_dir, pager) = setup_temp_pager(1024);
    let (root, next) = committed_tree(&pager, 2000, 20);

    let header = pager.read_header(root).unwrap();
    assert_eq!(header.kind, PageKind::Branch);

    let mut seen = HashSet::new();
    assert_eq!(check_tree(&pager, root, next, &mut seen).unwrap(), 2000);

    for i in (0..2000).step_by(37) {
        assert_eq!(
            lookup(&pager, NodeRef::Page(root), &key(i)).unwrap(),
            Some(value(i, 20))
        );
    }
    assert_eq!(lookup(&pager, NodeRef::Page(root), b"zzz").unwrap(), None);
}

#[test]
fn test_reverse_insert_order() {
    let (_dir, pager) = setup_temp_pager(1024);
    let (mut arena, mut root) = empty_tree();
    {
        let mut tree = TreeMut::new(&mut arena, &pager, &mut root);
        for i in (0..500).rev() {
            tree.insert(&key(i), &value(i, 10)).unwrap();
        }
    }

    let mut next = 2;
    let root_id = spill_to(&pager, &mut arena, &mut root, &mut next);

    let mut seen = HashSet::new();
    assert_eq!(check_tree(&pager, root_id, next, &mut seen).unwrap(), 500);
}

#[test]
fn test_oversized_value_uses_overflow_pages() {
    let (_dir, pager) = setup_temp_pager(1024);
    let (root, next) = committed_tree(&pager, 3, 5000);

    let header = pager.read_header(root).unwrap();
    assert!(header.overflow > 0);

    let mut seen = HashSet::new();
    assert_eq!(check_tree(&pager, root, next, &mut seen).unwrap(), 3);
    assert_eq!(seen.len() as u64, header.span());
    assert_eq!(
        lookup(&pager, NodeRef::Page(root), &key(1)).unwrap(),
        Some(value(1, 5000))
    );
}

#[test]
fn test_delete_most_keys_rebalances() {
    let (_dir, pager) = setup_temp_pager(1024);
    let (root, mut next) = committed_tree(&pager, 1000, 20);

    let mut arena = NodeArena::new();
    let mut root_ref = NodeRef::Page(root);
    {
        let mut tree = TreeMut::new(&mut arena, &pager, &mut root_ref);
        for i in 0..1000 {
            if i % 10 != 0 {
                assert!(tree.delete(&key(i)).unwrap());
            }
        }
    }

    let new_root = spill_to(&pager, &mut arena, &mut root_ref, &mut next);
    let mut seen = HashSet::new();
    assert_eq!(check_tree(&pager, new_root, next, &mut seen).unwrap(), 100);

    for i in 0..1000 {
        let expected = (i % 10 == 0).then(|| value(i, 20));
        assert_eq!(lookup(&pager, NodeRef::Page(new_root), &key(i)).unwrap(), expected);
    }
}

#[test]
fn test_delete_everything_leaves_empty_tree() {
    let (_dir, pager) = setup_temp_pager(1024);
    let (root, mut next) = committed_tree(&pager, 300, 20);

    let mut arena = NodeArena::new();
    let mut root_ref = NodeRef::Page(root);
    {
        let mut tree = TreeMut::new(&mut arena, &pager, &mut root_ref);
        for i in 0..300 {
            assert!(tree.delete(&key(i)).unwrap());
        }
    }

    let new_root = spill_to(&pager, &mut arena, &mut root_ref, &mut next);
    let mut seen = HashSet::new();
    assert_eq!(check_tree(&pager, new_root, next, &mut seen).unwrap(), 0);
    assert_eq!(lookup(&pager, NodeRef::Page(new_root), &key(0)).unwrap(), None);
}

// =============================================================================
// Copy-On-Write
// =============================================================================

#[test]
fn test_old_root_untouched_by_new_version() {
    let (_dir, pager) = setup_temp_pager(1024);
    let (old_root, mut next) = committed_tree(&pager, 400, 20);

    let mut arena = NodeArena::new();
    let mut root_ref = NodeRef::Page(old_root);
    {
        let mut tree = TreeMut::new(&mut arena, &pager, &mut root_ref);
        tree.insert(&key(7), b"changed").unwrap();
        tree.delete(&key(8)).unwrap();
        tree.insert(b"new-key", b"new").unwrap();
    }
    assert!(!arena.freed().is_empty());
    assert!(arena.freed().iter().any(|(id, _)| *id == old_root));

    let new_root = spill_to(&pager, &mut arena, &mut root_ref, &mut next);
    assert_ne!(new_root, old_root);

    // old version still reads the same
    assert_eq!(
        lookup(&pager, NodeRef::Page(old_root), &key(7)).unwrap(),
        Some(value(7, 20))
    );
    assert_eq!(
        lookup(&pager, NodeRef::Page(old_root), &key(8)).unwrap(),
        Some(value(8, 20))
    );
    let mut seen = HashSet::new();
    assert_eq!(check_tree(&pager, old_root, next, &mut seen).unwrap(), 400);

    // new version sees the changes
    let new = NodeRef::Page(new_root);
    assert_eq!(lookup(&pager, new, &key(7)).unwrap(), Some(b"changed".to_vec()));
    assert_eq!(lookup(&pager, new, &key(8)).unwrap(), None);
    assert_eq!(lookup(&pager, new, b"new-key").unwrap(), Some(b"new".to_vec()));
}

#[test]
fn test_absent_delete_copies_nothing() {
    let (_dir, pager) = setup_temp_pager(1024);
    let (root, _) = committed_tree(&pager, 100, 20);

    let mut arena = NodeArena::new();
    let mut root_ref = NodeRef::Page(root);
    let mut tree = TreeMut::new(&mut arena, &pager, &mut root_ref);
    assert!(!tree.delete(b"missing").unwrap());

    assert!(!arena.is_dirty());
    assert_eq!(root_ref, NodeRef::Page(root));
}

#[test]
fn test_identical_put_copies_nothing() {
    let (_dir, pager) = setup_temp_pager(1024);
    let (root, _) = committed_tree(&pager, 100, 20);

    let mut arena = NodeArena::new();
    let mut root_ref = NodeRef::Page(root);
    let mut tree = TreeMut::new(&mut arena, &pager, &mut root_ref);
    tree.insert(&key(5), &value(5, 20)).unwrap();

    assert!(!arena.is_dirty());
}
