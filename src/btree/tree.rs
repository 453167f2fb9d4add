//! Copy-on-Write Tree Operations
//!
//! Lookup over any `NodeSource`, plus mutation over a write transaction's
//! arena. Every node on a mutation path is copied into the arena before it
//! changes; committed pages are never written in place.

use crate::error::{BurrowError, Result};
use crate::pager::{pages_needed, PageId, Pager};

use super::{BranchEntry, LeafEntry, Node, NodeArena, NodeRef, NodeSource};

/// Find the value stored under `key`
pub fn lookup<S: NodeSource + ?Sized>(
    source: &S,
    root: NodeRef,
    key: &[u8],
) -> Result<Option<Vec<u8>>> {
    let mut current = root;
    loop {
        let node = source.node(current)?;
        match node.as_ref() {
            Node::Branch(entries) => {
                if entries.is_empty() {
                    return Err(BurrowError::Corruption(format!(
                        "empty branch node at {:?}",
                        current
                    )));
                }
                current = entries[node.child_index(key)].child;
            }
            Node::Leaf(entries) => {
                return Ok(node.search(key).ok().map(|i| entries[i].value.clone()));
            }
        }
    }
}

/// Pages produced by spilling dirty nodes
#[derive(Debug, Default)]
pub struct SpillOutput {
    /// Encoded pages to write, keyed by their first page id
    pub writes: Vec<(PageId, Vec<u8>)>,

    /// Committed page → page holding its replacement
    pub remap: Vec<(PageId, PageId)>,
}

/// Mutable handle on one tree inside a write transaction
pub struct TreeMut<'a> {
    arena: &'a mut NodeArena,
    pager: &'a Pager,
    root: &'a mut NodeRef,
}

/// Descent path: (branch slot, child index taken)
type Path = Vec<(usize, usize)>;

impl<'a> TreeMut<'a> {
    pub fn new(arena: &'a mut NodeArena, pager: &'a Pager, root: &'a mut NodeRef) -> Self {
        Self { arena, pager, root }
    }

    fn page_size(&self) -> usize {
        self.pager.page_size()
    }

    /// Point lookup that sees this transaction's own writes
    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        lookup(&self.arena.view(self.pager), *self.root, key)
    }

    /// Insert or overwrite `key`
    pub fn insert(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        if self.get(key)?.as_deref() == Some(value) {
            return Ok(());
        }

        let (leaf, path) = self.descend_mut(key)?;
        if let Node::Leaf(entries) = self.arena.get_mut(leaf)? {
            match entries.binary_search_by(|e| e.key.as_slice().cmp(key)) {
                Ok(i) => entries[i].value = value.to_vec(),
                Err(i) => entries.insert(
                    i,
                    LeafEntry {
                        key: key.to_vec(),
                        value: value.to_vec(),
                    },
                ),
            }
        }

        self.split_upward(leaf, path)
    }

    /// Remove `key`; returns whether it existed
    ///
    /// Absent keys never trigger copy-on-write.
    pub fn delete(&mut self, key: &[u8]) -> Result<bool> {
        if self.get(key)?.is_none() {
            return Ok(false);
        }

        let (leaf, path) = self.descend_mut(key)?;
        if let Node::Leaf(entries) = self.arena.get_mut(leaf)? {
            if let Ok(i) = entries.binary_search_by(|e| e.key.as_slice().cmp(key)) {
                entries.remove(i);
            }
        }

        self.rebalance_upward(leaf, path)?;
        self.collapse_root()?;
        Ok(true)
    }

    /// Write every dirty node to freshly allocated pages, children first
    pub fn spill(
        &mut self,
        alloc: &mut dyn FnMut(usize) -> PageId,
        out: &mut SpillOutput,
    ) -> Result<PageId> {
        let page_size = self.page_size();
        let root = spill_node(self.arena, page_size, *self.root, alloc, out)?;
        *self.root = NodeRef::Page(root);
        Ok(root)
    }

    // =========================================================================
    // Descent
    // =========================================================================

    /// Copy the root-to-leaf path for `key` into the arena
    fn descend_mut(&mut self, key: &[u8]) -> Result<(usize, Path)> {
        let mut slot = self.arena.materialize(self.pager, *self.root)?;
        *self.root = NodeRef::Dirty(slot);
        let mut path = Path::new();

        loop {
            let node = self.arena.get(slot)?;
            if node.is_leaf() {
                return Ok((slot, path));
            }
            let index = node.child_index(key);
            let child = node.child_at(index).ok_or_else(|| {
                BurrowError::Corruption(format!("empty branch in dirty slot {}", slot))
            })?;

            let child_slot = self.arena.materialize(self.pager, child)?;
            if let Node::Branch(entries) = self.arena.get_mut(slot)? {
                let entry = &mut entries[index];
                entry.child = NodeRef::Dirty(child_slot);
                // only child 0 can receive keys below its bound
                if key < entry.key.as_slice() {
                    entry.key = key.to_vec();
                }
            }

            path.push((slot, index));
            slot = child_slot;
        }
    }

    // =========================================================================
    // Split
    // =========================================================================

    /// Split overflowing nodes from `slot` up towards the root
    fn split_upward(&mut self, mut slot: usize, mut path: Path) -> Result<()> {
        let page_size = self.page_size();

        loop {
            let node = self.arena.get(slot)?;
            if node.len() <= 4 || node.encoded_size() <= page_size {
                return Ok(());
            }

            let node = std::mem::replace(self.arena.get_mut(slot)?, Node::empty_leaf());
            let mut pieces = node.split(page_size).into_iter();
            let first = pieces
                .next()
                .ok_or_else(|| BurrowError::Corruption("split produced no nodes".to_string()))?;
            *self.arena.get_mut(slot)? = first;

            let mut siblings = Vec::new();
            for piece in pieces {
                let key = piece.first_key().unwrap_or_default().to_vec();
                let child = NodeRef::Dirty(self.arena.insert(piece));
                siblings.push(BranchEntry { key, child });
            }
            tracing::trace!("Split dirty slot {} into {} nodes", slot, siblings.len() + 1);

            match path.pop() {
                Some((parent, index)) => {
                    if let Node::Branch(entries) = self.arena.get_mut(parent)? {
                        for (offset, entry) in siblings.into_iter().enumerate() {
                            entries.insert(index + 1 + offset, entry);
                        }
                    }
                    slot = parent;
                }
                None => {
                    let key = self.arena.get(slot)?.first_key().unwrap_or_default().to_vec();
                    let mut entries = vec![BranchEntry {
                        key,
                        child: NodeRef::Dirty(slot),
                    }];
                    entries.extend(siblings);
                    let root = self.arena.insert(Node::Branch(entries));
                    *self.root = NodeRef::Dirty(root);
                    tracing::trace!("Tree grew a level, new root in slot {}", root);
                    slot = root;
                }
            }
        }
    }

    // =========================================================================
    // Rebalance
    // =========================================================================

    /// Below a quarter page, or below the minimum key count
    fn underflows(&self, node: &Node) -> bool {
        node.len() < node.min_keys() || node.encoded_size() < self.page_size() / 4
    }

    /// Merge or redistribute underfull nodes from `slot` up to the root
    fn rebalance_upward(&mut self, mut slot: usize, mut path: Path) -> Result<()> {
        while let Some((parent, index)) = path.pop() {
            if !self.underflows(self.arena.get(slot)?) {
                break;
            }

            let parent_len = self.arena.get(parent)?.len();
            if parent_len < 2 {
                slot = parent;
                continue;
            }

            let left_index = if index > 0 { index - 1 } else { index };
            let (left_ref, right_ref) = {
                let parent_node = self.arena.get(parent)?;
                match (
                    parent_node.child_at(left_index),
                    parent_node.child_at(left_index + 1),
                ) {
                    (Some(l), Some(r)) => (l, r),
                    _ => {
                        return Err(BurrowError::Corruption(format!(
                            "branch slot {} lost child {}",
                            parent, left_index
                        )))
                    }
                }
            };

            let left = self.arena.materialize(self.pager, left_ref)?;
            let right = self.arena.materialize(self.pager, right_ref)?;
            if let Node::Branch(entries) = self.arena.get_mut(parent)? {
                entries[left_index].child = NodeRef::Dirty(left);
                entries[left_index + 1].child = NodeRef::Dirty(right);
            }

            self.rebalance_pair(parent, left_index, left, right)?;
            slot = parent;
        }
        Ok(())
    }

    /// Merge two adjacent siblings, or share their entries around the median
    fn rebalance_pair(
        &mut self,
        parent: usize,
        left_index: usize,
        left: usize,
        right: usize,
    ) -> Result<()> {
        let page_size = self.page_size();
        let left_node = std::mem::replace(self.arena.get_mut(left)?, Node::empty_leaf());
        let right_node = std::mem::replace(self.arena.get_mut(right)?, Node::empty_leaf());

        let combined = match (left_node, right_node) {
            (Node::Leaf(mut l), Node::Leaf(r)) => {
                l.extend(r);
                Node::Leaf(l)
            }
            (Node::Branch(mut l), Node::Branch(r)) => {
                l.extend(r);
                Node::Branch(l)
            }
            _ => {
                return Err(BurrowError::Corruption(format!(
                    "siblings under branch slot {} have different kinds",
                    parent
                )))
            }
        };

        if combined.encoded_size() <= page_size || combined.len() < 2 {
            *self.arena.get_mut(left)? = combined;
            self.arena.discard(right);
            if let Node::Branch(entries) = self.arena.get_mut(parent)? {
                entries.remove(left_index + 1);
            }
            tracing::trace!("Merged dirty slot {} into {}", right, left);
            return Ok(());
        }

        let mid = combined.len() / 2;
        let (l, r) = match combined {
            Node::Leaf(mut entries) => {
                let tail = entries.split_off(mid);
                (Node::Leaf(entries), Node::Leaf(tail))
            }
            Node::Branch(mut entries) => {
                let tail = entries.split_off(mid);
                (Node::Branch(entries), Node::Branch(tail))
            }
        };
        let separator = r.first_key().unwrap_or_default().to_vec();
        *self.arena.get_mut(left)? = l;
        *self.arena.get_mut(right)? = r;
        if let Node::Branch(entries) = self.arena.get_mut(parent)? {
            entries[left_index + 1].key = separator;
        }
        tracing::trace!("Redistributed entries between slots {} and {}", left, right);
        Ok(())
    }

    /// Shrink the height while the root is a branch with one child
    fn collapse_root(&mut self) -> Result<()> {
        loop {
            let slot = match *self.root {
                NodeRef::Dirty(slot) => slot,
                NodeRef::Page(_) => return Ok(()),
            };
            let only_child = match self.arena.get(slot)? {
                Node::Branch(entries) if entries.len() == 1 => entries[0].child,
                _ => return Ok(()),
            };
            self.arena.discard(slot);
            *self.root = only_child;
            tracing::trace!("Root collapsed onto {:?}", only_child);
        }
    }
}

// =============================================================================
// Spill
// =============================================================================

fn spill_node(
    arena: &mut NodeArena,
    page_size: usize,
    node_ref: NodeRef,
    alloc: &mut dyn FnMut(usize) -> PageId,
    out: &mut SpillOutput,
) -> Result<PageId> {
    let slot = match node_ref {
        NodeRef::Page(id) => return Ok(id),
        NodeRef::Dirty(slot) => slot,
    };

    let (mut node, origin) = arena.take(slot)?;
    if let Node::Branch(entries) = &mut node {
        for entry in entries.iter_mut() {
            entry.child = NodeRef::Page(spill_node(arena, page_size, entry.child, alloc, out)?);
        }
    }
    verify_order(&node)?;

    let id = alloc(pages_needed(node.encoded_size(), page_size));
    out.writes.push((id, node.encode(id, page_size)?));
    if let Some(old) = origin {
        out.remap.push((old, id));
    }
    Ok(id)
}

/// Keys strictly increasing; branches never empty
fn verify_order(node: &Node) -> Result<()> {
    if let Node::Branch(entries) = node {
        if entries.is_empty() {
            return Err(BurrowError::Corruption("refusing to write an empty branch".to_string()));
        }
    }
    for i in 1..node.len() {
        if node.key_at(i - 1) >= node.key_at(i) {
            return Err(BurrowError::Corruption(format!(
                "keys out of order at position {} of a {} node",
                i,
                if node.is_leaf() { "leaf" } else { "branch" }
            )));
        }
    }
    Ok(())
}
