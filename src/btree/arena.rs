//! Node Arena
//!
//! Dirty nodes owned by one write transaction, addressed by slot index.

use std::borrow::Cow;

use crate::error::{BurrowError, Result};
use crate::pager::{PageHeader, PageId, Pager};

use super::{Node, NodeRef, NodeSource};

/// A node copied out of a committed page (or created fresh)
#[derive(Debug)]
struct DirtyNode {
    node: Node,
    /// Page this node was copied from, if any
    origin: Option<PageId>,
}

/// Working set of a write transaction
///
/// Materialising a committed page records the page (and its overflow) as
/// freed by this transaction; the copy lives here until commit spills it.
#[derive(Debug, Default)]
pub struct NodeArena {
    slots: Vec<Option<DirtyNode>>,

    /// Pages superseded by copy-on-write: (first page, overflow count)
    freed: Vec<(PageId, u32)>,
}

impl NodeArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether any node was copied or created
    pub fn is_dirty(&self) -> bool {
        !self.slots.is_empty()
    }

    /// Pages superseded so far
    pub fn freed(&self) -> &[(PageId, u32)] {
        &self.freed
    }

    /// Add a brand new node
    pub fn insert(&mut self, node: Node) -> usize {
        self.slots.push(Some(DirtyNode { node, origin: None }));
        self.slots.len() - 1
    }

    /// Copy-on-write: return the slot holding a private copy of `node_ref`
    pub fn materialize(&mut self, pager: &Pager, node_ref: NodeRef) -> Result<usize> {
        match node_ref {
            NodeRef::Dirty(slot) => Ok(slot),
            NodeRef::Page(id) => {
                let page = pager.read_page(id)?;
                let header = PageHeader::decode(&page)?;
                let node = Node::decode(&page)?;

                self.freed.push((id, header.overflow));
                self.slots.push(Some(DirtyNode {
                    node,
                    origin: Some(id),
                }));
                tracing::trace!("Copied page {} into dirty slot {}", id, self.slots.len() - 1);
                Ok(self.slots.len() - 1)
            }
        }
    }

    /// Borrow a dirty node
    pub fn get(&self, slot: usize) -> Result<&Node> {
        self.slots
            .get(slot)
            .and_then(Option::as_ref)
            .map(|d| &d.node)
            .ok_or_else(|| Self::missing(slot))
    }

    /// Mutably borrow a dirty node
    pub fn get_mut(&mut self, slot: usize) -> Result<&mut Node> {
        self.slots
            .get_mut(slot)
            .and_then(Option::as_mut)
            .map(|d| &mut d.node)
            .ok_or_else(|| Self::missing(slot))
    }

    /// Drop a node that is no longer referenced (merged away, collapsed root)
    pub fn discard(&mut self, slot: usize) {
        if let Some(entry) = self.slots.get_mut(slot) {
            *entry = None;
        }
    }

    /// Move a node out for spilling, returning it with its origin page
    pub fn take(&mut self, slot: usize) -> Result<(Node, Option<PageId>)> {
        self.slots
            .get_mut(slot)
            .and_then(Option::take)
            .map(|d| (d.node, d.origin))
            .ok_or_else(|| Self::missing(slot))
    }

    /// Read-only view combining the arena and committed pages
    pub fn view<'a>(&'a self, pager: &'a Pager) -> ArenaView<'a> {
        ArenaView { arena: self, pager }
    }

    fn missing(slot: usize) -> BurrowError {
        BurrowError::Corruption(format!("dirty slot {} is empty", slot))
    }
}

/// Resolves dirty slots from the arena and pages from the pager
pub struct ArenaView<'a> {
    arena: &'a NodeArena,
    pager: &'a Pager,
}

impl NodeSource for ArenaView<'_> {
    fn node(&self, node_ref: NodeRef) -> Result<Cow<'_, Node>> {
        match node_ref {
            NodeRef::Dirty(slot) => Ok(Cow::Borrowed(self.arena.get(slot)?)),
            NodeRef::Page(_) => self.pager.node(node_ref),
        }
    }
}
