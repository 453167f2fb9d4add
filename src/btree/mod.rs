//! B+Tree Module
//!
//! Ordered key/value storage across branch and leaf pages.
//!
//! ## Responsibilities
//! - Lookup by descending separators, binary search in leaves
//! - Copy-on-write insert and delete (split, merge, borrow)
//! - Spill dirty nodes to fresh pages at commit
//! - Cursor iteration and consistency checks over snapshots
//!
//! ## Node identity
//! Nodes are never linked by memory references. A branch child is a
//! `NodeRef`: either a committed `PageId` resolved through the pager, or a
//! slot in the write transaction's `NodeArena`.

mod arena;
mod check;
mod cursor;
mod node;
mod tree;

use std::borrow::Cow;

use crate::error::{BurrowError, Result};
use crate::pager::Pager;

pub use arena::{ArenaView, NodeArena};
pub use check::check_tree;
pub use cursor::{Cursor, Entry, PrefixScan};
pub use node::{BranchEntry, LeafEntry, Node, NodeRef};
pub use tree::{lookup, SpillOutput, TreeMut};

/// Maximum key length in bytes
pub const MAX_KEY_SIZE: usize = 32768;

/// Maximum value length in bytes
pub const MAX_VALUE_SIZE: usize = (1 << 31) - 2;

/// Anything that can resolve a `NodeRef` into a node
pub trait NodeSource {
    fn node(&self, node_ref: NodeRef) -> Result<Cow<'_, Node>>;
}

impl<T: NodeSource + ?Sized> NodeSource for &T {
    fn node(&self, node_ref: NodeRef) -> Result<Cow<'_, Node>> {
        (**self).node(node_ref)
    }
}

impl NodeSource for Pager {
    fn node(&self, node_ref: NodeRef) -> Result<Cow<'_, Node>> {
        match node_ref {
            NodeRef::Page(id) => Ok(Cow::Owned(Node::decode(&self.read_page(id)?)?)),
            NodeRef::Dirty(slot) => Err(BurrowError::Corruption(format!(
                "committed view asked for dirty slot {}",
                slot
            ))),
        }
    }
}
