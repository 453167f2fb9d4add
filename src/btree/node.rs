//! B+Tree Nodes
//!
//! In-memory form of branch and leaf pages, plus their page codec.
//!
//! ## Leaf element
//! ```text
//! ┌────────────┬──────────────┬─────┬───────┐
//! │ KeyLen (4) │ ValueLen (4) │ Key │ Value │
//! └────────────┴──────────────┴─────┴───────┘
//! ```
//!
//! ## Branch element
//! ```text
//! ┌───────────┬────────────┬─────┐
//! │ Child (8) │ KeyLen (4) │ Key │
//! └───────────┴────────────┴─────┘
//! ```

use std::cmp::Ordering;

use bytes::{Buf, BufMut};

use crate::error::{BurrowError, Result};
use crate::pager::{pages_needed, PageHeader, PageId, PageKind, PAGE_HEADER_SIZE};

const LEAF_ELEMENT_HEADER: usize = 8;
const BRANCH_ELEMENT_HEADER: usize = 12;

/// Reference to a child node: a committed page or a dirty arena slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeRef {
    Page(PageId),
    Dirty(usize),
}

/// Key/value pair stored in a leaf
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeafEntry {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
}

/// Separator and child stored in a branch
///
/// `key` is a lower bound for every key under `child`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchEntry {
    pub key: Vec<u8>,
    pub child: NodeRef,
}

/// A decoded (or dirty) tree node
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Leaf(Vec<LeafEntry>),
    Branch(Vec<BranchEntry>),
}

impl Node {
    /// An empty leaf (root of an empty tree)
    pub fn empty_leaf() -> Self {
        Node::Leaf(Vec::new())
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self, Node::Leaf(_))
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        match self {
            Node::Leaf(entries) => entries.len(),
            Node::Branch(entries) => entries.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// First key in the node (the lower bound for branches)
    pub fn first_key(&self) -> Option<&[u8]> {
        match self {
            Node::Leaf(entries) => entries.first().map(|e| e.key.as_slice()),
            Node::Branch(entries) => entries.first().map(|e| e.key.as_slice()),
        }
    }

    /// Key at position `index`
    pub fn key_at(&self, index: usize) -> &[u8] {
        match self {
            Node::Leaf(entries) => &entries[index].key,
            Node::Branch(entries) => &entries[index].key,
        }
    }

    /// Fewest entries a non-root node may hold
    pub fn min_keys(&self) -> usize {
        if self.is_leaf() {
            1
        } else {
            2
        }
    }

    /// Bytes this node occupies on disk, header included
    pub fn encoded_size(&self) -> usize {
        let elements: usize = match self {
            Node::Leaf(entries) => entries
                .iter()
                .map(|e| LEAF_ELEMENT_HEADER + e.key.len() + e.value.len())
                .sum(),
            Node::Branch(entries) => entries
                .iter()
                .map(|e| BRANCH_ELEMENT_HEADER + e.key.len())
                .sum(),
        };
        PAGE_HEADER_SIZE + elements
    }

    // =========================================================================
    // Search
    // =========================================================================

    /// Binary search a leaf: `Ok(i)` exact match, `Err(i)` insertion point
    pub fn search(&self, key: &[u8]) -> std::result::Result<usize, usize> {
        match self {
            Node::Leaf(entries) => entries.binary_search_by(|e| e.key.as_slice().cmp(key)),
            Node::Branch(entries) => entries.binary_search_by(|e| e.key.as_slice().cmp(key)),
        }
    }

    /// Child to descend into: the rightmost separator `<= key`, or child 0
    pub fn child_index(&self, key: &[u8]) -> usize {
        match self {
            Node::Branch(entries) => entries
                .partition_point(|e| e.key.as_slice().cmp(key) != Ordering::Greater)
                .saturating_sub(1),
            Node::Leaf(_) => 0,
        }
    }

    /// Child reference at `index` (branches only)
    pub fn child_at(&self, index: usize) -> Option<NodeRef> {
        match self {
            Node::Branch(entries) => entries.get(index).map(|e| e.child),
            Node::Leaf(_) => None,
        }
    }

    /// Split into pieces at the median until each piece fits a page
    ///
    /// Nodes with four or fewer entries are never split; a single oversized
    /// entry is stored on overflow pages instead.
    pub fn split(self, page_size: usize) -> Vec<Node> {
        if self.len() <= 4 || self.encoded_size() <= page_size {
            return vec![self];
        }

        let mid = self.len() / 2;
        let (left, right) = match self {
            Node::Leaf(mut entries) => {
                let right = entries.split_off(mid);
                (Node::Leaf(entries), Node::Leaf(right))
            }
            Node::Branch(mut entries) => {
                let right = entries.split_off(mid);
                (Node::Branch(entries), Node::Branch(right))
            }
        };

        let mut pieces = left.split(page_size);
        pieces.extend(right.split(page_size));
        pieces
    }

    // =========================================================================
    // Page Codec
    // =========================================================================

    /// Encode into a buffer of whole pages with the header for `page_id`
    ///
    /// All branch children must already be committed pages.
    pub fn encode(&self, page_id: PageId, page_size: usize) -> Result<Vec<u8>> {
        let span = pages_needed(self.encoded_size(), page_size);
        let mut buf = vec![0u8; span * page_size];

        let (kind, count) = match self {
            Node::Leaf(entries) => (PageKind::Leaf, entries.len()),
            Node::Branch(entries) => (PageKind::Branch, entries.len()),
        };
        let count = u16::try_from(count).map_err(|_| {
            BurrowError::Corruption(format!("node for page {} has {} entries", page_id, count))
        })?;

        PageHeader {
            id: page_id,
            kind,
            count,
            overflow: (span - 1) as u32,
        }
        .encode_into(&mut buf);

        let mut body = &mut buf[PAGE_HEADER_SIZE..];
        match self {
            Node::Leaf(entries) => {
                for e in entries {
                    body.put_u32_le(e.key.len() as u32);
                    body.put_u32_le(e.value.len() as u32);
                    body.put_slice(&e.key);
                    body.put_slice(&e.value);
                }
            }
            Node::Branch(entries) => {
                for e in entries {
                    let child = match e.child {
                        NodeRef::Page(id) => id,
                        NodeRef::Dirty(slot) => {
                            return Err(BurrowError::Corruption(format!(
                                "branch page {} still points at dirty slot {}",
                                page_id, slot
                            )))
                        }
                    };
                    body.put_u64_le(child);
                    body.put_u32_le(e.key.len() as u32);
                    body.put_slice(&e.key);
                }
            }
        }

        Ok(buf)
    }

    /// Decode a branch or leaf page (header included)
    pub fn decode(page: &[u8]) -> Result<Node> {
        let header = PageHeader::decode(page)?;
        let mut body = &page[PAGE_HEADER_SIZE..];
        let count = header.count as usize;

        match header.kind {
            PageKind::Leaf => {
                let mut entries = Vec::with_capacity(count);
                for _ in 0..count {
                    need(body, LEAF_ELEMENT_HEADER, header.id)?;
                    let key_len = body.get_u32_le() as usize;
                    let value_len = body.get_u32_le() as usize;
                    need(body, key_len + value_len, header.id)?;
                    let key = body[..key_len].to_vec();
                    body.advance(key_len);
                    let value = body[..value_len].to_vec();
                    body.advance(value_len);
                    entries.push(LeafEntry { key, value });
                }
                Ok(Node::Leaf(entries))
            }
            PageKind::Branch => {
                let mut entries = Vec::with_capacity(count);
                for _ in 0..count {
                    need(body, BRANCH_ELEMENT_HEADER, header.id)?;
                    let child = body.get_u64_le();
                    let key_len = body.get_u32_le() as usize;
                    need(body, key_len, header.id)?;
                    let key = body[..key_len].to_vec();
                    body.advance(key_len);
                    entries.push(BranchEntry {
                        key,
                        child: NodeRef::Page(child),
                    });
                }
                Ok(Node::Branch(entries))
            }
            other => Err(BurrowError::Corruption(format!(
                "page {} is {:?}, expected branch or leaf",
                header.id, other
            ))),
        }
    }
}

/// Bounds check before reading `len` bytes of an element
fn need(body: &[u8], len: usize, page_id: PageId) -> Result<()> {
    if body.len() < len {
        return Err(BurrowError::Corruption(format!(
            "page {} element runs past the end of the page",
            page_id
        )));
    }
    Ok(())
}
