//! Tree Consistency Check
//!
//! Walks a committed tree and verifies the structural invariants:
//! key order, separator bounds, uniform leaf depth, page ownership.

use std::collections::HashSet;

use crate::error::{BurrowError, Result};
use crate::pager::{PageId, PageKind, Pager, FIRST_DATA_PAGE};

use super::{Node, NodeRef, NodeSource};

/// Check the tree rooted at `root`
///
/// Every page the tree owns (overflow included) is added to `seen`; a page
/// already present there is reported as shared. Returns the number of
/// key/value pairs in the tree.
pub fn check_tree(
    pager: &Pager,
    root: PageId,
    high_water: PageId,
    seen: &mut HashSet<PageId>,
) -> Result<u64> {
    let mut walk = Walk {
        pager,
        high_water,
        seen,
        leaf_depth: None,
    };
    walk.visit(root, None, None, 0, true)
}

struct Walk<'a> {
    pager: &'a Pager,
    high_water: PageId,
    seen: &'a mut HashSet<PageId>,
    leaf_depth: Option<usize>,
}

impl Walk<'_> {
    fn visit(
        &mut self,
        id: PageId,
        lower: Option<&[u8]>,
        upper: Option<&[u8]>,
        depth: usize,
        is_root: bool,
    ) -> Result<u64> {
        self.claim(id)?;
        let node = self.pager.node(NodeRef::Page(id))?.into_owned();

        for i in 0..node.len() {
            let key = node.key_at(i);
            if i > 0 && node.key_at(i - 1) >= key {
                return Err(corrupt(id, format!("keys out of order at position {}", i)));
            }
            if lower.is_some_and(|l| key < l) {
                return Err(corrupt(id, format!("key {} below its separator", i)));
            }
            if upper.is_some_and(|u| key >= u) {
                return Err(corrupt(id, format!("key {} not below the next separator", i)));
            }
        }

        match &node {
            Node::Leaf(entries) => {
                match self.leaf_depth {
                    None => self.leaf_depth = Some(depth),
                    Some(d) if d != depth => {
                        return Err(corrupt(id, format!("leaf at depth {}, expected {}", depth, d)))
                    }
                    Some(_) => {}
                }
                Ok(entries.len() as u64)
            }
            Node::Branch(entries) => {
                if entries.is_empty() {
                    return Err(corrupt(id, "branch has no children".to_string()));
                }
                if is_root && entries.len() == 1 {
                    tracing::debug!("Root branch {} has a single child", id);
                }
                let mut total = 0;
                for (i, entry) in entries.iter().enumerate() {
                    let child = match entry.child {
                        NodeRef::Page(child) => child,
                        NodeRef::Dirty(slot) => {
                            return Err(corrupt(id, format!("points at dirty slot {}", slot)))
                        }
                    };
                    let next = entries.get(i + 1).map(|e| e.key.as_slice()).or(upper);
                    total += self.visit(child, Some(entry.key.as_slice()), next, depth + 1, false)?;
                }
                Ok(total)
            }
        }
    }

    /// Record `id` and its overflow pages as owned by this tree
    fn claim(&mut self, id: PageId) -> Result<()> {
        if id < FIRST_DATA_PAGE || id >= self.high_water {
            return Err(corrupt(id, format!("outside data range ..{}", self.high_water)));
        }
        let header = self.pager.read_header(id)?;
        if !matches!(header.kind, PageKind::Branch | PageKind::Leaf) {
            return Err(corrupt(id, format!("unexpected {:?} page in tree", header.kind)));
        }
        for page in id..id + header.span() {
            if page >= self.high_water {
                return Err(corrupt(id, "overflow runs past the high-water mark".to_string()));
            }
            if !self.seen.insert(page) {
                return Err(corrupt(page, "reachable more than once".to_string()));
            }
        }
        Ok(())
    }
}

fn corrupt(id: PageId, detail: String) -> BurrowError {
    BurrowError::Corruption(format!("page {}: {}", id, detail))
}
