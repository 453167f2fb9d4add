//! Cursor
//!
//! Ordered iteration over one tree of a snapshot.
//!
//! The cursor keeps the root-to-leaf path as a stack of decoded nodes and
//! the index taken at each level. Moving past the end of a leaf pops up to
//! the nearest ancestor with a next child and descends leftmost from there.

use crate::error::{BurrowError, Result};

use super::{Node, NodeRef, NodeSource};

/// Key/value pair yielded by iteration
pub type Entry = (Vec<u8>, Vec<u8>);

struct Frame {
    node: Node,
    index: usize,
}

/// Positioned iterator over a tree
///
/// Not restartable: once it runs off the end, `next` keeps returning `None`
/// until the cursor is repositioned with `seek` or `first`.
pub struct Cursor<S> {
    source: S,
    root: NodeRef,
    stack: Vec<Frame>,
    started: bool,
}

impl<S: NodeSource> Cursor<S> {
    pub fn new(source: S, root: NodeRef) -> Self {
        Self {
            source,
            root,
            stack: Vec::new(),
            started: false,
        }
    }

    /// Position on the smallest key
    pub fn first(&mut self) -> Result<Option<Entry>> {
        self.seek(&[])
    }

    /// Position on the smallest key `>= key`
    pub fn seek(&mut self, key: &[u8]) -> Result<Option<Entry>> {
        self.stack.clear();
        self.started = true;

        let mut current = self.root;
        loop {
            let node = self.source.node(current)?.into_owned();
            let (index, next) = match &node {
                Node::Branch(entries) => {
                    if entries.is_empty() {
                        return Err(BurrowError::Corruption(format!(
                            "empty branch at {:?}",
                            current
                        )));
                    }
                    let index = node.child_index(key);
                    (index, Some(entries[index].child))
                }
                Node::Leaf(entries) => (entries.partition_point(|e| e.key.as_slice() < key), None),
            };
            self.stack.push(Frame { node, index });

            match next {
                Some(child) => current = child,
                None => break,
            }
        }

        self.settle()
    }

    /// Advance to the next key (the first key if never positioned)
    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) -> Result<Option<Entry>> {
        if !self.started {
            return self.first();
        }
        match self.stack.last_mut() {
            Some(frame) => frame.index += 1,
            None => return Ok(None),
        }
        self.settle()
    }

    /// Return the entry under the leaf frame, skipping to later leaves as needed
    fn settle(&mut self) -> Result<Option<Entry>> {
        loop {
            let Some(frame) = self.stack.last() else {
                return Ok(None);
            };
            if let Node::Leaf(entries) = &frame.node {
                if let Some(e) = entries.get(frame.index) {
                    return Ok(Some((e.key.clone(), e.value.clone())));
                }
            }
            if !self.next_leaf()? {
                self.stack.clear();
                return Ok(None);
            }
        }
    }

    /// Move to the leftmost leaf of the next subtree; false when exhausted
    fn next_leaf(&mut self) -> Result<bool> {
        loop {
            self.stack.pop();
            let Some(frame) = self.stack.last_mut() else {
                return Ok(false);
            };
            if frame.index + 1 < frame.node.len() {
                frame.index += 1;
                break;
            }
        }

        let mut current = self
            .stack
            .last()
            .and_then(|f| f.node.child_at(f.index))
            .ok_or_else(|| BurrowError::Corruption("cursor lost its branch".to_string()))?;

        loop {
            let node = self.source.node(current)?.into_owned();
            let next = node.child_at(0);
            self.stack.push(Frame { node, index: 0 });
            match next {
                Some(child) => current = child,
                None => return Ok(true),
            }
        }
    }
}

// =============================================================================
// Prefix Scan
// =============================================================================

/// Lazy scan of keys sharing a prefix, in ascending order
///
/// Stops at the first key without the prefix; after an error the scan is
/// finished.
pub struct PrefixScan<S> {
    cursor: Cursor<S>,
    prefix: Vec<u8>,
    started: bool,
    done: bool,
}

impl<S: NodeSource> PrefixScan<S> {
    pub fn new(source: S, root: NodeRef, prefix: &[u8]) -> Self {
        Self {
            cursor: Cursor::new(source, root),
            prefix: prefix.to_vec(),
            started: false,
            done: false,
        }
    }
}

impl<S: NodeSource> Iterator for PrefixScan<S> {
    type Item = Result<Entry>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let step = if self.started {
            self.cursor.next()
        } else {
            self.started = true;
            self.cursor.seek(&self.prefix)
        };

        match step {
            Ok(Some((key, value))) if key.starts_with(&self.prefix) => Some(Ok((key, value))),
            Ok(_) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

impl<S: NodeSource> std::iter::FusedIterator for PrefixScan<S> {}
