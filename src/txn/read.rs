//! Read Transactions
//!
//! A read transaction pins one committed meta page. Everything it reaches
//! stays valid until the last clone is dropped: pages freed by later commits
//! are held back while the snapshot is registered.

use std::borrow::Cow;
use std::collections::HashSet;
use std::io::Write;
use std::sync::Arc;

use crate::backup;
use crate::btree::{lookup, Cursor, Node, NodeRef, NodeSource, PrefixScan};
use crate::error::{BurrowError, Result};
use crate::pager::{FreeList, Meta, PageId, Pager, TxId};

use super::{walk_snapshot, CheckReport, Shared};

struct ReadInner {
    shared: Arc<Shared>,
    meta: Meta,
}

impl Drop for ReadInner {
    fn drop(&mut self) {
        self.shared.unregister_reader(self.meta.txid);
        tracing::trace!("Read transaction at txid {} closed", self.meta.txid);
    }
}

/// Read-only view of one commit
///
/// Cheap to clone; the snapshot is released when the last clone drops.
#[derive(Clone)]
pub struct ReadTxn {
    inner: Arc<ReadInner>,
}

impl ReadTxn {
    pub(crate) fn new(shared: Arc<Shared>, meta: Meta) -> Self {
        tracing::trace!("Read transaction opened at txid {}", meta.txid);
        Self {
            inner: Arc::new(ReadInner { shared, meta }),
        }
    }

    /// Txid of the commit this snapshot sees
    pub fn txid(&self) -> TxId {
        self.inner.meta.txid
    }

    /// Bytes a backup of this snapshot produces
    pub fn size(&self) -> u64 {
        self.inner.meta.high_water * self.inner.meta.page_size as u64
    }

    pub(crate) fn meta(&self) -> &Meta {
        &self.inner.meta
    }

    pub(crate) fn pager(&self) -> &Pager {
        &self.inner.shared.pager
    }

    /// Open a bucket by name
    pub fn bucket(&self, name: &str) -> Result<Option<Bucket>> {
        let root = lookup(self.pager(), NodeRef::Page(self.meta().root), name.as_bytes())?;
        match root {
            Some(bytes) => Ok(Some(Bucket {
                txn: self.clone(),
                root: decode_root(&bytes)?,
            })),
            None => Ok(None),
        }
    }

    /// Names of every bucket, in order
    pub fn bucket_names(&self) -> Result<Vec<String>> {
        Ok(catalog_entries(self.pager(), self.meta().root)?
            .into_iter()
            .map(|(name, _)| String::from_utf8_lossy(&name).into_owned())
            .collect())
    }

    /// Full structural check of the snapshot
    pub fn check(&self) -> Result<CheckReport> {
        let meta = self.meta();
        let freelist = FreeList::decode(&self.pager().read_page(meta.freelist)?, meta.high_water)?;
        let (_, report) = walk_snapshot(self.pager(), meta, Some(&freelist))?;
        Ok(report)
    }

    /// Pages owned by the snapshot (meta pages excluded)
    pub(crate) fn reachable_pages(&self) -> Result<HashSet<PageId>> {
        walk_snapshot(self.pager(), self.meta(), None).map(|(seen, _)| seen)
    }

    /// Write a standalone copy of the snapshot; returns bytes written
    pub fn write_to<W: Write>(&self, sink: &mut W) -> Result<u64> {
        backup::write_snapshot(self, sink)
    }
}

// =============================================================================
// Bucket
// =============================================================================

/// One bucket's tree inside a read snapshot
#[derive(Clone)]
pub struct Bucket {
    txn: ReadTxn,
    root: PageId,
}

impl Bucket {
    /// Point lookup
    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        lookup(self, NodeRef::Page(self.root), key)
    }

    /// Cursor over the bucket; keeps the snapshot alive while it exists
    pub fn cursor(&self) -> Cursor<Bucket> {
        Cursor::new(self.clone(), NodeRef::Page(self.root))
    }

    /// Keys starting with `prefix`, ascending; an empty prefix yields everything
    pub fn prefix_scan(&self, prefix: &[u8]) -> PrefixScan<Bucket> {
        PrefixScan::new(self.clone(), NodeRef::Page(self.root), prefix)
    }

    /// Snapshot this bucket belongs to
    pub fn txn(&self) -> &ReadTxn {
        &self.txn
    }
}

impl NodeSource for Bucket {
    fn node(&self, node_ref: NodeRef) -> Result<Cow<'_, Node>> {
        self.txn.pager().node(node_ref)
    }
}

// =============================================================================
// Catalog Helpers
// =============================================================================

/// Catalog values are the bucket root page id, little endian
pub(crate) fn decode_root(bytes: &[u8]) -> Result<PageId> {
    let raw: [u8; 8] = bytes.try_into().map_err(|_| {
        BurrowError::Corruption(format!("catalog entry holds {} bytes, expected 8", bytes.len()))
    })?;
    Ok(PageId::from_le_bytes(raw))
}

/// Every (bucket name, root page) in the catalog rooted at `root`
pub(crate) fn catalog_entries(pager: &Pager, root: PageId) -> Result<Vec<(Vec<u8>, PageId)>> {
    let mut cursor = Cursor::new(pager, NodeRef::Page(root));
    let mut entries = Vec::new();
    while let Some((name, value)) = cursor.next()? {
        entries.push((name, decode_root(&value)?));
    }
    Ok(entries)
}
