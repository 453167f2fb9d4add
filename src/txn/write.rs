//! Write Transactions
//!
//! The single writer builds its changes in a private node arena on top of
//! the snapshot it started from. Nothing reachable from a committed meta is
//! ever overwritten; commit writes fresh pages, then flips the meta slot.
//!
//! ## Commit Sequence
//! ```text
//! 1. spill dirty bucket trees        (children first, fresh pages)
//! 2. record bucket roots in catalog  → spill catalog
//! 3. free copied-from pages + old free list page (pending under txid)
//! 4. encode free list onto fresh pages
//! 5. grow file, write pages, sync
//! 6. strict mode: full check of the new state
//! 7. write meta slot txid % 2, sync  ← durability point
//! 8. publish meta + free list to new readers
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::lock_api::ArcMutexGuard;
use parking_lot::RawMutex;

use crate::btree::{
    lookup, ArenaView, Node, NodeArena, NodeRef, PrefixScan, SpillOutput, TreeMut,
    MAX_KEY_SIZE, MAX_VALUE_SIZE,
};
use crate::config::SyncStrategy;
use crate::error::{BurrowError, Result};
use crate::pager::{pages_needed, FreeList, Meta, PageId, TxId};

use super::read::decode_root;
use super::{walk_snapshot, Shared};

/// Owned writer permit; released when the transaction ends
pub(crate) type WriterPermit = ArcMutexGuard<RawMutex, ()>;

/// The active write transaction
///
/// Dropping it without `commit` discards every change.
pub struct WriteTxn {
    shared: Arc<Shared>,
    _permit: WriterPermit,

    /// Snapshot the transaction started from
    base: Meta,

    /// Id this transaction commits as
    txid: TxId,

    /// Next page id past the end of the file
    high_water: PageId,

    /// Private copy of the free list
    freelist: FreeList,

    /// Dirty nodes
    arena: NodeArena,

    /// Root of the bucket catalog
    catalog: NodeRef,

    /// Current root of every bucket opened or created in this transaction
    buckets: BTreeMap<Vec<u8>, NodeRef>,

    finished: bool,
}

impl WriteTxn {
    pub(crate) fn new(
        shared: Arc<Shared>,
        permit: WriterPermit,
        base: Meta,
        freelist: FreeList,
    ) -> Self {
        let txid = base.txid + 1;
        tracing::debug!("Write transaction {} started on txid {}", txid, base.txid);
        Self {
            shared,
            _permit: permit,
            base,
            txid,
            high_water: base.high_water,
            freelist,
            arena: NodeArena::new(),
            catalog: NodeRef::Page(base.root),
            buckets: BTreeMap::new(),
            finished: false,
        }
    }

    /// Txid this transaction will commit as
    pub fn txid(&self) -> TxId {
        self.txid
    }

    // =========================================================================
    // Buckets
    // =========================================================================

    /// Create an empty bucket; fails if it already exists
    pub fn create_bucket(&mut self, name: &str) -> Result<()> {
        validate_bucket_name(name)?;
        if self.bucket_root(name.as_bytes())?.is_some() {
            return Err(BurrowError::BucketExists(name.to_string()));
        }

        let slot = self.arena.insert(Node::empty_leaf());
        self.buckets.insert(name.as_bytes().to_vec(), NodeRef::Dirty(slot));
        tracing::debug!("Created bucket {} in txid {}", name, self.txid);
        Ok(())
    }

    /// Create a bucket unless one with this name exists
    pub fn create_bucket_if_not_exists(&mut self, name: &str) -> Result<()> {
        match self.create_bucket(name) {
            Err(BurrowError::BucketExists(_)) => Ok(()),
            other => other,
        }
    }

    /// Open a bucket for reading and writing
    pub fn bucket_mut(&mut self, name: &str) -> Result<BucketMut<'_>> {
        let root = self
            .bucket_root(name.as_bytes())?
            .ok_or_else(|| BurrowError::BucketNotFound(name.to_string()))?;
        self.buckets.entry(name.as_bytes().to_vec()).or_insert(root);
        Ok(BucketMut {
            txn: self,
            name: name.as_bytes().to_vec(),
        })
    }

    fn bucket_root(&self, name: &[u8]) -> Result<Option<NodeRef>> {
        if let Some(root) = self.buckets.get(name) {
            return Ok(Some(*root));
        }
        lookup(&self.arena.view(&self.shared.pager), self.catalog, name)?
            .map(|bytes| decode_root(&bytes).map(NodeRef::Page))
            .transpose()
    }

    fn tree(&mut self, name: &[u8]) -> Result<TreeMut<'_>> {
        let root = self.buckets.get_mut(name).ok_or_else(|| {
            BurrowError::BucketNotFound(String::from_utf8_lossy(name).into_owned())
        })?;
        Ok(TreeMut::new(&mut self.arena, &self.shared.pager, root))
    }

    // =========================================================================
    // Commit / Rollback
    // =========================================================================

    /// Make every change durable and visible to new readers
    pub fn commit(mut self) -> Result<()> {
        if !self.arena.is_dirty() {
            self.finished = true;
            tracing::debug!("Write transaction {} had nothing to commit", self.txid);
            return Ok(());
        }

        self.persist()?;
        self.finished = true;
        Ok(())
    }

    /// Discard every change
    pub fn rollback(mut self) {
        self.finished = true;
        tracing::debug!("Write transaction {} rolled back", self.txid);
    }

    fn persist(&mut self) -> Result<()> {
        let Self {
            shared,
            base,
            txid,
            high_water,
            freelist,
            arena,
            catalog,
            buckets,
            ..
        } = self;
        let txid = *txid;
        let pager = &shared.pager;
        let page_size = pager.page_size();
        let sync = shared.config.sync_strategy == SyncStrategy::EveryCommit;

        // Steps 1-2: spill buckets, then the catalog that names them
        let mut out = SpillOutput::default();
        let root = {
            let mut alloc = |count: usize| allocate(freelist, high_water, count);
            for (name, bucket_root) in buckets.iter_mut() {
                let page = TreeMut::new(arena, pager, bucket_root).spill(&mut alloc, &mut out)?;
                TreeMut::new(arena, pager, catalog).insert(name, &page.to_le_bytes())?;
            }
            TreeMut::new(arena, pager, catalog).spill(&mut alloc, &mut out)?
        };

        // Step 3: superseded pages wait for readers of older snapshots
        for &(id, overflow) in arena.freed() {
            freelist.free(txid, id, overflow)?;
        }
        let old_freelist = pager.read_header(base.freelist)?;
        freelist.free(txid, base.freelist, old_freelist.overflow)?;

        // Step 4
        let span = pages_needed(freelist.encoded_size(), page_size);
        let freelist_page = allocate(freelist, high_water, span);
        let freelist_bytes = freelist.encode(freelist_page, page_size, span);

        let meta = Meta {
            page_size: page_size as u32,
            root,
            freelist: freelist_page,
            high_water: *high_water,
            txid,
        };

        // Step 5
        pager.grow(meta.high_water)?;
        for (id, bytes) in &out.writes {
            pager.write_pages(*id, bytes)?;
        }
        pager.write_pages(freelist_page, &freelist_bytes)?;
        if sync {
            pager.sync()?;
        }

        // Step 6
        if shared.config.strict_mode {
            walk_snapshot(pager, &meta, Some(&*freelist))?;
        }

        // Step 7
        let slot = meta.slot();
        let flipped = pager
            .write_pages(slot, &meta.encode(slot))
            .and_then(|_| if sync { pager.sync() } else { Ok(()) });
        if let Err(e) = flipped {
            shared.poison();
            tracing::error!("Meta write for txid {} failed, store poisoned: {}", txid, e);
            return Err(e);
        }

        // Step 8
        shared.publish(meta, std::mem::take(freelist));
        tracing::debug!(
            "Committed txid {}: {} pages written, {} replaced, high-water {}",
            txid,
            out.writes.len() + 1,
            out.remap.len(),
            meta.high_water
        );
        for (old, new) in &out.remap {
            tracing::trace!("Page {} superseded by {}", old, new);
        }
        Ok(())
    }
}

impl Drop for WriteTxn {
    fn drop(&mut self) {
        if !self.finished {
            tracing::debug!("Write transaction {} aborted", self.txid);
        }
    }
}

/// Reuse a free run if one exists, otherwise extend past the high-water mark
fn allocate(freelist: &mut FreeList, high_water: &mut PageId, count: usize) -> PageId {
    freelist.allocate(count).unwrap_or_else(|| {
        let id = *high_water;
        *high_water += count as u64;
        id
    })
}

// =============================================================================
// BucketMut
// =============================================================================

/// One bucket opened inside the write transaction
///
/// Reads see the transaction's own uncommitted writes.
pub struct BucketMut<'t> {
    txn: &'t mut WriteTxn,
    name: Vec<u8>,
}

impl BucketMut<'_> {
    fn root(&self) -> Result<NodeRef> {
        self.txn.buckets.get(&self.name).copied().ok_or_else(|| {
            BurrowError::BucketNotFound(String::from_utf8_lossy(&self.name).into_owned())
        })
    }

    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        lookup(&self.txn.arena.view(&self.txn.shared.pager), self.root()?, key)
    }

    /// Insert or overwrite; empty or oversized keys and values are rejected
    pub fn put(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        validate_key(key)?;
        validate_value(value)?;
        self.txn.tree(&self.name)?.insert(key, value)
    }

    /// Remove `key`; returns whether it was present
    pub fn delete(&mut self, key: &[u8]) -> Result<bool> {
        if key.is_empty() || key.len() > MAX_KEY_SIZE {
            return Ok(false);
        }
        self.txn.tree(&self.name)?.delete(key)
    }

    /// Keys starting with `prefix`, including uncommitted writes
    pub fn prefix_scan(&self, prefix: &[u8]) -> Result<PrefixScan<ArenaView<'_>>> {
        Ok(PrefixScan::new(
            self.txn.arena.view(&self.txn.shared.pager),
            self.root()?,
            prefix,
        ))
    }
}

// =============================================================================
// Argument Validation
// =============================================================================

pub(crate) fn validate_key(key: &[u8]) -> Result<()> {
    if key.is_empty() {
        return Err(BurrowError::InvalidArgument("key must not be empty".to_string()));
    }
    if key.len() > MAX_KEY_SIZE {
        return Err(BurrowError::InvalidArgument(format!(
            "key of {} bytes exceeds the {} byte limit",
            key.len(),
            MAX_KEY_SIZE
        )));
    }
    Ok(())
}

pub(crate) fn validate_value(value: &[u8]) -> Result<()> {
    if value.is_empty() {
        return Err(BurrowError::InvalidArgument("value must not be empty".to_string()));
    }
    if value.len() > MAX_VALUE_SIZE {
        return Err(BurrowError::InvalidArgument(format!(
            "value of {} bytes exceeds the {} byte limit",
            value.len(),
            MAX_VALUE_SIZE
        )));
    }
    Ok(())
}

fn validate_bucket_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(BurrowError::InvalidArgument("bucket name must not be empty".to_string()));
    }
    if name.len() > MAX_KEY_SIZE {
        return Err(BurrowError::InvalidArgument(format!(
            "bucket name of {} bytes exceeds the {} byte limit",
            name.len(),
            MAX_KEY_SIZE
        )));
    }
    Ok(())
}
