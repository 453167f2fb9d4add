//! Transaction Manager Module
//!
//! Snapshot isolation over the copy-on-write tree.
//!
//! ## Responsibilities
//! - Open, initialise and recover the database file
//! - Hand out read snapshots (never blocked by the writer)
//! - Serialise writers through a single permit
//! - Reclaim pages once no live snapshot can reach them
//!
//! ## Concurrency Model
//! ```text
//!   readers ──► committed.read() ──► register txid ──► ReadTxn (pinned meta)
//!
//!   writer  ──► permit (ArcMutexGuard, owned by WriteTxn)
//!           ──► release pending pages older than every registered reader
//!           ──► build in private arena ──► commit: pages, sync, meta, sync
//!           ──► committed.write() (publish)
//! ```
//! Readers register while holding the committed-state read lock, and
//! publishing takes the write lock, so the writer's reclamation step never
//! misses a snapshot.

mod read;
mod write;

use std::collections::{BTreeMap, HashSet};
use std::io::ErrorKind;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};

use crate::btree::{check_tree, Node};
use crate::config::Config;
use crate::error::{BurrowError, Result};
use crate::pager::{FreeList, Meta, PageId, Pager, TxId, META_SIZE};

pub use read::{Bucket, ReadTxn};
pub use write::{BucketMut, WriteTxn};
pub(crate) use write::{validate_key, validate_value};

/// Page holding the free list of a fresh file
const INITIAL_FREELIST_PAGE: PageId = 2;

/// Page holding the empty catalog leaf of a fresh file
const INITIAL_CATALOG_PAGE: PageId = 3;

// =============================================================================
// Shared State
// =============================================================================

/// Last published commit
#[derive(Debug, Clone)]
struct Committed {
    meta: Meta,
    freelist: FreeList,
}

/// State shared by the manager and every open transaction
pub(crate) struct Shared {
    pub(crate) pager: Pager,
    pub(crate) config: Config,

    /// Writer permit
    writer: Arc<Mutex<()>>,

    /// Published meta and free list
    committed: RwLock<Committed>,

    /// Live snapshots: txid → number of open read transactions
    readers: Mutex<BTreeMap<TxId, usize>>,

    /// Set when a commit failed after its meta write began
    poisoned: AtomicBool,
}

impl Shared {
    fn register_reader(&self) -> Meta {
        let committed = self.committed.read();
        *self.readers.lock().entry(committed.meta.txid).or_insert(0) += 1;
        committed.meta
    }

    pub(crate) fn unregister_reader(&self, txid: TxId) {
        let mut readers = self.readers.lock();
        if let Some(count) = readers.get_mut(&txid) {
            *count -= 1;
            if *count == 0 {
                readers.remove(&txid);
            }
        }
    }

    fn oldest_reader(&self) -> Option<TxId> {
        self.readers.lock().keys().next().copied()
    }

    fn open_readers(&self) -> usize {
        self.readers.lock().values().sum()
    }

    fn publish(&self, meta: Meta, freelist: FreeList) {
        *self.committed.write() = Committed { meta, freelist };
    }

    fn poison(&self) {
        self.poisoned.store(true, Ordering::SeqCst);
    }

    fn is_poisoned(&self) -> bool {
        self.poisoned.load(Ordering::SeqCst)
    }
}

// =============================================================================
// Statistics
// =============================================================================

/// Point-in-time counters for the store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stats {
    /// Txid of the latest commit
    pub txid: TxId,
    pub page_size: usize,
    /// High-water mark: pages in use by the file
    pub page_count: u64,
    /// Pages reusable now
    pub free_pages: usize,
    /// Pages waiting for older readers
    pub pending_pages: usize,
    /// Read transactions currently open
    pub open_readers: usize,
}

/// Result of a full consistency check
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CheckReport {
    /// Pages reachable from the snapshot (overflow, free list page included)
    pub reachable_pages: usize,
    /// Buckets in the catalog
    pub buckets: usize,
    /// Key/value pairs across every bucket
    pub keys: u64,
}

// =============================================================================
// Transaction Manager
// =============================================================================

/// Entry point for transactions on one database file
#[derive(Clone)]
pub struct TxManager {
    shared: Arc<Shared>,
}

impl TxManager {
    /// Open (or create) the database file named by `config.path`
    pub fn open(config: Config) -> Result<Self> {
        config.validate()?;
        let pager = Pager::open(&config.path, config.page_size)?;

        if pager.is_empty()? {
            Self::initialize(&pager)?;
            tracing::info!(
                "Created {} with {} byte pages",
                config.path.display(),
                config.page_size
            );
        }

        let meta = Self::load_meta(&pager, config.page_size)?;
        if meta.page_size as usize != config.page_size {
            tracing::info!(
                "{} uses {} byte pages; ignoring configured {}",
                config.path.display(),
                meta.page_size,
                config.page_size
            );
        }
        let pager = pager.with_page_size(meta.page_size as usize);

        let needed = meta.high_water * meta.page_size as u64;
        let actual = pager.len()?;
        if actual < needed {
            return Err(BurrowError::Corruption(format!(
                "file is {} bytes, meta needs {}",
                actual, needed
            )));
        }

        let freelist = FreeList::decode(&pager.read_page(meta.freelist)?, meta.high_water)?;
        tracing::info!(
            "Opened {} at txid {} ({} pages, {} free)",
            config.path.display(),
            meta.txid,
            meta.high_water,
            freelist.free_count()
        );

        Ok(Self {
            shared: Arc::new(Shared {
                pager,
                config,
                writer: Arc::new(Mutex::new(())),
                committed: RwLock::new(Committed { meta, freelist }),
                readers: Mutex::new(BTreeMap::new()),
                poisoned: AtomicBool::new(false),
            }),
        })
    }

    /// Lay out a fresh file: two metas, an empty free list, an empty catalog
    fn initialize(pager: &Pager) -> Result<()> {
        let page_size = pager.page_size();
        let meta = Meta {
            page_size: page_size as u32,
            root: INITIAL_CATALOG_PAGE,
            freelist: INITIAL_FREELIST_PAGE,
            high_water: INITIAL_CATALOG_PAGE + 1,
            txid: 0,
        };

        pager.grow(meta.high_water)?;
        pager.write_pages(
            INITIAL_FREELIST_PAGE,
            &FreeList::new().encode(INITIAL_FREELIST_PAGE, page_size, 1),
        )?;
        pager.write_pages(
            INITIAL_CATALOG_PAGE,
            &Node::empty_leaf().encode(INITIAL_CATALOG_PAGE, page_size)?,
        )?;
        pager.write_pages(0, &meta.encode(0))?;
        pager.write_pages(1, &Meta { txid: 1, ..meta }.encode(1))?;
        pager.sync()
    }

    /// Pick the valid meta with the highest txid
    fn load_meta(pager: &Pager, configured_page_size: usize) -> Result<Meta> {
        let first = Self::read_meta(pager, 0);
        let second_offset = match &first {
            Ok(meta) => meta.page_size as u64,
            Err(_) => configured_page_size as u64,
        };
        let second = Self::read_meta(pager, second_offset);

        match (first, second) {
            (Ok(a), Ok(b)) => Ok(if b.txid > a.txid { b } else { a }),
            (Ok(meta), Err(e)) | (Err(e), Ok(meta)) => {
                tracing::warn!(
                    "Meta page invalid ({}); falling back to txid {}",
                    e,
                    meta.txid
                );
                Ok(meta)
            }
            (Err(a), Err(b)) => Err(BurrowError::Corruption(format!(
                "both meta pages are invalid: {}; {}",
                a, b
            ))),
        }
    }

    fn read_meta(pager: &Pager, offset: u64) -> Result<Meta> {
        let mut buf = [0u8; META_SIZE];
        match pager.read_at(offset, &mut buf) {
            Ok(()) => Meta::decode(&buf),
            Err(BurrowError::Io(e)) if e.kind() == ErrorKind::UnexpectedEof => Err(
                BurrowError::Corruption(format!("meta page at offset {} is truncated", offset)),
            ),
            Err(e) => Err(e),
        }
    }

    // =========================================================================
    // Transactions
    // =========================================================================

    /// Start a read transaction on the latest commit
    pub fn begin_read(&self) -> ReadTxn {
        let meta = self.shared.register_reader();
        ReadTxn::new(self.shared.clone(), meta)
    }

    /// Start the write transaction, waiting for the current writer to finish
    pub fn begin_write(&self) -> Result<WriteTxn> {
        let guard = self.shared.writer.lock_arc();
        self.start_write(guard)
    }

    /// Start the write transaction if no other writer is active
    pub fn try_begin_write(&self) -> Result<Option<WriteTxn>> {
        match self.shared.writer.try_lock_arc() {
            Some(guard) => self.start_write(guard).map(Some),
            None => Ok(None),
        }
    }

    fn start_write(&self, guard: write::WriterPermit) -> Result<WriteTxn> {
        if self.shared.is_poisoned() {
            return Err(BurrowError::Poisoned);
        }

        let Committed { meta, mut freelist } = self.shared.committed.read().clone();
        match self.shared.oldest_reader() {
            Some(oldest) => freelist.release(oldest),
            None => freelist.release_all(),
        }

        Ok(WriteTxn::new(self.shared.clone(), guard, meta, freelist))
    }

    // =========================================================================
    // Introspection
    // =========================================================================

    /// Counters for the latest commit
    pub fn stats(&self) -> Stats {
        let committed = self.shared.committed.read();
        Stats {
            txid: committed.meta.txid,
            page_size: self.shared.pager.page_size(),
            page_count: committed.meta.high_water,
            free_pages: committed.freelist.free_count(),
            pending_pages: committed.freelist.pending_count(),
            open_readers: self.shared.open_readers(),
        }
    }

    /// Configuration the manager was opened with
    pub fn config(&self) -> &Config {
        &self.shared.config
    }

    /// Flush the file (matters with `SyncStrategy::Never`)
    pub fn sync(&self) -> Result<()> {
        self.shared.pager.sync()
    }

    /// Whether a failed commit has disabled further writes
    pub fn is_poisoned(&self) -> bool {
        self.shared.is_poisoned()
    }
}

// =============================================================================
// Snapshot Walk
// =============================================================================

/// Verify every tree reachable from `meta` and collect the pages it owns
///
/// Fails on the first broken invariant. Reachable pages must not appear in
/// `freelist` and must sit below the high-water mark.
pub(crate) fn walk_snapshot(
    pager: &Pager,
    meta: &Meta,
    freelist: Option<&FreeList>,
) -> Result<(HashSet<PageId>, CheckReport)> {
    let mut seen = HashSet::new();
    let mut report = CheckReport::default();

    let header = pager.read_header(meta.freelist)?;
    for page in meta.freelist..meta.freelist + header.span() {
        seen.insert(page);
    }

    check_tree(pager, meta.root, meta.high_water, &mut seen)?;
    for (name, root) in read::catalog_entries(pager, meta.root)? {
        report.keys += check_tree(pager, root, meta.high_water, &mut seen).map_err(|e| {
            BurrowError::Corruption(format!(
                "bucket {}: {}",
                String::from_utf8_lossy(&name),
                e
            ))
        })?;
        report.buckets += 1;
    }

    if let Some(freelist) = freelist {
        if let Some(page) = seen.iter().find(|&&page| freelist.contains(page)) {
            return Err(BurrowError::Corruption(format!(
                "page {} is reachable and on the free list",
                page
            )));
        }
    }

    report.reachable_pages = seen.len();
    Ok((seen, report))
}
