//! Free List
//!
//! Tracks pages that can be reused.
//!
//! Pages freed by a write transaction stay `pending` under that
//! transaction's id until no live reader could still reach them.
//! A reader pinned at snapshot `s` can reach pages freed by any `t > s`,
//! so pending pages of `t` are released once the oldest reader has `s >= t`.
//!
//! On disk the list is a sequence of `(start, len)` runs. A freed span
//! costs one run no matter how many pages it covers.

use std::collections::{BTreeMap, BTreeSet};

use bytes::{Buf, BufMut};

use crate::error::{BurrowError, Result};

use super::{PageHeader, PageId, PageKind, TxId, PAGE_HEADER_SIZE};

/// Marker count meaning "real run count stored in the first u64"
const COUNT_OVERFLOW: u16 = 0xFFFF;

/// One persisted run: start id then length, both u64
const RUN_SIZE: usize = 16;

/// Page free list with per-transaction pending partitions
#[derive(Debug, Clone, Default)]
pub struct FreeList {
    /// Reusable now
    ids: BTreeSet<PageId>,

    /// Freed by a transaction, possibly still visible to older readers
    pending: BTreeMap<TxId, Vec<PageId>>,
}

impl FreeList {
    /// Create an empty free list
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve `count` contiguous free pages, returning the first id
    pub fn allocate(&mut self, count: usize) -> Option<PageId> {
        if count == 0 {
            return None;
        }

        let mut run_start = None;
        let mut run_len = 0usize;
        let mut prev: Option<PageId> = None;

        for &id in &self.ids {
            match prev {
                Some(p) if p + 1 == id => run_len += 1,
                _ => {
                    run_start = Some(id);
                    run_len = 1;
                }
            }
            prev = Some(id);

            if run_len == count {
                let start = run_start?;
                for page in start..start + count as u64 {
                    self.ids.remove(&page);
                }
                return Some(start);
            }
        }

        None
    }

    /// Mark `id` and its overflow pages as freed by `txid`
    pub fn free(&mut self, txid: TxId, id: PageId, overflow: u32) -> Result<()> {
        if id < super::FIRST_DATA_PAGE {
            return Err(BurrowError::Corruption(format!("cannot free meta page {}", id)));
        }

        let pages = self.pending.entry(txid).or_default();
        for page in id..=id + overflow as u64 {
            if self.ids.contains(&page) || pages.contains(&page) {
                return Err(BurrowError::Corruption(format!("page {} freed twice", page)));
            }
            pages.push(page);
        }
        Ok(())
    }

    /// Release pending pages freed by transactions `<= oldest_reader`
    pub fn release(&mut self, oldest_reader: TxId) {
        if oldest_reader == TxId::MAX {
            self.release_all();
            return;
        }
        let keep = self.pending.split_off(&(oldest_reader + 1));
        let released = std::mem::replace(&mut self.pending, keep);
        for (_, pages) in released {
            self.ids.extend(pages);
        }
    }

    /// Release every pending page (no live readers)
    pub fn release_all(&mut self) {
        for (_, pages) in std::mem::take(&mut self.pending) {
            self.ids.extend(pages);
        }
    }

    /// Whether `id` is free or pending
    pub fn contains(&self, id: PageId) -> bool {
        self.ids.contains(&id) || self.pending.values().any(|p| p.contains(&id))
    }

    /// Whether `id` is reusable right now
    pub fn is_free(&self, id: PageId) -> bool {
        self.ids.contains(&id)
    }

    /// Number of reusable pages
    pub fn free_count(&self) -> usize {
        self.ids.len()
    }

    /// Number of pages waiting for readers to finish
    pub fn pending_count(&self) -> usize {
        self.pending.values().map(Vec::len).sum()
    }

    /// Free plus pending
    pub fn count(&self) -> usize {
        self.free_count() + self.pending_count()
    }

    /// Every free and pending id, sorted
    pub fn all_ids(&self) -> Vec<PageId> {
        let mut all: Vec<PageId> = self.ids.iter().copied().collect();
        for pages in self.pending.values() {
            all.extend_from_slice(pages);
        }
        all.sort_unstable();
        all
    }

    /// Free and pending ids folded into `(start, len)` runs
    pub fn runs(&self) -> Vec<(PageId, u64)> {
        let mut runs: Vec<(PageId, u64)> = Vec::new();
        for id in self.all_ids() {
            match runs.last_mut() {
                Some((start, len)) if *start + *len == id => *len += 1,
                _ => runs.push((id, 1)),
            }
        }
        runs
    }

    // =========================================================================
    // Encoding
    // =========================================================================

    /// Bytes needed to persist the list (upper bound)
    ///
    /// Allocating one span can split a run in two, so one spare run is counted.
    pub fn encoded_size(&self) -> usize {
        PAGE_HEADER_SIZE + 8 + (self.runs().len() + 1) * RUN_SIZE
    }

    /// Encode free and pending runs into at least `min_span` pages at `page_id`
    pub fn encode(&self, page_id: PageId, page_size: usize, min_span: usize) -> Vec<u8> {
        let runs = self.runs();
        let span = super::pages_needed(self.encoded_size(), page_size).max(min_span);
        let mut buf = vec![0u8; span * page_size];

        let count = if runs.len() >= COUNT_OVERFLOW as usize {
            COUNT_OVERFLOW
        } else {
            runs.len() as u16
        };
        PageHeader {
            id: page_id,
            kind: PageKind::Freelist,
            count,
            overflow: (span - 1) as u32,
        }
        .encode_into(&mut buf);

        let mut body = &mut buf[PAGE_HEADER_SIZE..];
        if count == COUNT_OVERFLOW {
            body.put_u64_le(runs.len() as u64);
        }
        for (start, len) in runs {
            body.put_u64_le(start);
            body.put_u64_le(len);
        }
        buf
    }

    /// Decode a free list page; everything comes back reusable
    ///
    /// Every run must lie between the meta pages and `high_water`.
    pub fn decode(page: &[u8], high_water: PageId) -> Result<Self> {
        let header = PageHeader::decode(page)?;
        if header.kind != PageKind::Freelist {
            return Err(BurrowError::Corruption(format!(
                "page {} is {:?}, expected freelist",
                header.id, header.kind
            )));
        }

        let mut body = &page[PAGE_HEADER_SIZE..];
        let count = if header.count == COUNT_OVERFLOW {
            if body.remaining() < 8 {
                return Err(BurrowError::Corruption("freelist count truncated".to_string()));
            }
            body.get_u64_le()
        } else {
            header.count as u64
        };

        let needed = count.checked_mul(RUN_SIZE as u64);
        if needed.map_or(true, |needed| (body.remaining() as u64) < needed) {
            return Err(BurrowError::Corruption(format!(
                "freelist page {} holds {} bytes for {} runs",
                header.id,
                body.remaining(),
                count
            )));
        }

        let mut ids = BTreeSet::new();
        for _ in 0..count {
            let start = body.get_u64_le();
            let len = body.get_u64_le();
            let end = start.checked_add(len).filter(|&end| end <= high_water);
            let end = match end {
                Some(end) if len > 0 && start >= super::FIRST_DATA_PAGE => end,
                _ => {
                    return Err(BurrowError::Corruption(format!(
                        "freelist run of {} pages at {} is outside 2..{}",
                        len, start, high_water
                    )))
                }
            };
            for id in start..end {
                if !ids.insert(id) {
                    return Err(BurrowError::Corruption(format!(
                        "page {} listed twice in the freelist",
                        id
                    )));
                }
            }
        }

        Ok(Self {
            ids,
            pending: BTreeMap::new(),
        })
    }
}
