//! Page Manager Module
//!
//! Fixed-size pages on a single backing file.
//!
//! ## Responsibilities
//! - Read and write pages by identifier
//! - Grow the file as the high-water mark moves
//! - Double-buffered meta pages with checksums
//! - Free list partitioned by the transaction that freed each page
//!
//! ## File Layout
//! ```text
//! ┌────────┬────────┬──────────┬────────────────────────────────┐
//! │ Meta 0 │ Meta 1 │ Freelist │  Page arena (branch / leaf)    │
//! │ page 0 │ page 1 │ page 2.. │  ...                           │
//! └────────┴────────┴──────────┴────────────────────────────────┘
//! ```
//!
//! ## Page Header (16 bytes)
//! ```text
//! ┌─────────┬──────────┬────────────┬───────────┬──────────────┐
//! │ Id (8)  │ Kind (1) │ Reserved(1)│ Count (2) │ Overflow (4) │
//! └─────────┴──────────┴────────────┴───────────┴──────────────┘
//! ```
//! `overflow` counts the extra contiguous pages owned by the same logical page.

mod file;
mod freelist;
mod meta;

use bytes::{Buf, BufMut};

use crate::error::{BurrowError, Result};

pub use file::Pager;
pub use freelist::FreeList;
pub use meta::{Meta, FORMAT_VERSION, MAGIC, META_SIZE};

/// Page identifier (index into the file, in pages)
pub type PageId = u64;

/// Transaction sequence number
pub type TxId = u64;

// =============================================================================
// Shared Constants
// =============================================================================

/// Header at the start of every page
pub const PAGE_HEADER_SIZE: usize = 16;

/// Page size used for new files unless configured otherwise
pub const DEFAULT_PAGE_SIZE: usize = 4096;

/// Smallest accepted page size
pub const MIN_PAGE_SIZE: usize = 1024;

/// Largest accepted page size (count field is a u16)
pub const MAX_PAGE_SIZE: usize = 65536;

/// The two meta page slots
pub const META_PAGE_IDS: [PageId; 2] = [0, 1];

/// First page id available to the arena
pub const FIRST_DATA_PAGE: PageId = 2;

// =============================================================================
// Page Header
// =============================================================================

/// Tag stored in every page header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PageKind {
    Meta = 1,
    Branch = 2,
    Leaf = 3,
    Freelist = 4,
}

impl PageKind {
    pub fn from_u8(tag: u8) -> Option<Self> {
        match tag {
            1 => Some(PageKind::Meta),
            2 => Some(PageKind::Branch),
            3 => Some(PageKind::Leaf),
            4 => Some(PageKind::Freelist),
            _ => None,
        }
    }
}

/// Decoded page header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageHeader {
    pub id: PageId,
    pub kind: PageKind,
    pub count: u16,
    pub overflow: u32,
}

impl PageHeader {
    /// Write the header into the first `PAGE_HEADER_SIZE` bytes of `buf`
    pub fn encode_into(&self, mut buf: &mut [u8]) {
        buf.put_u64_le(self.id);
        buf.put_u8(self.kind as u8);
        buf.put_u8(0);
        buf.put_u16_le(self.count);
        buf.put_u32_le(self.overflow);
    }

    /// Parse a header from the start of `buf`
    pub fn decode(mut buf: &[u8]) -> Result<Self> {
        if buf.remaining() < PAGE_HEADER_SIZE {
            return Err(BurrowError::Corruption(format!(
                "page header truncated: {} bytes",
                buf.remaining()
            )));
        }
        let id = buf.get_u64_le();
        let tag = buf.get_u8();
        let _reserved = buf.get_u8();
        let count = buf.get_u16_le();
        let overflow = buf.get_u32_le();

        let kind = PageKind::from_u8(tag).ok_or_else(|| {
            BurrowError::Corruption(format!("page {} has unknown kind tag {}", id, tag))
        })?;

        Ok(Self {
            id,
            kind,
            count,
            overflow,
        })
    }

    /// Number of pages this logical page spans
    pub fn span(&self) -> u64 {
        self.overflow as u64 + 1
    }
}

/// Number of contiguous pages needed to hold `size` bytes
pub fn pages_needed(size: usize, page_size: usize) -> usize {
    size.div_ceil(page_size).max(1)
}
