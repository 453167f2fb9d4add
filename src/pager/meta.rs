//! Meta Page
//!
//! The durability pivot: names the catalog root, the free list page, the
//! high-water mark and the transaction sequence number.
//!
//! ## Body (after the page header)
//! ```text
//! ┌───────────┬─────────────┬───────────────┬──────────────┐
//! │ Magic (4) │ Version (4) │ PageSize (4)  │ Reserved (4) │
//! ├───────────┴─┬───────────┴───┬───────────┴──┬───────────┤
//! │ Root (8)    │ Freelist (8)  │ HighWater (8)│ TxId (8)  │
//! ├─────────────┴───────────────┴──────────────┴───────────┤
//! │ CRC32 of everything above in the body (4)              │
//! └────────────────────────────────────────────────────────┘
//! ```

use bytes::{Buf, BufMut};

use crate::error::{BurrowError, Result};

use super::{PageHeader, PageId, PageKind, TxId, MAX_PAGE_SIZE, MIN_PAGE_SIZE, PAGE_HEADER_SIZE};

/// Magic number identifying a burrowkv file ("BRRW")
pub const MAGIC: u32 = 0x4252_5257;

/// Current on-disk format version
pub const FORMAT_VERSION: u32 = 1;

/// Body bytes covered by the checksum
const META_BODY_SIZE: usize = 48;

/// Header + body + checksum
pub const META_SIZE: usize = PAGE_HEADER_SIZE + META_BODY_SIZE + 4;

/// Contents of a meta page
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Meta {
    /// Page size the file was created with
    pub page_size: u32,
    /// Root page of the bucket catalog tree
    pub root: PageId,
    /// First page of the persisted free list
    pub freelist: PageId,
    /// First page id never allocated
    pub high_water: PageId,
    /// Sequence number of the commit that wrote this meta
    pub txid: TxId,
}

impl Meta {
    /// Slot (page id) a commit with this txid writes to
    pub fn slot(&self) -> PageId {
        self.txid % 2
    }

    /// Encode into a full page stored at `page_id`
    pub fn encode(&self, page_id: PageId) -> Vec<u8> {
        let mut page = vec![0u8; self.page_size as usize];
        PageHeader {
            id: page_id,
            kind: PageKind::Meta,
            count: 0,
            overflow: 0,
        }
        .encode_into(&mut page);

        let mut body = Vec::with_capacity(META_BODY_SIZE + 4);
        body.put_u32_le(MAGIC);
        body.put_u32_le(FORMAT_VERSION);
        body.put_u32_le(self.page_size);
        body.put_u32_le(0);
        body.put_u64_le(self.root);
        body.put_u64_le(self.freelist);
        body.put_u64_le(self.high_water);
        body.put_u64_le(self.txid);
        let checksum = crc32fast::hash(&body);
        body.put_u32_le(checksum);

        page[PAGE_HEADER_SIZE..PAGE_HEADER_SIZE + body.len()].copy_from_slice(&body);
        page
    }

    /// Decode and verify a meta page (at least `META_SIZE` bytes)
    pub fn decode(page: &[u8]) -> Result<Self> {
        if page.len() < META_SIZE {
            return Err(BurrowError::Corruption(format!(
                "meta page truncated: {} bytes",
                page.len()
            )));
        }

        let header = PageHeader::decode(page)?;
        if header.kind != PageKind::Meta {
            return Err(BurrowError::Corruption(format!(
                "page {} is {:?}, expected meta",
                header.id, header.kind
            )));
        }

        let body = &page[PAGE_HEADER_SIZE..PAGE_HEADER_SIZE + META_BODY_SIZE];
        let mut tail = &page[PAGE_HEADER_SIZE + META_BODY_SIZE..META_SIZE];
        let stored = tail.get_u32_le();
        let computed = crc32fast::hash(body);
        if stored != computed {
            return Err(BurrowError::Corruption(format!(
                "meta page {} checksum mismatch: stored {:08x}, computed {:08x}",
                header.id, stored, computed
            )));
        }

        let mut body = body;
        let magic = body.get_u32_le();
        if magic != MAGIC {
            return Err(BurrowError::Corruption(format!(
                "bad magic {:08x} in meta page {}",
                magic, header.id
            )));
        }
        let version = body.get_u32_le();
        if version != FORMAT_VERSION {
            return Err(BurrowError::Corruption(format!(
                "unsupported format version {}",
                version
            )));
        }
        let page_size = body.get_u32_le();
        let _reserved = body.get_u32_le();

        let meta = Self {
            page_size,
            root: body.get_u64_le(),
            freelist: body.get_u64_le(),
            high_water: body.get_u64_le(),
            txid: body.get_u64_le(),
        };
        meta.validate()?;
        Ok(meta)
    }

    /// Sanity checks beyond the checksum
    fn validate(&self) -> Result<()> {
        let page_size = self.page_size as usize;
        if !page_size.is_power_of_two() || !(MIN_PAGE_SIZE..=MAX_PAGE_SIZE).contains(&page_size) {
            return Err(BurrowError::Corruption(format!(
                "meta records invalid page size {}",
                self.page_size
            )));
        }
        if self.root >= self.high_water || self.freelist >= self.high_water {
            return Err(BurrowError::Corruption(format!(
                "meta references page beyond high-water mark {} (root {}, freelist {})",
                self.high_water, self.root, self.freelist
            )));
        }
        Ok(())
    }
}
