//! Pager
//!
//! Page-granular access to the backing file.
//!
//! Reads and writes are positional (`pread`/`pwrite` on Unix), so readers
//! never share a file cursor and never wait on each other or the writer.

#[cfg(unix)]
use std::os::unix::fs::FileExt;
#[cfg(windows)]
use std::os::windows::fs::FileExt;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use crate::error::{BurrowError, Result};

use super::{PageHeader, PageId, PAGE_HEADER_SIZE};

/// Reads and writes fixed-size pages on one file
///
/// ## Concurrency:
/// - `file`: not locked; every access is positional
/// - `resize`: serializes `set_len` against concurrent length checks
/// - Readers and the writer never touch the same page: the writer only
///   writes pages that no committed snapshot can reach
pub struct Pager {
    /// File handle
    file: File,

    /// Guards file extension
    resize: Mutex<()>,

    /// Path of the database file
    path: PathBuf,

    /// Page size in bytes
    page_size: usize,
}

impl Pager {
    /// Open or create the backing file
    pub fn open(path: &Path, page_size: usize) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;

        Ok(Self {
            file,
            resize: Mutex::new(()),
            path: path.to_path_buf(),
            page_size,
        })
    }

    /// Same file, different page size (after reading the meta page)
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    /// Get the page size
    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Get the file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current file length in bytes
    pub fn len(&self) -> Result<u64> {
        Ok(self.file.metadata()?.len())
    }

    /// Check whether the file holds no bytes yet
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Read `buf.len()` bytes at an absolute offset
    pub fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        read_exact_at_offset(&self.file, buf, offset)
    }

    /// Read `count` raw pages starting at `id`, no validation
    pub fn read_raw(&self, id: PageId, count: u64) -> Result<Vec<u8>> {
        let len = self.span_bytes(id, count)?;
        let mut buf = vec![0u8; len];
        self.read_at(self.offset(id), &mut buf)?;
        Ok(buf)
    }

    /// Read just the header of a page
    pub fn read_header(&self, id: PageId) -> Result<PageHeader> {
        let mut buf = [0u8; PAGE_HEADER_SIZE];
        self.read_at(self.offset(id), &mut buf)?;
        let header = PageHeader::decode(&buf)?;
        Self::check_id(id, &header)?;
        Ok(header)
    }

    /// Read a logical page, including its overflow pages
    pub fn read_page(&self, id: PageId) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; self.page_size];
        self.read_at(self.offset(id), &mut buf)?;

        let header = PageHeader::decode(&buf)?;
        Self::check_id(id, &header)?;

        if header.overflow > 0 {
            let extra = self.span_bytes(id + 1, header.overflow as u64)?;
            buf.resize(self.page_size + extra, 0);
            self.read_at(self.offset(id + 1), &mut buf[self.page_size..])?;
        }

        Ok(buf)
    }

    /// Write whole pages starting at `id`
    ///
    /// Only legal for pages not reachable from any committed snapshot.
    pub fn write_pages(&self, id: PageId, data: &[u8]) -> Result<()> {
        if data.len() % self.page_size != 0 {
            return Err(BurrowError::InvalidArgument(format!(
                "write of {} bytes is not a multiple of the page size {}",
                data.len(),
                self.page_size
            )));
        }
        write_all_at_offset(&self.file, data, self.offset(id))
    }

    /// Extend the file to hold at least `page_count` pages
    pub fn grow(&self, page_count: u64) -> Result<()> {
        let wanted = page_count * self.page_size as u64;
        let _guard = self.resize.lock();
        if self.file.metadata()?.len() < wanted {
            self.file.set_len(wanted)?;
            tracing::trace!("Grew {} to {} pages", self.path.display(), page_count);
        }
        Ok(())
    }

    /// Flush file contents to disk
    pub fn sync(&self) -> Result<()> {
        self.file.sync_data()?;
        Ok(())
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    fn offset(&self, id: PageId) -> u64 {
        id * self.page_size as u64
    }

    /// Byte length of `count` pages at `id`, refusing spans past the file end
    fn span_bytes(&self, id: PageId, count: u64) -> Result<usize> {
        let end = id
            .checked_add(count)
            .and_then(|end| end.checked_mul(self.page_size as u64));
        match end {
            Some(end) if end <= self.len()? => Ok(count as usize * self.page_size),
            _ => Err(BurrowError::Corruption(format!(
                "span of {} pages at page {} runs past the end of the file",
                count, id
            ))),
        }
    }

    fn check_id(id: PageId, header: &PageHeader) -> Result<()> {
        if header.id != id {
            return Err(BurrowError::Corruption(format!(
                "page {} carries header id {}",
                id, header.id
            )));
        }
        Ok(())
    }
}

// =============================================================================
// Positional I/O
// =============================================================================

#[cfg(unix)]
fn read_exact_at_offset(file: &File, buf: &mut [u8], offset: u64) -> Result<()> {
    file.read_exact_at(buf, offset)?;
    Ok(())
}

/// `seek_read` may return short reads
#[cfg(windows)]
fn read_exact_at_offset(file: &File, buf: &mut [u8], offset: u64) -> Result<()> {
    let mut pos = 0;
    while pos < buf.len() {
        let n = file.seek_read(&mut buf[pos..], offset + pos as u64)?;
        if n == 0 {
            return Err(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "unexpected end of file during seek_read",
            )
            .into());
        }
        pos += n;
    }
    Ok(())
}

#[cfg(unix)]
fn write_all_at_offset(file: &File, data: &[u8], offset: u64) -> Result<()> {
    file.write_all_at(data, offset)?;
    Ok(())
}

#[cfg(windows)]
fn write_all_at_offset(file: &File, data: &[u8], offset: u64) -> Result<()> {
    let mut pos = 0;
    while pos < data.len() {
        let n = file.seek_write(&data[pos..], offset + pos as u64)?;
        if n == 0 {
            return Err(std::io::Error::new(
                std::io::ErrorKind::WriteZero,
                "seek_write wrote zero bytes",
            )
            .into());
        }
        pos += n;
    }
    Ok(())
}
