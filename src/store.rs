//! Store Module
//!
//! The embedded database handle.
//!
//! ## Responsibilities
//! - Open the file and make sure the default bucket exists
//! - Point operations and prefix scans on the default bucket
//! - Closure-style transactions (`view` / `update`)
//! - Backups and statistics
//!
//! Every point write is its own write transaction; batch writes through
//! `update` to share one commit.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::config::Config;
use crate::error::{BurrowError, Result};
use crate::btree::PrefixScan;
use crate::txn::{Bucket, CheckReport, ReadTxn, Stats, TxManager, WriteTxn};

/// An open database file
///
/// `Store` is `Send + Sync`; share it behind an `Arc`.
pub struct Store {
    txm: TxManager,

    /// Bucket used by the point/scan API
    bucket: String,
}

impl Store {
    /// Open or create a store with the given config
    pub fn open(config: Config) -> Result<Self> {
        let bucket = config.default_bucket.clone();
        let store = Self {
            txm: TxManager::open(config)?,
            bucket,
        };
        store.update(|txn| txn.create_bucket_if_not_exists(&store.bucket))?;
        Ok(store)
    }

    /// Open with a path (convenience method)
    ///
    /// Uses default config with the specified file
    pub fn open_path(path: impl AsRef<Path>) -> Result<Self> {
        Self::open(Config::builder().path(path.as_ref()).build())
    }

    /// Name of the bucket the point API works on
    pub fn default_bucket(&self) -> &str {
        &self.bucket
    }

    // =========================================================================
    // Point Operations
    // =========================================================================

    /// Get a value by key from the latest commit
    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        self.snapshot_bucket()?.get(key)
    }

    /// Put a key-value pair and commit
    pub fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        crate::txn::validate_key(key)?;
        crate::txn::validate_value(value)?;
        self.update(|txn| txn.bucket_mut(&self.bucket)?.put(key, value))
    }

    /// Delete a key and commit; returns whether it existed
    pub fn delete(&self, key: &[u8]) -> Result<bool> {
        self.update(|txn| txn.bucket_mut(&self.bucket)?.delete(key))
    }

    /// Keys starting with `prefix` in ascending order
    ///
    /// The scan reads one snapshot; writes committed after this call are
    /// not visible to it.
    pub fn prefix_scan(&self, prefix: &[u8]) -> Result<PrefixScan<Bucket>> {
        Ok(self.snapshot_bucket()?.prefix_scan(prefix))
    }

    fn snapshot_bucket(&self) -> Result<Bucket> {
        self.txm
            .begin_read()
            .bucket(&self.bucket)?
            .ok_or_else(|| BurrowError::BucketNotFound(self.bucket.clone()))
    }

    // =========================================================================
    // Transactions
    // =========================================================================

    /// Start a read transaction (never blocks)
    pub fn begin_read(&self) -> ReadTxn {
        self.txm.begin_read()
    }

    /// Start a write transaction, waiting for any active writer
    pub fn begin_write(&self) -> Result<WriteTxn> {
        self.txm.begin_write()
    }

    /// Start a write transaction unless one is active
    pub fn try_begin_write(&self) -> Result<Option<WriteTxn>> {
        self.txm.try_begin_write()
    }

    /// Run `f` against a read snapshot
    pub fn view<T>(&self, f: impl FnOnce(&ReadTxn) -> Result<T>) -> Result<T> {
        f(&self.txm.begin_read())
    }

    /// Run `f` in a write transaction; commit on `Ok`, roll back on `Err`
    pub fn update<T>(&self, f: impl FnOnce(&mut WriteTxn) -> Result<T>) -> Result<T> {
        let mut txn = self.txm.begin_write()?;
        match f(&mut txn) {
            Ok(value) => {
                txn.commit()?;
                Ok(value)
            }
            Err(e) => {
                txn.rollback();
                Err(e)
            }
        }
    }

    // =========================================================================
    // Backup / Introspection
    // =========================================================================

    /// Stream a consistent copy of the latest commit; returns bytes written
    pub fn backup_to<W: Write>(&self, sink: &mut W) -> Result<u64> {
        self.txm.begin_read().write_to(sink)
    }

    /// Write a consistent copy of the latest commit to a new file
    pub fn backup_to_path(&self, path: impl AsRef<Path>) -> Result<u64> {
        let mut writer = BufWriter::new(File::create(path.as_ref())?);
        let written = self.backup_to(&mut writer)?;
        let file = writer
            .into_inner()
            .map_err(|e| BurrowError::Io(e.into_error()))?;
        file.sync_all()?;
        Ok(written)
    }

    /// Counters for the latest commit
    pub fn stats(&self) -> Stats {
        self.txm.stats()
    }

    /// Full consistency check of the latest commit
    pub fn check(&self) -> Result<CheckReport> {
        self.txm.begin_read().check()
    }

    /// Flush and close the store
    pub fn close(self) -> Result<()> {
        self.txm.sync()?;
        tracing::info!("Closed {}", self.txm.config().path.display());
        Ok(())
    }
}
