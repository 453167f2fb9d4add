//! # burrowkv
//!
//! An embedded, single-file, transactional key-value store with:
//! - Copy-on-write B+tree pages (no in-place updates of committed data)
//! - Snapshot isolation: one writer, any number of non-blocking readers
//! - Crash safety through double-buffered, checksummed meta pages
//! - Named buckets, prefix scans and online backups
//! - An optional TCP front end
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │              TCP Server / Client   (network, protocol)      │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                        Store                                │
//! │        get / put / delete / prefix_scan / backup            │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                Transaction Manager (txn)                    │
//! │     ReadTxn (pinned meta)        WriteTxn (single permit)   │
//! └──────────┬───────────────────────────────┬──────────────────┘
//!            │                               │
//!            ▼                               ▼
//!   ┌─────────────────┐            ┌───────────────────┐
//!   │  B+Tree (btree) │◄──────────►│   Pager (pager)   │
//!   │ cursor, COW ops │            │ meta, free list   │
//!   └─────────────────┘            └───────────────────┘
//! ```
//!
//! ## Example
//! ```no_run
//! use burrowkv::Store;
//!
//! let store = Store::open_path("./example.db")?;
//! store.put(b"user:1", b"ada")?;
//! assert_eq!(store.get(b"user:1")?, Some(b"ada".to_vec()));
//! for entry in store.prefix_scan(b"user:")? {
//!     let (key, value) = entry?;
//!     println!("{:?} = {:?}", key, value);
//! }
//! # Ok::<(), burrowkv::BurrowError>(())
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod pager;
pub mod btree;
pub mod txn;
pub mod backup;
pub mod store;
pub mod network;
pub mod protocol;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{BurrowError, Result};
pub use config::{Config, SyncStrategy};
pub use store::Store;
pub use txn::{Bucket, BucketMut, CheckReport, ReadTxn, Stats, TxManager, WriteTxn};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of burrowkv
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
