//! Configuration for burrowkv
//!
//! Centralized configuration with sensible defaults.

use std::path::PathBuf;

use crate::error::{BurrowError, Result};
use crate::pager::{DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE, MIN_PAGE_SIZE};

/// Main configuration for a burrowkv instance
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Storage Configuration
    // -------------------------------------------------------------------------
    /// Path of the single database file
    pub path: PathBuf,

    /// Page size used when creating a new file.
    /// Existing files keep the page size recorded in their meta page.
    pub page_size: usize,

    /// When to fsync during commit
    pub sync_strategy: SyncStrategy,

    /// Bucket used by the `Store` point/scan API, created on first open
    pub default_bucket: String,

    /// Run a full consistency check before every meta flip
    pub strict_mode: bool,

    // -------------------------------------------------------------------------
    // Network Configuration
    // -------------------------------------------------------------------------
    /// TCP listen address
    pub listen_addr: String,

    /// Max queued client connections waiting for a worker
    pub max_connections: usize,

    /// Number of connection worker threads
    pub worker_threads: usize,

    /// Connection read timeout (milliseconds, 0 = none)
    pub read_timeout_ms: u64,

    /// Connection write timeout (milliseconds, 0 = none)
    pub write_timeout_ms: u64,
}

/// Commit sync strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStrategy {
    /// fsync data pages, then fsync the meta page (crash safe)
    EveryCommit,

    /// never fsync; the OS decides (fast, only safe against process crashes)
    Never,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./burrow.db"),
            page_size: DEFAULT_PAGE_SIZE,
            sync_strategy: SyncStrategy::EveryCommit,
            default_bucket: "default".to_string(),
            strict_mode: false,
            listen_addr: "127.0.0.1:8080".to_string(),
            max_connections: 1024,
            worker_threads: 8,
            read_timeout_ms: 5000,
            write_timeout_ms: 5000,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Check values that would otherwise fail deep inside the engine
    pub fn validate(&self) -> Result<()> {
        if !self.page_size.is_power_of_two()
            || self.page_size < MIN_PAGE_SIZE
            || self.page_size > MAX_PAGE_SIZE
        {
            return Err(BurrowError::Config(format!(
                "page_size must be a power of two in {}..={}, got {}",
                MIN_PAGE_SIZE, MAX_PAGE_SIZE, self.page_size
            )));
        }
        if self.default_bucket.is_empty() {
            return Err(BurrowError::Config(
                "default_bucket must not be empty".to_string(),
            ));
        }
        if self.worker_threads == 0 {
            return Err(BurrowError::Config(
                "worker_threads must be at least 1".to_string(),
            ));
        }
        if self.max_connections == 0 {
            return Err(BurrowError::Config(
                "max_connections must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the database file path
    pub fn path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.path = path.into();
        self
    }

    /// Set the page size for newly created files
    pub fn page_size(mut self, size: usize) -> Self {
        self.config.page_size = size;
        self
    }

    /// Set the commit sync strategy
    pub fn sync_strategy(mut self, strategy: SyncStrategy) -> Self {
        self.config.sync_strategy = strategy;
        self
    }

    /// Set the default bucket name
    pub fn default_bucket(mut self, name: impl Into<String>) -> Self {
        self.config.default_bucket = name.into();
        self
    }

    /// Enable or disable the pre-commit consistency check
    pub fn strict_mode(mut self, enabled: bool) -> Self {
        self.config.strict_mode = enabled;
        self
    }

    /// Set the TCP listen address
    pub fn listen_addr(mut self, addr: impl Into<String>) -> Self {
        self.config.listen_addr = addr.into();
        self
    }

    /// Set the maximum number of queued connections
    pub fn max_connections(mut self, count: usize) -> Self {
        self.config.max_connections = count;
        self
    }

    /// Set the number of connection worker threads
    pub fn worker_threads(mut self, count: usize) -> Self {
        self.config.worker_threads = count;
        self
    }

    /// Set the read timeout (in milliseconds)
    pub fn read_timeout_ms(mut self, ms: u64) -> Self {
        self.config.read_timeout_ms = ms;
        self
    }

    /// Set the write timeout (in milliseconds)
    pub fn write_timeout_ms(mut self, ms: u64) -> Self {
        self.config.write_timeout_ms = ms;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
