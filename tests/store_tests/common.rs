//! Shared fixtures for store tests

use burrowkv::{Config, Store, SyncStrategy};
use tempfile::TempDir;

pub fn store_config(dir: &TempDir, page_size: usize, sync: SyncStrategy) -> Config {
    Config::builder()
        .path(dir.path().join("store.db"))
        .page_size(page_size)
        .sync_strategy(sync)
        .build()
}

pub fn setup_store() -> (TempDir, Store) {
    let temp_dir = TempDir::new().unwrap();
    let store = Store::open(store_config(&temp_dir, 4096, SyncStrategy::EveryCommit)).unwrap();
    (temp_dir, store)
}

pub fn collect_keys(store: &Store, prefix: &[u8]) -> Vec<Vec<u8>> {
    store
        .prefix_scan(prefix)
        .unwrap()
        .map(|entry| entry.unwrap().0)
        .collect()
}
