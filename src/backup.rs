//! Snapshot Backup
//!
//! Streams a read snapshot as a standalone database file.
//!
//! ## Output Layout
//! ```text
//! ┌────────┬────────┬───────────────────────────────────────────┐
//! │ Meta 0 │ Meta 1 │ pages 2 .. high_water                     │
//! │  snap  │  snap  │ reachable: copied byte-exact, else zeroes │
//! └────────┴────────┴───────────────────────────────────────────┘
//! ```
//! Both meta slots carry the snapshot's meta, so the copy opens at the same
//! txid whichever slot its reader prefers. The writer is never blocked:
//! everything copied is pinned by the snapshot.

use std::io::Write;

use crate::error::Result;
use crate::txn::ReadTxn;

/// Write the snapshot held by `txn` to `sink`; returns bytes written
pub fn write_snapshot<W: Write>(txn: &ReadTxn, sink: &mut W) -> Result<u64> {
    let meta = *txn.meta();
    let pager = txn.pager();
    let page_size = pager.page_size();
    let reachable = txn.reachable_pages()?;

    tracing::info!(
        "Backup of txid {} started: {} pages, {} reachable",
        meta.txid,
        meta.high_water,
        reachable.len()
    );

    sink.write_all(&meta.encode(0))?;
    sink.write_all(&meta.encode(1))?;
    let mut written = 2 * page_size as u64;

    let zeroes = vec![0u8; page_size];
    for id in 2..meta.high_water {
        if reachable.contains(&id) {
            sink.write_all(&pager.read_raw(id, 1)?)?;
        } else {
            sink.write_all(&zeroes)?;
        }
        written += page_size as u64;
    }
    sink.flush()?;

    tracing::info!("Backup of txid {} finished: {} bytes", meta.txid, written);
    Ok(written)
}
