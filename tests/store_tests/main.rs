//! Store Tests
//!
//! The embedded handle: point operations, concurrency, backups and a
//! model-based check against a `BTreeMap`.

mod common;
