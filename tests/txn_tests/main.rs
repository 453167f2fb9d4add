//! Transaction Tests
//!
//! Snapshot isolation, the single-writer rule, buckets and crash recovery.

mod bucket_tests;
mod recovery_tests;
