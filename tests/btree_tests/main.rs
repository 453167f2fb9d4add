//! B+Tree Tests
//!
//! Node codec, copy-on-write mutation, spill and cursor iteration.

mod tree_tests;
