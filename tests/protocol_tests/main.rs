//! Protocol Tests
//!
//! Wire codec for commands, responses and backup streams.

mod stream_tests;
