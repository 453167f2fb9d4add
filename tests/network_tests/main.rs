//! Network Tests
//!
//! Server and client talking over loopback TCP.
