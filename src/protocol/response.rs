//! Response definitions
//!
//! Replies sent back to clients.

use serde::{Deserialize, Serialize};

/// Response status codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Status {
    Ok = 0x00,
    NotFound = 0x01,
    Error = 0x02,
}

impl Status {
    pub fn from_u8(tag: u8) -> Option<Self> {
        match tag {
            0x00 => Some(Status::Ok),
            0x01 => Some(Status::NotFound),
            0x02 => Some(Status::Error),
            _ => None,
        }
    }
}

/// A response to send to client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// Status code
    pub status: Status,

    /// Optional payload (value for GET, bincode for LIST/STATS, message for ERROR)
    pub payload: Option<Vec<u8>>,
}

/// LIST payload
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListResult {
    pub entries: Vec<(Vec<u8>, Vec<u8>)>,
}

impl Response {
    /// Create an OK response with optional payload
    pub fn ok(payload: Option<Vec<u8>>) -> Self {
        Self {
            status: Status::Ok,
            payload,
        }
    }

    /// Create a NOT_FOUND response
    pub fn not_found() -> Self {
        Self {
            status: Status::NotFound,
            payload: None,
        }
    }

    /// Create an ERROR response
    pub fn error(message: &str) -> Self {
        Self {
            status: Status::Error,
            payload: Some(message.as_bytes().to_vec()),
        }
    }

    /// Error text carried by an ERROR response
    pub fn error_message(&self) -> Option<String> {
        match (self.status, &self.payload) {
            (Status::Error, Some(bytes)) => Some(String::from_utf8_lossy(bytes).into_owned()),
            (Status::Error, None) => Some(String::new()),
            _ => None,
        }
    }
}
