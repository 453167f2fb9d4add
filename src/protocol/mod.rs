//! Protocol Module
//!
//! Defines the wire protocol for client-server communication.
//!
//! ## Protocol Format (V1 - Simple Binary)
//!
//! ### Request Format
//! ```text
//! ┌──────────┬──────────┬─────────────────────────────┐
//! │ Cmd (1)  │ Len (4)  │         Payload             │
//! └──────────┴──────────┴─────────────────────────────┘
//! ```
//!
//! ### Commands
//! - 0x01: GET    - Payload: key_len (4) + key
//! - 0x02: PUT    - Payload: key_len (4) + key + value
//! - 0x03: DEL    - Payload: key_len (4) + key
//! - 0x04: PING   - Payload: empty
//! - 0x05: LIST   - Payload: key_len (4) + prefix
//! - 0x06: BACKUP - Payload: empty
//! - 0x07: STATS  - Payload: empty
//!
//! ### Response Format
//! ```text
//! ┌──────────┬──────────┬─────────────────────────────┐
//! │Status(1) │ Len (4)  │         Payload             │
//! └──────────┴──────────┴─────────────────────────────┘
//! ```
//!
//! ### Status Codes
//! - 0x00: OK
//! - 0x01: NOT_FOUND
//! - 0x02: ERROR
//!
//! LIST and STATS payloads are bincode; a BACKUP reply is followed by the
//! raw database bytes.

mod command;
mod response;
mod codec;

pub use command::{Command, CommandType};
pub use response::{ListResult, Response, Status};
pub use codec::{
    decode_command, decode_payload, decode_response, encode_command, encode_payload,
    encode_response, read_backup_stream, read_command, read_response, write_backup_header,
    write_command, write_response, HEADER_SIZE, MAX_PAYLOAD_SIZE,
};
