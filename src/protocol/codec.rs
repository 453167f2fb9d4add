//! Protocol codec
//!
//! Encoding and decoding functions for the wire protocol.
//!
//! ## Wire Format
//!
//! ### Request (Command) Format
//! ```text
//! ┌──────────┬──────────┬─────────────────────────────┐
//! │ Cmd (1)  │ Len (4)  │         Payload             │
//! └──────────┴──────────┴─────────────────────────────┘
//! ```
//!
//! ### Payload by Command Type
//! - GET:    key_len (4 bytes) + key
//! - PUT:    key_len (4 bytes) + key + value
//! - DELETE: key_len (4 bytes) + key
//! - LIST:   key_len (4 bytes) + prefix
//! - PING, BACKUP, STATS: empty
//!
//! ### Response Format
//! ```text
//! ┌──────────┬──────────┬─────────────────────────────┐
//! │Status(1) │ Len (4)  │         Payload             │
//! └──────────┴──────────┴─────────────────────────────┘
//! ```
//! A BACKUP response is followed by exactly `Len` raw database bytes and is
//! exempt from the payload cap.

use std::io::{self, Read, Write};

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{BurrowError, Result};

use super::{Command, CommandType, Response, Status};

/// Header size: 1 byte command/status + 4 bytes length
pub const HEADER_SIZE: usize = 5;

/// Maximum payload size (16 MB)
pub const MAX_PAYLOAD_SIZE: u32 = 16 * 1024 * 1024;

// =============================================================================
// Command Encoding/Decoding
// =============================================================================

/// Encode a command to bytes
///
/// Format: cmd_type (1) + payload_len (4) + payload
pub fn encode_command(command: &Command) -> Vec<u8> {
    let payload = match command {
        Command::Get { key } | Command::Delete { key } => length_prefixed(key, &[]),
        Command::Put { key, value } => length_prefixed(key, value),
        Command::List { prefix } => length_prefixed(prefix, &[]),
        Command::Ping | Command::Backup | Command::Stats => Vec::new(),
    };
    frame(command.command_type() as u8, &payload)
}

/// Decode a command from bytes (header included)
pub fn decode_command(bytes: &[u8]) -> Result<Command> {
    let (tag, payload) = unframe(bytes, "command")?;
    let cmd_type = CommandType::from_u8(tag)
        .ok_or_else(|| BurrowError::Protocol(format!("Unknown command type: 0x{:02x}", tag)))?;

    match cmd_type {
        CommandType::Get => {
            let (key, _) = split_key(payload, "GET")?;
            Ok(Command::Get { key })
        }
        CommandType::Put => {
            let (key, value) = split_key(payload, "PUT")?;
            Ok(Command::Put {
                key,
                value: value.to_vec(),
            })
        }
        CommandType::Delete => {
            let (key, _) = split_key(payload, "DELETE")?;
            Ok(Command::Delete { key })
        }
        CommandType::List => {
            let (prefix, _) = split_key(payload, "LIST")?;
            Ok(Command::List { prefix })
        }
        CommandType::Ping => expect_empty(payload, "PING").map(|_| Command::Ping),
        CommandType::Backup => expect_empty(payload, "BACKUP").map(|_| Command::Backup),
        CommandType::Stats => expect_empty(payload, "STATS").map(|_| Command::Stats),
    }
}

/// key_len (4, big endian) + key + rest
fn length_prefixed(key: &[u8], rest: &[u8]) -> Vec<u8> {
    let mut payload = Vec::with_capacity(4 + key.len() + rest.len());
    payload.extend_from_slice(&(key.len() as u32).to_be_bytes());
    payload.extend_from_slice(key);
    payload.extend_from_slice(rest);
    payload
}

/// Split a length-prefixed key off the front of `payload`
fn split_key<'a>(payload: &'a [u8], what: &str) -> Result<(Vec<u8>, &'a [u8])> {
    if payload.len() < 4 {
        return Err(BurrowError::Protocol(format!(
            "{} command: missing key length",
            what
        )));
    }

    let key_len = u32::from_be_bytes([payload[0], payload[1], payload[2], payload[3]]) as usize;
    if payload.len() - 4 < key_len {
        return Err(BurrowError::Protocol(format!(
            "{} command: incomplete key (expected {}, got {})",
            what,
            key_len,
            payload.len() - 4
        )));
    }

    Ok((payload[4..4 + key_len].to_vec(), &payload[4 + key_len..]))
}

fn expect_empty(payload: &[u8], what: &str) -> Result<()> {
    if !payload.is_empty() {
        return Err(BurrowError::Protocol(format!(
            "{} command: unexpected payload of {} bytes",
            what,
            payload.len()
        )));
    }
    Ok(())
}

// =============================================================================
// Response Encoding/Decoding
// =============================================================================

/// Encode a response to bytes
///
/// Format: status (1) + payload_len (4) + payload
pub fn encode_response(response: &Response) -> Vec<u8> {
    let payload = response.payload.as_deref().unwrap_or(&[]);
    frame(response.status as u8, payload)
}

/// Decode a response from bytes (header included)
pub fn decode_response(bytes: &[u8]) -> Result<Response> {
    let (tag, payload) = unframe(bytes, "response")?;
    let status = Status::from_u8(tag)
        .ok_or_else(|| BurrowError::Protocol(format!("Unknown response status: 0x{:02x}", tag)))?;

    Ok(Response {
        status,
        payload: (!payload.is_empty()).then(|| payload.to_vec()),
    })
}

/// Serialize a LIST or STATS payload
pub fn encode_payload<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    Ok(bincode::serialize(value)?)
}

/// Deserialize a LIST or STATS payload
pub fn decode_payload<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    Ok(bincode::deserialize(bytes)?)
}

// =============================================================================
// Framing
// =============================================================================

fn frame(tag: u8, payload: &[u8]) -> Vec<u8> {
    let mut message = Vec::with_capacity(HEADER_SIZE + payload.len());
    message.push(tag);
    message.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    message.extend_from_slice(payload);
    message
}

fn unframe<'a>(bytes: &'a [u8], what: &str) -> Result<(u8, &'a [u8])> {
    if bytes.len() < HEADER_SIZE {
        return Err(BurrowError::Protocol(format!(
            "Incomplete {} header: expected {} bytes, got {}",
            what,
            HEADER_SIZE,
            bytes.len()
        )));
    }

    let payload_len = check_len([bytes[1], bytes[2], bytes[3], bytes[4]], what)?;
    let total_len = HEADER_SIZE + payload_len;
    if bytes.len() < total_len {
        return Err(BurrowError::Protocol(format!(
            "Incomplete {} payload: expected {} bytes, got {}",
            what,
            total_len,
            bytes.len()
        )));
    }

    Ok((bytes[0], &bytes[HEADER_SIZE..total_len]))
}

fn check_len(raw: [u8; 4], what: &str) -> Result<usize> {
    let len = u32::from_be_bytes(raw);
    if len > MAX_PAYLOAD_SIZE {
        return Err(BurrowError::Protocol(format!(
            "{} payload too large: {} bytes (max {})",
            what, len, MAX_PAYLOAD_SIZE
        )));
    }
    Ok(len as usize)
}

// =============================================================================
// Stream-based I/O helpers
// =============================================================================

/// Read one framed message: header, then the capped payload
fn read_frame<R: Read>(reader: &mut R, what: &str) -> Result<Vec<u8>> {
    let mut header = [0u8; HEADER_SIZE];
    reader.read_exact(&mut header)?;
    let payload_len = check_len([header[1], header[2], header[3], header[4]], what)?;

    let mut message = vec![0u8; HEADER_SIZE + payload_len];
    message[..HEADER_SIZE].copy_from_slice(&header);
    reader.read_exact(&mut message[HEADER_SIZE..])?;
    Ok(message)
}

/// Read a complete command from a stream
///
/// Blocks until a complete command is received or an error occurs
pub fn read_command<R: Read>(reader: &mut R) -> Result<Command> {
    decode_command(&read_frame(reader, "command")?)
}

/// Write a command to a stream
pub fn write_command<W: Write>(writer: &mut W, command: &Command) -> Result<()> {
    writer.write_all(&encode_command(command))?;
    writer.flush()?;
    Ok(())
}

/// Read a complete response from a stream
pub fn read_response<R: Read>(reader: &mut R) -> Result<Response> {
    decode_response(&read_frame(reader, "response")?)
}

/// Write a response to a stream
pub fn write_response<W: Write>(writer: &mut W, response: &Response) -> Result<()> {
    writer.write_all(&encode_response(response))?;
    writer.flush()?;
    Ok(())
}

/// Write the OK header announcing a backup body of `len` bytes
pub fn write_backup_header<W: Write>(writer: &mut W, len: u64) -> Result<()> {
    let len = u32::try_from(len).map_err(|_| {
        BurrowError::Protocol(format!("backup of {} bytes does not fit the length field", len))
    })?;
    writer.write_all(&[Status::Ok as u8])?;
    writer.write_all(&len.to_be_bytes())?;
    Ok(())
}

/// Read a BACKUP reply, copying the database bytes into `sink`
///
/// Returns the number of bytes copied. An ERROR reply becomes a
/// `Protocol` error carrying the server's message.
pub fn read_backup_stream<R: Read, W: Write>(reader: &mut R, sink: &mut W) -> Result<u64> {
    let mut header = [0u8; HEADER_SIZE];
    reader.read_exact(&mut header)?;
    let status = Status::from_u8(header[0]).ok_or_else(|| {
        BurrowError::Protocol(format!("Unknown response status: 0x{:02x}", header[0]))
    })?;
    let len = u32::from_be_bytes([header[1], header[2], header[3], header[4]]) as u64;

    if status != Status::Ok {
        let payload_len = check_len([header[1], header[2], header[3], header[4]], "response")?;
        let mut payload = vec![0u8; payload_len];
        reader.read_exact(&mut payload)?;
        return Err(BurrowError::Protocol(format!(
            "backup refused: {}",
            String::from_utf8_lossy(&payload)
        )));
    }

    let copied = io::copy(&mut reader.take(len), sink)?;
    if copied != len {
        return Err(BurrowError::Protocol(format!(
            "backup stream ended after {} of {} bytes",
            copied, len
        )));
    }
    sink.flush()?;
    Ok(copied)
}
