//! TCP Client
//!
//! Blocking client for the wire protocol, used by the CLI and tests.

use std::io::{BufReader, BufWriter, Write};
use std::net::{TcpStream, ToSocketAddrs};

use crate::error::{BurrowError, Result};
use crate::protocol::{
    decode_payload, read_backup_stream, read_response, write_command, Command, ListResult,
    Response, Status,
};
use crate::txn::Stats;

/// A connection to a burrowkv server
pub struct Client {
    reader: BufReader<TcpStream>,
    writer: BufWriter<TcpStream>,
}

impl Client {
    /// Connect to `addr`
    pub fn connect<A: ToSocketAddrs>(addr: A) -> Result<Self> {
        let stream = TcpStream::connect(addr)?;
        stream.set_nodelay(true)?;
        let read_stream = stream.try_clone()?;
        Ok(Self {
            reader: BufReader::new(read_stream),
            writer: BufWriter::new(stream),
        })
    }

    fn call(&mut self, command: &Command) -> Result<Response> {
        write_command(&mut self.writer, command)?;
        let response = read_response(&mut self.reader)?;
        match response.error_message() {
            Some(message) => Err(BurrowError::Network(format!("server error: {}", message))),
            None => Ok(response),
        }
    }

    pub fn ping(&mut self) -> Result<()> {
        self.call(&Command::Ping).map(|_| ())
    }

    pub fn get(&mut self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let response = self.call(&Command::Get { key: key.to_vec() })?;
        Ok(match response.status {
            Status::Ok => Some(response.payload.unwrap_or_default()),
            _ => None,
        })
    }

    pub fn put(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        self.call(&Command::Put {
            key: key.to_vec(),
            value: value.to_vec(),
        })
        .map(|_| ())
    }

    /// Returns whether the key existed
    pub fn delete(&mut self, key: &[u8]) -> Result<bool> {
        let response = self.call(&Command::Delete { key: key.to_vec() })?;
        Ok(response.status == Status::Ok)
    }

    /// Every pair whose key starts with `prefix`, ascending
    pub fn list(&mut self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        let response = self.call(&Command::List {
            prefix: prefix.to_vec(),
        })?;
        let list: ListResult = decode_payload(response.payload.as_deref().unwrap_or(&[]))?;
        Ok(list.entries)
    }

    pub fn stats(&mut self) -> Result<Stats> {
        let response = self.call(&Command::Stats)?;
        decode_payload(response.payload.as_deref().unwrap_or(&[]))
    }

    /// Copy the server's latest commit into `sink`; returns bytes copied
    pub fn backup_to<W: Write>(&mut self, sink: &mut W) -> Result<u64> {
        write_command(&mut self.writer, &Command::Backup)?;
        read_backup_stream(&mut self.reader, sink)
    }
}
