//! Connection Handler
//!
//! Handles individual client connections.

use std::io::{BufReader, BufWriter, ErrorKind, Write};
use std::net::TcpStream;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{BurrowError, Result};
use crate::protocol::{
    encode_payload, read_command, write_backup_header, write_response, Command, ListResult,
    Response, MAX_PAYLOAD_SIZE,
};
use crate::store::Store;

/// Handles a single client connection
pub struct Connection {
    /// TCP stream reader (buffered for efficiency)
    reader: BufReader<TcpStream>,

    /// TCP stream writer (buffered for efficiency)
    writer: BufWriter<TcpStream>,

    /// Shared store handle
    store: Arc<Store>,

    /// Peer address for logging
    peer_addr: String,
}

impl Connection {
    /// Create a new connection handler
    ///
    /// Sets up buffered I/O and disables Nagle's algorithm
    pub fn new(stream: TcpStream, store: Arc<Store>) -> Result<Self> {
        let peer_addr = stream
            .peer_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|_| "unknown".to_string());

        stream.set_nodelay(true)?;
        let read_stream = stream.try_clone()?;

        Ok(Self {
            reader: BufReader::new(read_stream),
            writer: BufWriter::new(stream),
            store,
            peer_addr,
        })
    }

    /// Configure connection timeouts (0 = none)
    pub fn set_timeouts(&mut self, read_ms: u64, write_ms: u64) -> Result<()> {
        if read_ms > 0 {
            self.reader
                .get_ref()
                .set_read_timeout(Some(Duration::from_millis(read_ms)))?;
        }
        if write_ms > 0 {
            self.writer
                .get_ref()
                .set_write_timeout(Some(Duration::from_millis(write_ms)))?;
        }
        Ok(())
    }

    /// Handle the connection (blocking until closed)
    ///
    /// Reads commands in a loop and sends responses.
    /// Returns when the client disconnects or an error occurs.
    pub fn handle(&mut self) -> Result<()> {
        tracing::debug!("Connection established from {}", self.peer_addr);

        loop {
            let command = match read_command(&mut self.reader) {
                Ok(cmd) => cmd,
                Err(BurrowError::Io(ref e)) if is_hangup(e.kind()) => {
                    tracing::debug!("Client {} disconnected ({:?})", self.peer_addr, e.kind());
                    return Ok(());
                }
                Err(BurrowError::Io(ref e))
                    if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) =>
                {
                    tracing::debug!("Read timeout for client {}", self.peer_addr);
                    return Ok(());
                }
                Err(e) => {
                    tracing::warn!("Error reading from {}: {}", self.peer_addr, e);
                    let _ = self.send_response(Response::error(&e.to_string()));
                    return Err(e);
                }
            };

            tracing::trace!(
                "Received command from {}: {:?}",
                self.peer_addr,
                command.command_type()
            );

            let sent = match command {
                Command::Backup => self.stream_backup(),
                other => {
                    let response = self.execute_command(other);
                    self.send_response(response)
                }
            };

            if let Err(e) = sent {
                if let BurrowError::Io(ref io_err) = e {
                    if is_hangup(io_err.kind()) || io_err.kind() == ErrorKind::BrokenPipe {
                        tracing::debug!(
                            "Client {} disconnected before response could be sent: {}",
                            self.peer_addr,
                            e
                        );
                        return Ok(());
                    }
                }
                tracing::warn!("Error writing to {}: {}", self.peer_addr, e);
                return Err(e);
            }
        }
    }

    /// Execute a command and return a response
    fn execute_command(&self, command: Command) -> Response {
        let result = match command {
            Command::Get { key } => self.store.get(&key).map(|value| match value {
                Some(value) => Response::ok(Some(value)),
                None => Response::not_found(),
            }),
            Command::Put { key, value } => self.store.put(&key, &value).map(|_| Response::ok(None)),
            Command::Delete { key } => self.store.delete(&key).map(|found| {
                if found {
                    Response::ok(None)
                } else {
                    Response::not_found()
                }
            }),
            Command::Ping => Ok(Response::ok(Some(b"PONG".to_vec()))),
            Command::List { prefix } => self.list(&prefix),
            Command::Stats => encode_payload(&self.store.stats()).map(|p| Response::ok(Some(p))),
            Command::Backup => Err(BurrowError::Protocol(
                "BACKUP replies are streamed".to_string(),
            )),
        };

        result.unwrap_or_else(|e| {
            tracing::debug!("Command from {} failed: {}", self.peer_addr, e);
            Response::error(&e.to_string())
        })
    }

    fn list(&self, prefix: &[u8]) -> Result<Response> {
        let entries = self.store.prefix_scan(prefix)?.collect::<Result<Vec<_>>>()?;
        let payload = encode_payload(&ListResult { entries })?;
        if payload.len() > MAX_PAYLOAD_SIZE as usize {
            return Err(BurrowError::Protocol(format!(
                "LIST result of {} bytes exceeds the {} byte payload limit",
                payload.len(),
                MAX_PAYLOAD_SIZE
            )));
        }
        Ok(Response::ok(Some(payload)))
    }

    /// Send the latest commit as a raw database file
    fn stream_backup(&mut self) -> Result<()> {
        let txn = self.store.begin_read();
        let size = txn.size();
        if size > u32::MAX as u64 {
            return self.send_response(Response::error(&format!(
                "database of {} bytes is too large to stream",
                size
            )));
        }

        tracing::info!("Streaming backup of txid {} to {}", txn.txid(), self.peer_addr);
        write_backup_header(&mut self.writer, size)?;
        txn.write_to(&mut self.writer)?;
        self.writer.flush()?;
        Ok(())
    }

    /// Send a response to the client
    fn send_response(&mut self, response: Response) -> Result<()> {
        write_response(&mut self.writer, &response)
    }

    /// Get the peer address string
    pub fn peer_addr(&self) -> &str {
        &self.peer_addr
    }
}

fn is_hangup(kind: ErrorKind) -> bool {
    matches!(
        kind,
        ErrorKind::UnexpectedEof | ErrorKind::ConnectionReset | ErrorKind::ConnectionAborted
    )
}
