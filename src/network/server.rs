//! TCP Server
//!
//! Accepts connections and dispatches them to worker threads.
//!
//! ```text
//!  acceptor (non-blocking, polls shutdown flag)
//!      │ bounded crossbeam channel (max_connections)
//!      ▼
//!  worker 0 .. worker N ──► Connection::handle ──► Store
//! ```

use std::io::ErrorKind;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam::channel::{self, Receiver, TrySendError};

use crate::config::Config;
use crate::error::Result;
use crate::protocol::{write_response, Response};
use crate::store::Store;

use super::Connection;

/// How long the acceptor sleeps when no connection is pending
const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Handle that stops a running server from another thread
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    flag: Arc<AtomicBool>,
}

impl ShutdownHandle {
    /// Signal the server to shutdown gracefully
    pub fn shutdown(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_shutdown(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// TCP server for burrowkv
pub struct Server {
    config: Config,
    store: Arc<Store>,
    listener: TcpListener,
    shutdown: ShutdownHandle,
}

impl Server {
    /// Bind the listen address from `config`
    pub fn bind(config: Config, store: Arc<Store>) -> Result<Self> {
        let listener = TcpListener::bind(&config.listen_addr)?;
        listener.set_nonblocking(true)?;
        tracing::info!("Listening on {}", listener.local_addr()?);

        Ok(Self {
            config,
            store,
            listener,
            shutdown: ShutdownHandle {
                flag: Arc::new(AtomicBool::new(false)),
            },
        })
    }

    /// Address actually bound (useful with port 0)
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Handle for stopping `run` from another thread
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    /// Serve until shutdown is signalled (blocking)
    ///
    /// Open connections finish (or time out) before this returns.
    pub fn run(self) -> Result<()> {
        let (tx, rx) = channel::bounded::<TcpStream>(self.config.max_connections);

        let mut workers = Vec::with_capacity(self.config.worker_threads);
        for id in 0..self.config.worker_threads {
            workers.push(self.spawn_worker(id, rx.clone())?);
        }
        drop(rx);

        while !self.shutdown.is_shutdown() {
            match self.listener.accept() {
                Ok((stream, peer)) => {
                    stream.set_nonblocking(false)?;
                    match tx.try_send(stream) {
                        Ok(()) => tracing::trace!("Queued connection from {}", peer),
                        Err(TrySendError::Full(stream)) => {
                            tracing::warn!("Connection queue full, rejecting {}", peer);
                            let _ = write_response(&mut &stream, &Response::error("server busy"));
                        }
                        Err(TrySendError::Disconnected(_)) => {
                            tracing::error!("All workers exited; stopping acceptor");
                            break;
                        }
                    }
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => thread::sleep(ACCEPT_POLL_INTERVAL),
                Err(e) => tracing::warn!("Accept failed: {}", e),
            }
        }

        tracing::info!("Shutting down, waiting for {} workers", workers.len());
        drop(tx);
        for worker in workers {
            if worker.join().is_err() {
                tracing::error!("Worker thread panicked");
            }
        }
        tracing::info!("Server stopped");
        Ok(())
    }

    fn spawn_worker(&self, id: usize, rx: Receiver<TcpStream>) -> Result<JoinHandle<()>> {
        let store = Arc::clone(&self.store);
        let read_ms = self.config.read_timeout_ms;
        let write_ms = self.config.write_timeout_ms;

        let handle = thread::Builder::new()
            .name(format!("burrowkv-worker-{}", id))
            .spawn(move || {
                for stream in rx.iter() {
                    let mut conn = match Connection::new(stream, Arc::clone(&store)) {
                        Ok(conn) => conn,
                        Err(e) => {
                            tracing::warn!("Failed to set up connection: {}", e);
                            continue;
                        }
                    };
                    if let Err(e) = conn.set_timeouts(read_ms, write_ms) {
                        tracing::warn!("Failed to set timeouts for {}: {}", conn.peer_addr(), e);
                        continue;
                    }
                    if let Err(e) = conn.handle() {
                        tracing::debug!("Connection {} closed with error: {}", conn.peer_addr(), e);
                    }
                }
            })?;
        Ok(handle)
    }
}
