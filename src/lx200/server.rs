//! TCP server answering LX200 queries from planetarium apps.
//!
//! One acceptor thread polls a non-blocking listener; each client gets its
//! own worker thread. The only state shared with the orchestrator is the
//! latest published [`SolveResult`], replaced and read under one mutex, so a
//! reader sees either the old result or the new one and never a mix.

use anyhow::{Context, Result};
use chrono::Local;
use std::collections::VecDeque;
use std::io::{ErrorKind, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use super::protocol::{CommandBuffer, respond};
use crate::common::constants::*;
use crate::model::SolveResult;

/// Bounded journal of protocol traffic for diagnostics.
#[derive(Debug)]
pub struct TrafficLog {
    entries: VecDeque<String>,
    capacity: usize,
}

impl TrafficLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn record(&mut self, text: impl Into<String>) {
        let text = text.into();
        log_debug!("LX200 {}", text);
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(format!(
            "{} {}",
            Local::now().format("%Y-%m-%d %H:%M:%S"),
            text
        ));
    }

    /// The newest `n` entries, oldest first.
    pub fn recent(&self, n: usize) -> Vec<String> {
        let skip = self.entries.len().saturating_sub(n);
        self.entries.iter().skip(skip).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    // A panicking client thread must not wedge every other reader
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

struct Shared {
    latest: Mutex<Option<SolveResult>>,
    traffic: Mutex<TrafficLog>,
    running: AtomicBool,
}

impl Shared {
    fn record(&self, text: impl Into<String>) {
        lock(&self.traffic).record(text);
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

/// Cheap cloneable handle for publishing results to a running server.
#[derive(Clone)]
pub struct Lx200Handle {
    shared: Arc<Shared>,
}

impl Lx200Handle {
    /// Replace the result served to clients.
    pub fn publish(&self, result: &SolveResult) {
        *lock(&self.shared.latest) = Some(result.clone());

        let (ra, dec) = match result.coords {
            Some(c) => (format!("{:.6}", c.ra_deg), format!("{:.6}", c.dec_deg)),
            None => ("-".to_string(), "-".to_string()),
        };
        self.shared.record(format!(
            "PUB RA={ra} DEC={dec} CONF={}",
            result.confidence_display()
        ));
    }

    pub fn latest(&self) -> Option<SolveResult> {
        lock(&self.shared.latest).clone()
    }

    pub fn recent_traffic(&self, n: usize) -> Vec<String> {
        lock(&self.shared.traffic).recent(n)
    }
}

/// Read-only LX200 server.
pub struct Lx200Server {
    listener: Option<TcpListener>,
    local_addr: SocketAddr,
    shared: Arc<Shared>,
    acceptor: Option<JoinHandle<()>>,
}

impl Lx200Server {
    /// Bind the listening socket. Clients are accepted after [`start`](Self::start).
    pub fn bind(addr: impl ToSocketAddrs) -> Result<Self> {
        let listener = TcpListener::bind(addr).context("Failed to bind LX200 server socket")?;
        listener
            .set_nonblocking(true)
            .context("Failed to set LX200 listener to non-blocking mode")?;
        let local_addr = listener
            .local_addr()
            .context("Failed to read LX200 listener address")?;

        Ok(Self {
            listener: Some(listener),
            local_addr,
            shared: Arc::new(Shared {
                latest: Mutex::new(None),
                traffic: Mutex::new(TrafficLog::new(LX200_TRAFFIC_CAPACITY)),
                running: AtomicBool::new(true),
            }),
            acceptor: None,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Spawn the acceptor thread.
    pub fn start(&mut self) -> Result<()> {
        let listener = self
            .listener
            .take()
            .context("LX200 server already started")?;
        let shared = Arc::clone(&self.shared);

        let handle = thread::Builder::new()
            .name("lx200-accept".to_string())
            .spawn(move || accept_loop(listener, shared))
            .context("Failed to spawn LX200 acceptor thread")?;
        self.acceptor = Some(handle);

        self.shared
            .record(format!("LX200 server started on {}", self.local_addr));
        log_decorated!("LX200 server listening on {}", self.local_addr);
        Ok(())
    }

    pub fn handle(&self) -> Lx200Handle {
        Lx200Handle {
            shared: Arc::clone(&self.shared),
        }
    }

    pub fn publish(&self, result: &SolveResult) {
        self.handle().publish(result);
    }

    pub fn latest(&self) -> Option<SolveResult> {
        self.handle().latest()
    }

    pub fn recent_traffic(&self, n: usize) -> Vec<String> {
        self.handle().recent_traffic(n)
    }

    /// Stop accepting and join the acceptor. Client workers notice on their
    /// next read timeout and close their connections.
    pub fn shutdown(&mut self) {
        self.shared.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.acceptor.take() {
            let _ = handle.join();
            log_debug!("LX200 server stopped");
        }
    }
}

impl Drop for Lx200Server {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn accept_loop(listener: TcpListener, shared: Arc<Shared>) {
    while shared.is_running() {
        match listener.accept() {
            Ok((stream, peer)) => {
                shared.record(format!("ACCEPT {peer}"));
                let client_shared = Arc::clone(&shared);
                let spawned = thread::Builder::new()
                    .name(format!("lx200-{peer}"))
                    .spawn(move || serve_client(stream, peer, client_shared));
                if let Err(e) = spawned {
                    log_warning!("Failed to spawn LX200 client thread for {peer}: {e}");
                }
            }
            Err(ref e) if e.kind() == ErrorKind::WouldBlock => {
                thread::sleep(Duration::from_millis(LX200_ACCEPT_POLL_MS));
            }
            Err(e) => {
                log_warning!("LX200 accept failed: {e}");
                thread::sleep(Duration::from_millis(LX200_ACCEPT_BACKOFF_MS));
            }
        }
    }
}

fn serve_client(mut stream: TcpStream, peer: SocketAddr, shared: Arc<Shared>) {
    if let Err(e) = configure_client(&stream) {
        log_warning!("Failed to configure LX200 client {peer}: {e}");
        shared.record(format!("CLOSE {peer}"));
        return;
    }

    let mut buffer = CommandBuffer::new();
    let mut chunk = [0u8; LX200_READ_BUFFER_SIZE];

    'connection: while shared.is_running() {
        let n = match stream.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => n,
            // Idle clients poll slowly; a timeout only re-checks the running flag
            Err(ref e)
                if matches!(
                    e.kind(),
                    ErrorKind::WouldBlock | ErrorKind::TimedOut | ErrorKind::Interrupted
                ) =>
            {
                continue;
            }
            Err(e) => {
                log_debug!("LX200 read from {peer} failed: {e}");
                break;
            }
        };

        let received = &chunk[..n];
        shared.record(format!(
            "RECV {peer} HEX={} TXT={:?}",
            hex(received),
            String::from_utf8_lossy(received)
        ));

        for command in buffer.push(received) {
            shared.record(format!("CMD {peer} {command}"));
            let latest = lock(&shared.latest).clone();
            let reply = respond(&command, latest.as_ref(), Local::now());

            if let Err(e) = stream.write_all(reply.as_bytes()) {
                log_debug!("LX200 write to {peer} failed: {e}");
                break 'connection;
            }
            shared.record(format!(
                "SEND {peer} HEX={} TXT={:?}",
                hex(reply.as_bytes()),
                reply
            ));
        }
    }

    shared.record(format!("CLOSE {peer}"));
}

fn configure_client(stream: &TcpStream) -> std::io::Result<()> {
    // Accepted sockets may inherit the listener's non-blocking flag
    stream.set_nonblocking(false)?;
    stream.set_read_timeout(Some(Duration::from_millis(LX200_CLIENT_READ_TIMEOUT_MS)))?;
    stream.set_nodelay(true)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Equatorial;

    fn query(stream: &mut TcpStream, command: &str, reply_len: usize) -> String {
        stream.write_all(command.as_bytes()).unwrap();
        let mut reply = vec![0u8; reply_len];
        stream.read_exact(&mut reply).unwrap();
        String::from_utf8(reply).unwrap()
    }

    #[test]
    fn test_traffic_log_is_bounded() {
        let mut log = TrafficLog::new(3);
        for i in 0..5 {
            log.record(format!("CMD {i}"));
        }
        assert_eq!(log.len(), 3);
        let recent = log.recent(10);
        assert!(recent[0].ends_with("CMD 2"));
        assert!(recent[2].ends_with("CMD 4"));
        assert_eq!(log.recent(1).len(), 1);
    }

    #[test]
    fn test_publish_replaces_latest() {
        let server = Lx200Server::bind("127.0.0.1:0").unwrap();
        assert!(server.latest().is_none());

        let first = SolveResult::solved(Equatorial::new(10.0, 20.0), None, None, Some(0.9));
        server.publish(&first);
        let second = SolveResult::failed();
        server.publish(&second);

        assert_eq!(server.latest(), Some(second));
        let traffic = server.recent_traffic(2);
        assert!(traffic[0].contains("PUB RA=10.000000 DEC=20.000000 CONF=0.90"));
        assert!(traffic[1].contains("PUB RA=- DEC=- CONF=0.00"));
    }

    #[test]
    fn test_serves_published_coordinates() {
        let mut server = Lx200Server::bind("127.0.0.1:0").unwrap();
        server.start().unwrap();
        let mut client = TcpStream::connect(server.local_addr()).unwrap();
        client
            .set_read_timeout(Some(Duration::from_secs(5)))
            .unwrap();

        assert_eq!(query(&mut client, ":GR#", 9), "00:00:00#");

        server.publish(&SolveResult::solved(
            Equatorial::new(296.964, 42.7365),
            None,
            None,
            None,
        ));
        assert_eq!(query(&mut client, ":GR#", 9), "19:47:51#");
        assert_eq!(query(&mut client, ":GD#", 10), "+42*44:11#");

        drop(client);
        server.shutdown();
        assert!(
            server
                .recent_traffic(LX200_TRAFFIC_CAPACITY)
                .iter()
                .any(|l| l.contains("CMD") && l.contains(":GD#"))
        );
    }

    #[test]
    fn test_start_twice_fails() {
        let mut server = Lx200Server::bind("127.0.0.1:0").unwrap();
        server.start().unwrap();
        assert!(server.start().is_err());
    }
}
