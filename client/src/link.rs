//! Client side of the session connection.
//!
//! The link is a simple poll loop over one TCP stream: wait a bounded time
//! for the host to say something, apply at most one record, then report our
//! own position. Exactly one position goes out per iteration whether or not
//! anything arrived, so the host hears from us at least once per poll
//! interval. A record split across reads is collected over several
//! iterations and never holds up the next report.

use log::{debug, info, warn};
use shared::shutdown::ShutdownSignal;
use shared::wire::{self, Record, RecordBuffer, WireError};
use shared::{Position, MAX_PLAYERS};
use std::io;
use std::net::SocketAddrV4;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use thiserror::Error;
use tokio::io::AsyncReadExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::time::timeout;

#[derive(Debug, Error)]
pub enum LinkError {
    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: SocketAddrV4,
        #[source]
        source: io::Error,
    },
    #[error("connection to host failed: {0}")]
    Io(#[from] io::Error),
    #[error(transparent)]
    Wire(#[from] WireError),
}

/// Why a link stopped without an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkExit {
    Cancelled,
    HostClosed,
}

#[derive(Debug, Clone)]
pub struct LinkConfig {
    /// Longest wait for the host before sending our position anyway.
    pub poll_interval: Duration,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
        }
    }
}

/// Last known state of another player, as reported by the host.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PeerView {
    pub active: bool,
    pub position: Position,
}

#[derive(Debug, Default)]
struct ViewInner {
    local: Position,
    peers: [Option<PeerView>; MAX_PLAYERS],
    records_received: u64,
}

/// What this client knows about the session.
///
/// Shared between the frame loop, which moves the local boat, and the link,
/// which reports it and fills in peers. Cloning shares the same view.
#[derive(Debug, Clone, Default)]
pub struct ClientView {
    inner: Arc<Mutex<ViewInner>>,
}

impl ClientView {
    pub fn new(spawn: Position) -> Self {
        let view = Self::default();
        view.set_local_position(spawn);
        view
    }

    fn lock(&self) -> MutexGuard<'_, ViewInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn local_position(&self) -> Position {
        self.lock().local
    }

    pub fn set_local_position(&self, position: Position) {
        self.lock().local = position;
    }

    pub fn peer(&self, slot: usize) -> Option<PeerView> {
        self.lock().peers.get(slot).copied().flatten()
    }

    /// Every slot the host has told us about, in slot order.
    pub fn peers(&self) -> Vec<(usize, PeerView)> {
        self.lock()
            .peers
            .iter()
            .enumerate()
            .filter_map(|(slot, peer)| peer.map(|peer| (slot, peer)))
            .collect()
    }

    pub fn active_peer_count(&self) -> usize {
        self.lock().peers.iter().flatten().filter(|peer| peer.active).count()
    }

    pub fn records_received(&self) -> u64 {
        self.lock().records_received
    }

    /// Applies a record from the host.
    pub fn apply(&self, record: &Record) {
        let mut inner = self.lock();
        inner.records_received += 1;
        match *record {
            Record::Position(position) => {
                debug!("Host moved us to ({:.2}, {:.2}, {:.2})", position.x, position.y, position.z);
                inner.local = position;
            }
            Record::PeerState {
                slot,
                active,
                position,
            } => {
                if let Some(peer) = inner.peers.get_mut(usize::from(slot)) {
                    *peer = Some(PeerView { active, position });
                }
            }
        }
    }
}

pub struct ClientLink {
    reader: OwnedReadHalf,
    writer: OwnedWriteHalf,
    pending: RecordBuffer,
    view: ClientView,
    config: LinkConfig,
}

impl ClientLink {
    /// Connects to the host. A failed connect is final; nothing is retried.
    pub async fn connect(
        host: SocketAddrV4,
        view: ClientView,
        config: LinkConfig,
    ) -> Result<Self, LinkError> {
        let stream = TcpStream::connect(host)
            .await
            .map_err(|source| LinkError::Connect { addr: host, source })?;

        if let Err(e) = stream.set_nodelay(true) {
            debug!("Could not disable Nagle: {}", e);
        }
        info!("Connected to host at {}", host);

        let (read_half, write_half) = stream.into_split();
        Ok(Self {
            reader: read_half,
            writer: write_half,
            pending: RecordBuffer::new(),
            view,
            config,
        })
    }

    /// Runs the poll loop until the host goes away, a transport error
    /// occurs, or `shutdown` fires.
    pub async fn run(mut self, mut shutdown: ShutdownSignal) -> Result<LinkExit, LinkError> {
        let exit = self.poll_loop(&mut shutdown).await;
        match &exit {
            Ok(LinkExit::Cancelled) => info!("Leaving session"),
            Ok(LinkExit::HostClosed) => info!("Host closed the session"),
            Err(e) => warn!("Link to host failed: {}", e),
        }
        exit
    }

    async fn poll_loop(&mut self, shutdown: &mut ShutdownSignal) -> Result<LinkExit, LinkError> {
        loop {
            if shutdown.is_triggered() {
                return Ok(LinkExit::Cancelled);
            }

            // read is cancel safe, so losing either race drops no bytes.
            let read = tokio::select! {
                read = timeout(self.config.poll_interval, self.reader.read(self.pending.unfilled())) => read,
                _ = shutdown.triggered() => return Ok(LinkExit::Cancelled),
            };

            match read {
                Err(_elapsed) => {}
                Ok(Ok(0)) => {
                    if !self.pending.is_empty() {
                        warn!("Host closed the connection mid-record");
                    }
                    return Ok(LinkExit::HostClosed);
                }
                Ok(Ok(n)) => {
                    if let Some(bytes) = self.pending.advance(n) {
                        match wire::decode(&bytes) {
                            Ok(record) => self.view.apply(&record),
                            Err(e) => warn!("Dropping bad record from host: {}", e),
                        }
                    }
                }
                Ok(Err(e)) => return Err(e.into()),
            }

            let position = Record::Position(self.view.local_position());
            wire::write_record(&mut self.writer, &position).await?;
        }
    }
}
