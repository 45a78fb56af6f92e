//! Host network loop: accepts players and ingests their positions
//!
//! A single task owns the listening socket and every client socket. Each
//! iteration it waits, without a timeout, until at least one of them is
//! readable (or the snapshot timer fires), then services everything that is
//! ready:
//! - a readable listener yields one new connection, placed in the lowest free slot
//! - a readable client yields at most one position record
//! - a snapshot tick sends every client one peer record
//!
//! The loop checks the session's `running` flag between waits, so stopping
//! a session takes effect at the next socket event.

use crate::session::SessionState;
use crate::utils;
use log::{debug, error, info, warn};
use shared::wire::{self, Record, RecordBuffer, WireError, RECORD_SIZE};
use shared::MAX_PLAYERS;
use std::future::poll_fn;
use std::io;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::task::Poll;
use std::time::Duration;
use thiserror::Error;
use tokio::net::{TcpListener, TcpSocket, TcpStream};
use tokio::time::{interval, Interval, MissedTickBehavior};

/// Pending connections the kernel queues for us.
pub const LISTEN_BACKLOG: u32 = 3;

/// Shortest snapshot period; shorter requests are clamped.
pub const MIN_SNAPSHOT_INTERVAL: Duration = Duration::from_millis(1);

#[derive(Debug, Error)]
pub enum HostError {
    #[error("failed to listen on port {port}: {source}")]
    Bind {
        port: u16,
        #[source]
        source: io::Error,
    },
    #[error("acceptor task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortChoice {
    /// Any port in [`shared::PORT_RANGE`].
    Random,
    /// A specific port; 0 lets the OS pick.
    Fixed(u16),
}

#[derive(Debug, Clone)]
pub struct AcceptorConfig {
    pub port: PortChoice,
    /// Period between peer snapshots, `None` for upload-only sessions.
    pub snapshot_interval: Option<Duration>,
}

impl Default for AcceptorConfig {
    fn default() -> Self {
        Self {
            port: PortChoice::Random,
            snapshot_interval: Some(Duration::from_secs(1) / 30),
        }
    }
}

/// A connected client and the record it is part-way through sending.
struct ClientConn {
    stream: TcpStream,
    addr: SocketAddr,
    pending: RecordBuffer,
    next_peer: usize,
}

enum ReadOutcome {
    Nothing,
    Record(Result<Record, WireError>),
    Closed(String),
}

impl ClientConn {
    fn new(stream: TcpStream, addr: SocketAddr) -> Self {
        Self {
            stream,
            addr,
            pending: RecordBuffer::new(),
            next_peer: 0,
        }
    }

    /// Reads whatever is available of the current record without blocking.
    fn read_available(&mut self) -> ReadOutcome {
        match self.stream.try_read(self.pending.unfilled()) {
            Ok(0) => ReadOutcome::Closed("connection closed by peer".to_string()),
            Ok(n) => match self.pending.advance(n) {
                Some(bytes) => ReadOutcome::Record(wire::decode(&bytes)),
                None => ReadOutcome::Nothing,
            },
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => ReadOutcome::Nothing,
            Err(e) => ReadOutcome::Closed(e.to_string()),
        }
    }

    /// Sends one record without blocking. Returns false if the socket buffer
    /// is full and the record was skipped.
    fn try_send(&self, record: &Record) -> Result<bool, WireError> {
        let bytes = wire::encode(record)?;
        match self.stream.try_write(&bytes) {
            Ok(n) if n == RECORD_SIZE => Ok(true),
            Ok(n) => Err(io::Error::new(
                io::ErrorKind::WriteZero,
                format!("short write of {} bytes", n),
            )
            .into()),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

/// Next slot to report to a client, skipping its own.
fn rotate_peer(cursor: &mut usize, own_slot: usize) -> usize {
    let mut peer = *cursor;
    if peer == own_slot {
        peer = (peer + 1) % MAX_PLAYERS;
    }
    *cursor = (peer + 1) % MAX_PLAYERS;
    peer
}

/// Everything that became ready during one wait.
#[derive(Default)]
struct Readiness {
    accepted: Option<io::Result<(TcpStream, SocketAddr)>>,
    readable: [bool; MAX_PLAYERS],
    snapshot_due: bool,
}

impl Readiness {
    fn is_empty(&self) -> bool {
        self.accepted.is_none() && !self.snapshot_due && !self.readable.contains(&true)
    }
}

pub struct ConnectionAcceptor {
    session: Arc<SessionState>,
    listener: TcpListener,
    clients: [Option<ClientConn>; MAX_PLAYERS],
    snapshot_timer: Option<Interval>,
}

impl ConnectionAcceptor {
    /// Binds the listening socket on all interfaces and records the port in
    /// the session.
    ///
    /// Failing to bind is fatal to hosting: the session is stopped and the
    /// error returned. There is no retry on another port.
    pub async fn bind(session: Arc<SessionState>, config: &AcceptorConfig) -> Result<Self, HostError> {
        let port = match config.port {
            PortChoice::Random => utils::random_port(),
            PortChoice::Fixed(port) => port,
        };

        let listener = match Self::listen(port) {
            Ok(listener) => listener,
            Err(source) => {
                session.stop();
                error!("Failed to listen on port {}: {}", port, source);
                return Err(HostError::Bind { port, source });
            }
        };

        let bound_port = listener.local_addr().map(|a| a.port()).unwrap_or(port);
        session.set_port(bound_port);
        info!("Listening on 0.0.0.0:{}", bound_port);

        let snapshot_timer = config.snapshot_interval.map(|period| {
            let mut timer = interval(period.max(MIN_SNAPSHOT_INTERVAL));
            timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
            timer
        });

        Ok(Self {
            session,
            listener,
            clients: std::array::from_fn(|_| None),
            snapshot_timer,
        })
    }

    fn listen(port: u16) -> io::Result<TcpListener> {
        let socket = TcpSocket::new_v4()?;
        socket.bind(SocketAddr::from((Ipv4Addr::UNSPECIFIED, port)))?;
        socket.listen(LISTEN_BACKLOG)
    }

    pub fn local_port(&self) -> u16 {
        self.session.port()
    }

    /// Runs until the session stops running, then closes every client.
    pub async fn run(mut self) {
        info!("Connection acceptor started");

        loop {
            if !self.session.is_running() {
                break;
            }

            let ready = self.wait_for_readiness().await;

            if !self.session.is_running() {
                break;
            }

            if let Some(accepted) = ready.accepted {
                self.handle_accept(accepted);
            }

            for slot in 0..MAX_PLAYERS {
                if ready.readable[slot] {
                    self.service_client(slot);
                }
            }

            if ready.snapshot_due {
                self.send_snapshots();
            }
        }

        self.close_all();
        info!("Connection acceptor stopped");
    }

    /// Waits until the listener, any client socket, or the snapshot timer is
    /// ready. Never times out on its own.
    async fn wait_for_readiness(&mut self) -> Readiness {
        let listener = &self.listener;
        let clients = &self.clients;
        let snapshot_timer = &mut self.snapshot_timer;

        poll_fn(|cx| {
            let mut ready = Readiness::default();

            if let Poll::Ready(result) = listener.poll_accept(cx) {
                ready.accepted = Some(result);
            }

            for (slot, conn) in clients.iter().enumerate() {
                if let Some(conn) = conn {
                    // An error here surfaces again on the read, which closes the slot.
                    ready.readable[slot] = conn.stream.poll_read_ready(cx).is_ready();
                }
            }

            if let Some(timer) = snapshot_timer.as_mut() {
                ready.snapshot_due = timer.poll_tick(cx).is_ready();
            }

            if ready.is_empty() {
                Poll::Pending
            } else {
                Poll::Ready(ready)
            }
        })
        .await
    }

    fn handle_accept(&mut self, accepted: io::Result<(TcpStream, SocketAddr)>) {
        let (stream, addr) = match accepted {
            Ok(connection) => connection,
            Err(e) => {
                warn!("Failed to accept connection: {}", e);
                return;
            }
        };

        if let Err(e) = stream.set_nodelay(true) {
            debug!("Could not disable Nagle for {}: {}", addr, e);
        }

        match self.session.allocate_slot() {
            Some(slot) => {
                info!("Player from {} joined in slot {}", addr, slot);
                self.clients[slot] = Some(ClientConn::new(stream, addr));
            }
            None => {
                // Closed right away rather than left open and never read.
                warn!("Session full, dropping connection from {}", addr);
            }
        }
    }

    fn service_client(&mut self, slot: usize) {
        let outcome = match self.clients[slot].as_mut() {
            Some(conn) => conn.read_available(),
            None => return,
        };

        match outcome {
            ReadOutcome::Nothing => {}
            ReadOutcome::Record(Ok(Record::Position(position))) => {
                self.session.set_position(slot, position);
                debug!("Slot {} at ({:.2}, {:.2}, {:.2})", slot, position.x, position.y, position.z);
            }
            ReadOutcome::Record(Ok(other)) => {
                warn!("Ignoring unexpected record from slot {}: {:?}", slot, other);
            }
            ReadOutcome::Record(Err(e)) => {
                warn!("Dropping malformed record from slot {}: {}", slot, e);
            }
            ReadOutcome::Closed(reason) => self.disconnect(slot, &reason),
        }
    }

    /// Sends each client the state of one other slot, round-robin.
    fn send_snapshots(&mut self) {
        let states = self.session.slot_states();
        let mut broken = Vec::new();

        for (slot, entry) in self.clients.iter_mut().enumerate() {
            let Some(conn) = entry else {
                continue;
            };

            let peer = rotate_peer(&mut conn.next_peer, slot);
            let state = states[peer];
            let record = Record::PeerState {
                slot: peer as u8,
                active: state.occupied && state.active,
                position: state.position,
            };

            match conn.try_send(&record) {
                Ok(true) => {}
                Ok(false) => debug!("Slot {} is not keeping up, skipped a snapshot", slot),
                Err(e) => broken.push((slot, e.to_string())),
            }
        }

        for (slot, reason) in broken {
            self.disconnect(slot, &reason);
        }
    }

    fn disconnect(&mut self, slot: usize, reason: &str) {
        if let Some(conn) = self.clients[slot].take() {
            info!("Player from {} left slot {} ({})", conn.addr, slot, reason);
            self.session.free_slot(slot);
        }
    }

    fn close_all(&mut self) {
        for slot in 0..MAX_PLAYERS {
            self.disconnect(slot, "session ended");
        }
    }
}
