//! A running hosted session: shared state plus its acceptor task.

use crate::acceptor::{AcceptorConfig, ConnectionAcceptor, HostError, PortChoice};
use crate::session::SessionState;
use crate::utils;
use log::{debug, info};
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::task::JoinHandle;

/// The host always plays from the first slot.
pub const HOST_SLOT: usize = 0;

/// Highest frame or snapshot rate honoured; faster requests are clamped.
pub const MAX_RATE: u32 = 1000;

#[derive(Debug, Clone)]
pub struct HostConfig {
    pub acceptor: AcceptorConfig,
    /// Combat frames per second.
    pub frame_rate: u32,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            acceptor: AcceptorConfig::default(),
            frame_rate: 60,
        }
    }
}

impl HostConfig {
    pub fn with_port(mut self, port: u16) -> Self {
        self.acceptor.port = PortChoice::Fixed(port);
        self
    }

    /// Peer snapshots per second; `None` never sends anything to clients.
    pub fn with_snapshot_rate(mut self, rate: Option<u32>) -> Self {
        self.acceptor.snapshot_interval = rate
            .filter(|rate| *rate > 0)
            .map(|rate| Duration::from_secs(1) / rate.min(MAX_RATE));
        self
    }

    pub fn frame_interval(&self) -> Duration {
        Duration::from_secs(1) / self.frame_rate.clamp(1, MAX_RATE)
    }
}

pub struct HostSession {
    session: Arc<SessionState>,
    acceptor: Option<JoinHandle<()>>,
}

impl HostSession {
    /// Claims the host's slot, binds the listener and spawns the acceptor.
    pub async fn start(config: &HostConfig) -> Result<Self, HostError> {
        let session = Arc::new(SessionState::new(utils::advertised_address()));
        session.claim_slot(HOST_SLOT);
        session.start();

        let acceptor = ConnectionAcceptor::bind(Arc::clone(&session), &config.acceptor).await?;
        let handle = tokio::spawn(acceptor.run());

        if let Some(endpoint) = session.endpoint() {
            info!("Hosting session at {}", endpoint);
        }

        Ok(Self {
            session,
            acceptor: Some(handle),
        })
    }

    pub fn session(&self) -> &Arc<SessionState> {
        &self.session
    }

    pub fn endpoint(&self) -> Option<String> {
        self.session.endpoint()
    }

    pub fn port(&self) -> u16 {
        self.session.port()
    }

    pub fn is_running(&self) -> bool {
        self.session.is_running()
            && self
                .acceptor
                .as_ref()
                .is_some_and(|handle| !handle.is_finished())
    }

    /// Stops the session and waits for the acceptor to close every client.
    pub async fn shutdown(mut self) -> Result<(), HostError> {
        self.session.stop();

        // The acceptor only sees the flag once its wait returns.
        let wake = TcpStream::connect((Ipv4Addr::LOCALHOST, self.session.port())).await;
        if let Err(e) = &wake {
            debug!("Wake-up connection failed: {}", e);
        }

        if let Some(handle) = self.acceptor.take() {
            handle.await?;
        }
        drop(wake);

        info!("Session closed");
        Ok(())
    }
}

impl Drop for HostSession {
    fn drop(&mut self) {
        self.session.stop();
    }
}
