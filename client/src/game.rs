//! Headless client frame loop.
//!
//! Sails the local boat straight out from its spawn point and writes each
//! new position into the shared view, where the link picks it up. Turns
//! around at the edge of the water.

use crate::link::{ClientView, LinkConfig};
use log::{debug, info};
use shared::shutdown::ShutdownSignal;
use shared::{Position, PLAYFIELD_HALF_EXTENT};
use std::net::{Ipv4Addr, SocketAddrV4};
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};

/// Units moved per frame.
pub const DRIFT_SPEED: f32 = 0.1;

/// Highest frame rate honoured; faster requests are clamped.
pub const MAX_FRAME_RATE: u32 = 1000;

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub host: SocketAddrV4,
    pub frame_rate: u32,
    pub spawn: Position,
    pub link: LinkConfig,
}

impl ClientConfig {
    pub fn new(host: Ipv4Addr, port: u16) -> Self {
        Self {
            host: SocketAddrV4::new(host, port),
            frame_rate: 60,
            spawn: Position::new(5.0, 0.0, 5.0),
            link: LinkConfig::default(),
        }
    }

    pub fn frame_interval(&self) -> Duration {
        Duration::from_secs(1) / self.frame_rate.clamp(1, MAX_FRAME_RATE)
    }
}

pub struct ClientGame {
    view: ClientView,
    bearing: Position,
    speed: f32,
    frame: u64,
}

impl ClientGame {
    /// Drifts away from the origin along the line through the current
    /// position, or along +x when starting at the origin.
    pub fn new(view: ClientView) -> Self {
        let start = view.local_position();
        let bearing = Position::new(start.x, 0.0, start.z).normalize();
        let bearing = if bearing.length() > 0.0 {
            bearing
        } else {
            Position::new(1.0, 0.0, 0.0)
        };

        Self {
            view,
            bearing,
            speed: DRIFT_SPEED,
            frame: 0,
        }
    }

    pub fn bearing(&self) -> Position {
        self.bearing
    }

    pub fn frame(&mut self) -> Position {
        let current = self.view.local_position();
        let mut next = current.add(&self.bearing.scale(self.speed));

        if !next.within_playfield(PLAYFIELD_HALF_EXTENT) {
            self.bearing = self.bearing.scale(-1.0);
            next = current.add(&self.bearing.scale(self.speed));
        }

        self.view.set_local_position(next);
        self.frame += 1;
        next
    }

    pub async fn run(mut self, frame_interval: Duration, mut shutdown: ShutdownSignal) {
        let frame_interval = frame_interval.max(Duration::from_secs(1) / MAX_FRAME_RATE);
        let mut timer = interval(frame_interval);
        timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let frames_per_second = (1.0 / frame_interval.as_secs_f32()).round().max(1.0) as u64;

        loop {
            tokio::select! {
                _ = timer.tick() => {}
                _ = shutdown.triggered() => break,
            }

            let position = self.frame();
            if self.frame % frames_per_second == 0 {
                self.log_view(position);
            }
        }

        info!("Client game loop stopped after {} frames", self.frame);
    }

    fn log_view(&self, position: Position) {
        info!(
            "Frame {}: at ({:.1}, {:.1}, {:.1}), {} other boats afloat",
            self.frame,
            position.x,
            position.y,
            position.z,
            self.view.active_peer_count(),
        );
        for (slot, peer) in self.view.peers() {
            debug!(
                "  slot {}: ({:.1}, {:.1}, {:.1}){}",
                slot,
                peer.position.x,
                peer.position.y,
                peer.position.z,
                if peer.active { "" } else { " (gone)" },
            );
        }
    }
}
