//! Headless host frame loop.
//!
//! Stands in for the host's presentation layer: an autopilot steers the
//! host boat, and every frame its position is written into the session
//! before combat is resolved.

use crate::combat::{CombatResolver, FrameReport};
use crate::hosting::{HOST_SLOT, MAX_RATE};
use crate::session::{PlayerSnapshot, SessionState};
use log::{debug, info};
use shared::shutdown::ShutdownSignal;
use shared::Position;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};

/// One frame of helm input for the local boat.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HelmInput {
    pub position: Position,
    pub facing: Position,
    pub fire: bool,
}

/// Sails a circle around the origin and shoots at the nearest boat.
#[derive(Debug, Clone)]
pub struct Autopilot {
    pub radius: f32,
    /// Radians per frame.
    pub turn_rate: f32,
    /// Frames between shots.
    pub fire_every: u64,
    /// Targets further than this are ignored.
    pub range: f32,
    frame: u64,
}

impl Default for Autopilot {
    fn default() -> Self {
        Self {
            radius: 20.0,
            turn_rate: 0.01,
            fire_every: 30,
            range: 60.0,
            frame: 0,
        }
    }
}

impl Autopilot {
    pub fn steer(&mut self, targets: &[PlayerSnapshot]) -> HelmInput {
        let angle = self.frame as f32 * self.turn_rate;
        let position = Position::new(self.radius * angle.cos(), 0.0, self.radius * angle.sin());
        // Tangent to the circle, direction of travel.
        let heading = Position::new(-angle.sin(), 0.0, angle.cos());

        let target = targets
            .iter()
            .filter(|t| t.slot != HOST_SLOT && t.active)
            .map(|t| (t.position.distance(&position), t.position))
            .filter(|(distance, _)| *distance <= self.range)
            .min_by(|a, b| a.0.total_cmp(&b.0));

        let on_cadence = self.fire_every > 0 && self.frame % self.fire_every == 0;
        let input = match target {
            Some((_, target)) => HelmInput {
                position,
                facing: target.sub(&position).normalize(),
                fire: on_cadence,
            },
            None => HelmInput {
                position,
                facing: heading,
                fire: false,
            },
        };

        self.frame += 1;
        input
    }
}

pub struct HostGame {
    session: Arc<SessionState>,
    combat: CombatResolver,
    autopilot: Autopilot,
    frame: u64,
}

impl HostGame {
    pub fn new(session: Arc<SessionState>) -> Self {
        Self {
            session,
            combat: CombatResolver::new(HOST_SLOT),
            autopilot: Autopilot::default(),
            frame: 0,
        }
    }

    pub fn with_combat(mut self, combat: CombatResolver) -> Self {
        self.combat = combat;
        self
    }

    pub fn with_autopilot(mut self, autopilot: Autopilot) -> Self {
        self.autopilot = autopilot;
        self
    }

    pub fn frame_count(&self) -> u64 {
        self.frame
    }

    /// Runs a single frame: steer, fire, resolve combat.
    pub fn frame(&mut self) -> FrameReport {
        let input = self.autopilot.steer(&self.session.snapshot());

        self.session.set_position(HOST_SLOT, input.position);
        if input.fire && self.combat.fire(&self.session, input.facing).is_some() {
            debug!("Host fired toward ({:.2}, {:.2})", input.facing.x, input.facing.z);
        }

        self.frame += 1;
        self.combat.step(&self.session)
    }

    /// Ticks frames at `frame_interval` until shutdown. Missed ticks are
    /// skipped rather than bunched up.
    pub async fn run(mut self, frame_interval: Duration, mut shutdown: ShutdownSignal) {
        let frame_interval = frame_interval.max(Duration::from_secs(1) / MAX_RATE);
        let mut timer = interval(frame_interval);
        timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let frames_per_second = (1.0 / frame_interval.as_secs_f32()).round().max(1.0) as u64;

        let mut totals = FrameReport::default();

        loop {
            tokio::select! {
                _ = timer.tick() => {}
                _ = shutdown.triggered() => break,
            }

            let report = self.frame();
            totals.hits += report.hits;
            totals.kills += report.kills;
            totals.expired += report.expired;

            if self.frame % frames_per_second == 0 {
                self.log_summary(&totals);
            }
        }

        info!("Host game loop stopped after {} frames", self.frame);
    }

    fn log_summary(&self, totals: &FrameReport) {
        let players = self.session.snapshot();
        let host_health = self.session.health(HOST_SLOT).unwrap_or(0);
        let in_flight: usize = players.iter().map(|p| p.cannonballs_in_flight).sum();

        info!(
            "Frame {}: {} boats afloat, host health {}, {} cannonballs in flight, {} hits / {} sunk so far",
            self.frame,
            self.session.active_count(),
            host_health,
            in_flight,
            totals.hits,
            totals.kills,
        );

        for player in players.iter().filter(|p| p.slot != HOST_SLOT) {
            debug!(
                "  slot {}: ({:.1}, {:.1}, {:.1}) health {}{}",
                player.slot,
                player.position.x,
                player.position.y,
                player.position.z,
                player.health,
                if player.active { "" } else { " (sunk)" },
            );
        }
    }
}
