//! Host-side combat resolution.
//!
//! Only the host resolves combat. Once per frame the resolver moves the
//! local player's cannonballs, lets the local boat regenerate, and then
//! checks the remaining cannonballs against every other active boat. Remote
//! boats never regenerate here, so damage dealt to them sticks. The whole
//! frame is one batch under the session lock.

use crate::session::{SessionState, Slot};
use log::info;
use shared::{
    Position, CANNONBALL_DAMAGE, CANNONBALL_SPEED, HEALTH_REGEN_PER_FRAME, HIT_RADIUS,
    MAX_CANNONBALLS, MAX_PLAYERS, PLAYFIELD_HALF_EXTENT,
};

/// Tunables for one frame of combat.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CombatRules {
    pub cannonball_speed: f32,
    pub playfield_half_extent: f32,
    pub hit_radius: f32,
    pub damage: i32,
    pub regen_per_frame: i32,
}

impl Default for CombatRules {
    fn default() -> Self {
        Self {
            cannonball_speed: CANNONBALL_SPEED,
            playfield_half_extent: PLAYFIELD_HALF_EXTENT,
            hit_radius: HIT_RADIUS,
            damage: CANNONBALL_DAMAGE,
            regen_per_frame: HEALTH_REGEN_PER_FRAME,
        }
    }
}

/// What happened during one frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameReport {
    pub hits: usize,
    pub kills: usize,
    /// Cannonballs that left the playfield.
    pub expired: usize,
}

pub struct CombatResolver {
    local_slot: usize,
    rules: CombatRules,
}

impl CombatResolver {
    pub fn new(local_slot: usize) -> Self {
        Self::with_rules(local_slot, CombatRules::default())
    }

    pub fn with_rules(local_slot: usize, rules: CombatRules) -> Self {
        Self { local_slot, rules }
    }

    /// Fire command from the local player. A full pool makes this a no-op.
    pub fn fire(&self, session: &SessionState, direction: Position) -> Option<usize> {
        session.fire(self.local_slot, direction)
    }

    /// Runs one frame of combat against the session.
    pub fn step(&self, session: &SessionState) -> FrameReport {
        session.with_slots(|slots| self.resolve(slots))
    }

    fn resolve(&self, slots: &mut [Slot; MAX_PLAYERS]) -> FrameReport {
        let mut report = FrameReport::default();
        let Some(local) = slots.get_mut(self.local_slot) else {
            return report;
        };

        report.expired = local.player.cannonballs.advance(
            self.rules.cannonball_speed,
            self.rules.playfield_half_extent,
        );

        local.player.regenerate(self.rules.regen_per_frame);

        // Taken out so the other slots can be borrowed mutably while checking.
        let mut pool = std::mem::take(&mut slots[self.local_slot].player.cannonballs);

        for (index, slot) in slots.iter_mut().enumerate() {
            if index == self.local_slot || !slot.player.active {
                continue;
            }

            let target = slot.player.position;
            for ball_index in 0..MAX_CANNONBALLS {
                let in_range = pool.get(ball_index).is_some_and(|ball| {
                    ball.active && ball.position.distance(&target) < self.rules.hit_radius
                });
                if !in_range {
                    continue;
                }

                pool.deactivate(ball_index);
                report.hits += 1;
                if slot.player.apply_damage(self.rules.damage) {
                    report.kills += 1;
                    info!("Slot {} sunk by slot {}", index, self.local_slot);
                    break;
                }
            }
        }

        slots[self.local_slot].player.cannonballs = pool;
        report
    }
}
