//! Types and rules shared by the host and the client.
//!
//! Everything in here is plain data: positions, the per-player cannonball
//! pool, the player slot itself and the game constants both sides agree on.
//! The wire codec lives in [`wire`] and the cooperative shutdown signal used
//! by the long-running loops lives in [`shutdown`].

use serde::{Deserialize, Serialize};

pub mod shutdown;
pub mod wire;

/// Number of player slots in a session.
pub const MAX_PLAYERS: usize = 10;
/// Cannonballs a single player can have in flight.
pub const MAX_CANNONBALLS: usize = 50;
pub const MAX_HEALTH: i32 = 100;
pub const CANNONBALL_DAMAGE: i32 = 20;
/// Health an active player regains every frame.
pub const HEALTH_REGEN_PER_FRAME: i32 = 1;
/// Distance a cannonball travels per frame.
pub const CANNONBALL_SPEED: f32 = 0.2;
/// A cannonball closer than this to a boat counts as a hit.
pub const HIT_RADIUS: f32 = 1.0;
/// Side length of the square water plane centred on the origin.
pub const WATER_SIZE: f32 = 400.0;
pub const PLAYFIELD_HALF_EXTENT: f32 = WATER_SIZE / 2.0;
/// Ports a host picks from when no fixed port is requested.
pub const PORT_RANGE: std::ops::Range<u16> = 1024..65535;

/// A point or direction in world space.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Position {
    pub const ZERO: Position = Position {
        x: 0.0,
        y: 0.0,
        z: 0.0,
    };

    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    pub fn add(&self, other: &Position) -> Position {
        Position::new(self.x + other.x, self.y + other.y, self.z + other.z)
    }

    pub fn sub(&self, other: &Position) -> Position {
        Position::new(self.x - other.x, self.y - other.y, self.z - other.z)
    }

    pub fn scale(&self, scalar: f32) -> Position {
        Position::new(self.x * scalar, self.y * scalar, self.z * scalar)
    }

    pub fn length(&self) -> f32 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }

    pub fn distance(&self, other: &Position) -> f32 {
        self.sub(other).length()
    }

    /// Returns the unit vector pointing the same way, or zero for a zero vector.
    pub fn normalize(&self) -> Position {
        let len = self.length();
        if len == 0.0 {
            Position::ZERO
        } else {
            self.scale(1.0 / len)
        }
    }

    /// True while x and z both lie within `[-half_extent, half_extent]`.
    pub fn within_playfield(&self, half_extent: f32) -> bool {
        (-half_extent..=half_extent).contains(&self.x)
            && (-half_extent..=half_extent).contains(&self.z)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Cannonball {
    pub position: Position,
    /// Unit vector, fixed for the lifetime of the shot.
    pub direction: Position,
    pub active: bool,
}

/// Fixed-capacity arena of cannonballs.
///
/// Indices are stable: a shot keeps its index until it is deactivated, after
/// which the slot is handed out again by [`CannonballPool::fire`].
#[derive(Debug, Clone, PartialEq)]
pub struct CannonballPool {
    balls: [Cannonball; MAX_CANNONBALLS],
}

impl Default for CannonballPool {
    fn default() -> Self {
        Self::new()
    }
}

impl CannonballPool {
    pub fn new() -> Self {
        Self {
            balls: [Cannonball::default(); MAX_CANNONBALLS],
        }
    }

    /// Activates the first free cannonball at `origin` heading along `direction`.
    ///
    /// Returns the index used, or `None` when the pool is full or the
    /// direction has no length.
    pub fn fire(&mut self, origin: Position, direction: Position) -> Option<usize> {
        let direction = direction.normalize();
        if direction == Position::ZERO {
            return None;
        }

        let (index, ball) = self.balls.iter_mut().enumerate().find(|(_, b)| !b.active)?;
        *ball = Cannonball {
            position: origin,
            direction,
            active: true,
        };
        Some(index)
    }

    /// Moves every active cannonball one step and retires the ones that left
    /// the playfield. Returns how many were retired.
    pub fn advance(&mut self, speed: f32, half_extent: f32) -> usize {
        let mut retired = 0;
        for ball in self.balls.iter_mut().filter(|b| b.active) {
            ball.position = ball.position.add(&ball.direction.scale(speed));
            if !ball.position.within_playfield(half_extent) {
                ball.active = false;
                retired += 1;
            }
        }
        retired
    }

    pub fn deactivate(&mut self, index: usize) {
        if let Some(ball) = self.balls.get_mut(index) {
            ball.active = false;
        }
    }

    pub fn clear(&mut self) {
        for ball in &mut self.balls {
            ball.active = false;
        }
    }

    pub fn get(&self, index: usize) -> Option<&Cannonball> {
        self.balls.get(index)
    }

    pub fn iter_active(&self) -> impl Iterator<Item = (usize, &Cannonball)> {
        self.balls.iter().enumerate().filter(|(_, b)| b.active)
    }

    pub fn active_count(&self) -> usize {
        self.balls.iter().filter(|b| b.active).count()
    }

    pub fn is_full(&self) -> bool {
        self.balls.iter().all(|b| b.active)
    }
}

/// One entry of the player table.
#[derive(Debug, Clone, PartialEq)]
pub struct Player {
    pub position: Position,
    /// Always within `0..=MAX_HEALTH`.
    pub health: i32,
    pub active: bool,
    pub cannonballs: CannonballPool,
}

impl Default for Player {
    fn default() -> Self {
        Self::new()
    }
}

impl Player {
    /// An inactive player at the origin with full health and no shots in flight.
    pub fn new() -> Self {
        Self {
            position: Position::ZERO,
            health: MAX_HEALTH,
            active: false,
            cannonballs: CannonballPool::new(),
        }
    }

    /// Puts the player back into its initial state, keeping nothing from the
    /// previous occupant of the slot.
    pub fn reset(&mut self) {
        *self = Player::new();
    }

    /// Applies `amount` damage. Returns true if this hit sank the boat.
    ///
    /// Inactive players take no damage.
    pub fn apply_damage(&mut self, amount: i32) -> bool {
        if !self.active {
            return false;
        }

        self.health = (self.health - amount).clamp(0, MAX_HEALTH);
        if self.health == 0 {
            self.active = false;
            return true;
        }
        false
    }

    /// Restores up to `amount` health to an active, damaged player.
    pub fn regenerate(&mut self, amount: i32) -> bool {
        if self.active && self.health < MAX_HEALTH {
            self.health = (self.health + amount).clamp(0, MAX_HEALTH);
            return true;
        }
        false
    }
}
