//! Shared session state for a hosted game
//!
//! The session owns the player table and the session metadata (running flag,
//! bound port, advertised address). It is shared between the connection
//! acceptor task and the host's frame loop, so every access goes through a
//! single mutex:
//! - callers only ever see copies of player data, never references into the table
//! - each accessor holds the lock for one field update or one small batch
//! - nothing blocks on I/O while the lock is held
//!
//! Slot indices are the only player identity. A slot is handed out when a
//! connection is accepted and stays with that connection until it closes.

use log::debug;
use shared::{Player, Position, MAX_PLAYERS};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// One entry of the player table.
///
/// `occupied` belongs to the connection, `player.active` to the game: a boat
/// sunk in combat stays in its slot until its connection goes away.
#[derive(Debug, Clone, Default)]
pub(crate) struct Slot {
    pub occupied: bool,
    pub player: Player,
}

/// Copy of one slot as seen at a single lock acquisition.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SlotState {
    pub occupied: bool,
    pub active: bool,
    pub position: Position,
}

/// Copy of an occupied slot, for presentation and logging.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerSnapshot {
    pub slot: usize,
    pub position: Position,
    pub health: i32,
    pub active: bool,
    pub cannonballs_in_flight: usize,
}

struct SessionInner {
    running: bool,
    port: u16,
    advertised_addr: String,
    slots: [Slot; MAX_PLAYERS],
}

/// Lock-protected player table plus session metadata
pub struct SessionState {
    inner: Mutex<SessionInner>,
}

impl SessionState {
    /// Creates a stopped session with every slot free, at full health and
    /// with no cannonballs in flight.
    pub fn new(advertised_addr: impl Into<String>) -> Self {
        Self {
            inner: Mutex::new(SessionInner {
                running: false,
                port: 0,
                advertised_addr: advertised_addr.into(),
                slots: std::array::from_fn(|_| Slot::default()),
            }),
        }
    }

    // The table is plain data and stays valid after every individual
    // mutation, so a panic elsewhere does not make it unusable.
    fn lock(&self) -> MutexGuard<'_, SessionInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn start(&self) {
        self.lock().running = true;
    }

    pub fn stop(&self) {
        self.lock().running = false;
    }

    pub fn is_running(&self) -> bool {
        self.lock().running
    }

    pub fn set_port(&self, port: u16) {
        self.lock().port = port;
    }

    /// Bound port, or 0 before the listener is up.
    pub fn port(&self) -> u16 {
        self.lock().port
    }

    pub fn advertised_addr(&self) -> String {
        self.lock().advertised_addr.clone()
    }

    /// `ip:port` to hand to joining players, once a port is bound.
    pub fn endpoint(&self) -> Option<String> {
        let inner = self.lock();
        if inner.port == 0 {
            return None;
        }
        Some(format!("{}:{}", inner.advertised_addr, inner.port))
    }

    /// Takes the lowest-numbered free slot for a new connection.
    ///
    /// The slot is reset, marked occupied and active. Returns `None` when all
    /// slots are taken.
    pub fn allocate_slot(&self) -> Option<usize> {
        let mut inner = self.lock();
        let index = inner.slots.iter().position(|slot| !slot.occupied)?;
        Self::occupy(&mut inner.slots[index]);
        Some(index)
    }

    /// Takes a specific slot, used for the host's own boat.
    ///
    /// Returns false if the index is out of range or already taken.
    pub fn claim_slot(&self, index: usize) -> bool {
        let mut inner = self.lock();
        match inner.slots.get_mut(index) {
            Some(slot) if !slot.occupied => {
                Self::occupy(slot);
                true
            }
            _ => false,
        }
    }

    fn occupy(slot: &mut Slot) {
        slot.player.reset();
        slot.player.active = true;
        slot.occupied = true;
    }

    /// Releases a slot after its connection has gone away.
    pub fn free_slot(&self, index: usize) {
        let mut inner = self.lock();
        if let Some(slot) = inner.slots.get_mut(index) {
            slot.occupied = false;
            slot.player.active = false;
            slot.player.cannonballs.clear();
            debug!("Slot {} freed", index);
        }
    }

    /// Overwrites the position of an occupied slot. Returns false otherwise.
    pub fn set_position(&self, index: usize, position: Position) -> bool {
        let mut inner = self.lock();
        match inner.slots.get_mut(index) {
            Some(slot) if slot.occupied => {
                slot.player.position = position;
                true
            }
            _ => false,
        }
    }

    pub fn position(&self, index: usize) -> Option<Position> {
        self.lock().slots.get(index).map(|slot| slot.player.position)
    }

    pub fn health(&self, index: usize) -> Option<i32> {
        self.lock().slots.get(index).map(|slot| slot.player.health)
    }

    pub fn is_active(&self, index: usize) -> bool {
        self.lock()
            .slots
            .get(index)
            .is_some_and(|slot| slot.player.active)
    }

    pub fn is_occupied(&self, index: usize) -> bool {
        self.lock().slots.get(index).is_some_and(|slot| slot.occupied)
    }

    pub fn active_count(&self) -> usize {
        self.lock()
            .slots
            .iter()
            .filter(|slot| slot.player.active)
            .count()
    }

    pub fn occupied_count(&self) -> usize {
        self.lock().slots.iter().filter(|slot| slot.occupied).count()
    }

    /// A copy of the player in `index`.
    pub fn player(&self, index: usize) -> Option<Player> {
        self.lock().slots.get(index).map(|slot| slot.player.clone())
    }

    /// Copies of every occupied slot, in slot order.
    pub fn snapshot(&self) -> Vec<PlayerSnapshot> {
        self.lock()
            .slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.occupied)
            .map(|(index, slot)| PlayerSnapshot {
                slot: index,
                position: slot.player.position,
                health: slot.player.health,
                active: slot.player.active,
                cannonballs_in_flight: slot.player.cannonballs.active_count(),
            })
            .collect()
    }

    /// Occupancy, liveness and position of every slot from one lock hold.
    pub fn slot_states(&self) -> [SlotState; MAX_PLAYERS] {
        let inner = self.lock();
        std::array::from_fn(|index| {
            let slot = &inner.slots[index];
            SlotState {
                occupied: slot.occupied,
                active: slot.player.active,
                position: slot.player.position,
            }
        })
    }

    /// Launches a cannonball from the player in `index` along `direction`.
    ///
    /// Sunk players cannot fire. Returns the pool index used, or `None` when
    /// the shot was not fired.
    pub fn fire(&self, index: usize, direction: Position) -> Option<usize> {
        let mut inner = self.lock();
        let player = &mut inner.slots.get_mut(index)?.player;
        if !player.active {
            return None;
        }
        let origin = player.position;
        let fired = player.cannonballs.fire(origin, direction);
        if let Some(ball) = fired {
            debug!("Slot {} fired cannonball {}", index, ball);
        }
        fired
    }

    /// Runs `f` over the whole table under one lock hold.
    pub(crate) fn with_slots<R>(&self, f: impl FnOnce(&mut [Slot; MAX_PLAYERS]) -> R) -> R {
        f(&mut self.lock().slots)
    }
}
