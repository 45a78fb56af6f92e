//! # Boat Battle Host Library
//!
//! This library implements the hosting side of a Boat Battle session. The
//! host owns the session: it accepts players over TCP, keeps the table of
//! every boat's position and health, and is the only party that resolves
//! combat.
//!
//! ## Core Responsibilities
//!
//! ### Session State
//! A fixed table of ten player slots behind a single mutex. The acceptor task
//! writes positions into it as they arrive; the frame loop reads them and
//! applies combat. Callers only ever get copies out.
//!
//! ### Connection Handling
//! One background task owns the listening socket and every client socket.
//! It waits on all of them at once with no timeout, places new players in
//! the lowest free slot, and frees a slot as soon as its connection closes.
//! Connections that arrive while the table is full are closed immediately.
//!
//! ### Combat
//! Once per frame the host's cannonballs move, every boat regenerates a
//! little health, and cannonballs within the hit radius of another boat deal
//! damage. A boat at zero health is sunk and stays sunk until its player
//! leaves.
//!
//! ### Peer Snapshots
//! On a fixed timer each client is sent the state of one other slot,
//! cycling through the table, so every player eventually sees every other
//! boat. Sessions started upload-only never send anything back.
//!
//! ## Module Organization
//!
//! ### Session Module (`session`)
//! The locked player table and session metadata.
//!
//! ### Acceptor Module (`acceptor`)
//! Listening socket setup and the readiness loop over all sockets.
//!
//! ### Hosting Module (`hosting`)
//! Starts and stops a whole session: slot reservation for the host, the
//! acceptor task, and cooperative shutdown.
//!
//! ### Combat Module (`combat`)
//! Cannonball movement, regeneration and hit detection.
//!
//! ### Game Module (`game`)
//! The headless frame loop and the autopilot that drives the host's boat.
//!
//! ### Utils Module (`utils`)
//! Port selection and the address shown to joining players.

pub mod acceptor;
pub mod combat;
pub mod game;
pub mod hosting;
pub mod session;
pub mod utils;

pub use acceptor::{AcceptorConfig, ConnectionAcceptor, HostError, PortChoice};
pub use combat::{CombatResolver, CombatRules, FrameReport};
pub use game::{Autopilot, HelmInput, HostGame};
pub use hosting::{HostConfig, HostSession, HOST_SLOT};
pub use session::{PlayerSnapshot, SessionState, SlotState};
