//! # Boat Battle Client Library
//!
//! This library implements the joining side of a Boat Battle session. A
//! client connects to a host over TCP, keeps reporting where its boat is,
//! and collects whatever the host tells it about the other boats.
//!
//! ## Architecture Overview
//!
//! Two loops share one [`link::ClientView`]:
//!
//! ### The Link
//! Owns the TCP stream. Each iteration waits at most one poll interval for a
//! record from the host, applies it to the view, then sends the local boat's
//! position. A closed or failed stream ends the link; nothing reconnects.
//!
//! ### The Frame Loop
//! Moves the local boat at a fixed frame rate and writes the new position
//! into the view. It never touches the network, so a slow host cannot stall
//! a frame.
//!
//! Combat is resolved entirely on the host. The client never sends or
//! receives cannonball or health state.
//!
//! ## Module Organization
//!
//! ### Link Module (`link`)
//! Connection setup, the poll loop, and the shared view of the session.
//!
//! ### Game Module (`game`)
//! Client configuration and the headless frame loop.

pub mod game;
pub mod link;

pub use game::{ClientConfig, ClientGame};
pub use link::{ClientLink, ClientView, LinkConfig, LinkError, LinkExit, PeerView};
