//! Authoritative game server for capture-the-point field games.
//!
//! The server owns all game state. Capture-point devices and admin
//! dashboards connect over a WebSocket, send events, and receive the
//! authoritative state back; a periodic full-state push keeps every
//! client convergent even after missed messages.
//!
//! Module layout:
//! - [`game`]: the in-memory game state and its primitives
//! - [`state`]: the state manager, the single mutation authority
//! - [`identity`]: callsign allocation for capture-point devices
//! - [`scoring`]: score arithmetic for the capture bonus and the clock
//! - [`store`]: durable persistence with debounced writes
//! - [`broadcast`]: peer registry and message fan-out
//! - [`network`]: the HTTP/WebSocket surface
//! - [`config`]: runtime configuration

pub mod broadcast;
pub mod config;
pub mod game;
pub mod identity;
pub mod network;
pub mod scoring;
pub mod state;
pub mod store;
pub mod utils;
