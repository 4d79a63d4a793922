//! `SyncBoard` development hub library.
//!
//! Serves the board REST API and the real-time WebSocket endpoint from one
//! in-memory process. Exposed as a library for tests and embedding.

pub mod config;
pub mod rest;
pub mod rooms;
pub mod server;
pub mod store;
