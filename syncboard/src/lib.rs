//! `SyncBoard`: real-time synchronization core for collaborative kanban
//! boards.
//!
//! The pieces, leaves first:
//! - [`transport`]: duplex text links (WebSocket, or in-process loopback)
//! - [`dispatch`]: fan-out of decoded server events to handlers
//! - [`connection`]: session lifecycle with reconnect and backoff
//! - [`store`]: the board, mutated by remote events and local actions alike
//! - [`presence`]: who else is here and where their cursors are
//! - [`sync`]: handlers wiring events into the store and presence tracker
//! - [`api`] / [`actions`]: optimistic local mutations persisted over REST
//! - [`client`]: a facade owning one of each

pub mod actions;
pub mod api;
pub mod client;
pub mod config;
pub mod connection;
pub mod dispatch;
pub mod presence;
pub mod store;
pub mod sync;
pub mod transport;
