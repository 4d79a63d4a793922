//! Shared data model and wire protocol for `SyncBoard`.
//!
//! Both the client and the development hub depend on this crate so that the
//! positioning rules and envelope shapes exist in exactly one place.

pub mod board;
pub mod codec;
pub mod event;
pub mod model;
pub mod order;
