//! `Zilzzz` task store server library.
//!
//! Exposes the store server for use in tests and embedding. The server
//! accepts WebSocket connections, binds each to one owner, applies task
//! writes, and pushes a full snapshot of the owner's tasks to every
//! subscribed connection after each change.

pub mod config;
pub mod server;
pub mod store;
