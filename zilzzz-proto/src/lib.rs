//! Shared task model and wire protocol for `Zilzzz`.

pub mod codec;
pub mod store;
pub mod task;
