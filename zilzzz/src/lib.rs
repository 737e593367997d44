//! `Zilzzz`: reminder tasks kept in sync with a remote store, with local
//! notifications.

pub mod app;
pub mod clock;
pub mod config;
pub mod identity;
pub mod notify;
pub mod remote;
pub mod tasks;
