//! Domain types - configuration and database snapshots
//!
//! These types are independent of threading, IPC, or the engine that fills
//! a snapshot.

pub mod config;
pub mod database;
