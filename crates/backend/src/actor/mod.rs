//! Update scheduling primitives
//!
//! Engine work runs on one dedicated worker thread; everything observable
//! flows back to the main context as [`message::MainMessage`]s.
//!
//! # Components
//!
//! - [`UpdateScheduler`]: owns the worker thread and the FIFO request queue
//! - [`AutoUpdateTimer`]: posts `Activate(UpdateDatabase)` periodically
//! - [`handle::MainHandle`]: cloneable sender for the main queue
//!
//! ```text
//! Timer / bus / user ──> Application::activate_action
//!                              │ submit
//!                              v
//!                     UpdateScheduler ──> worker thread (engine.scan / load)
//!                                                │ MainMessage::{Event, Finished}
//!                                                v
//!                                          main queue ──> Application::dispatch
//! ```

pub mod handle;
pub mod message;
mod scheduler;
mod timer;
mod worker;

#[cfg(test)]
pub(crate) mod __tests__;

pub use scheduler::{SchedulerError, UpdateScheduler};
pub use timer::AutoUpdateTimer;
