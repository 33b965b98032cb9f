pub mod helpers;

mod handoff;
mod scheduling;
