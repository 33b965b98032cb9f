//! CLI command implementations

mod remote;
mod run;
mod update;

pub use remote::{cmd_cancel_update, cmd_status};
pub use run::cmd_run;
pub use update::cmd_update_database;
