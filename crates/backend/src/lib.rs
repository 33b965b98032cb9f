mod actor;

pub mod state;

pub mod application;
pub mod bus;
pub mod cancel;
pub mod coordinator;
pub mod engine;

mod domain;
pub use domain::{config, database};

pub mod dirs;

pub use actor::{
  handle::{MainHandle, SendError},
  message::{Action, AppEvent, MainMessage, OutcomeKind, UpdateAction, UpdateOutcome},
};
pub use application::{Application, ApplicationError, RuntimeConfig, run_primary};
pub use coordinator::{Coordinator, CoordinatorError, HeadlessOutcome};
pub use state::{ActionState, DatabaseState};
