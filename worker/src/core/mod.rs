//! Worker core logic: pure functions and in-process state

pub mod action_log;
pub mod identifier;
pub mod placement;

pub use action_log::ActionLog;
pub use identifier::{generate_candidate, is_reserved};
pub use placement::{best_cluster, best_datastore, pick_host};
