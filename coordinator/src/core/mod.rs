//! Core business logic modules
//!
//! Pure state with no I/O dependencies; the event loop in `coordinator`
//! feeds it and performs the side effects.

pub mod state;

pub use state::{CoordinatorState, LedgerStats};
