//! Provisioning worker library
//!
//! Places new virtual machines on clusters, hands out collision-free MAC and
//! IP addresses, repairs half-provisioned network interfaces and sequences the
//! whole creation flow. Cluster capacity comes from the coordinator's ledger;
//! address uniqueness is enforced through the inventory's lock protocol.

pub mod actions;
pub mod config;
pub mod core;
pub mod error;
pub mod services;
pub mod traits;
pub mod types;

pub use actions::{ActionDispatcher, ActionServer};
pub use config::Catalog;
pub use core::ActionLog;
pub use error::{ProvisionError, ProvisionResult};
pub use traits::*;
pub use types::*;
