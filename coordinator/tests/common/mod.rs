//! Common test utilities for the coordinator suites

pub mod fixtures;
pub mod helpers;

pub use fixtures::TestFixtures;
pub use helpers::CoordinatorBuilder;
