//! Tests for coordinator services

pub mod snapshot_store;
