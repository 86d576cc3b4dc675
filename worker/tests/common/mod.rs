//! Common test utilities for the worker suites

#![allow(dead_code)]

pub mod fakes;
pub mod fixtures;

pub use fakes::{failed, ok, FakeInventory, RecordingDriver, RecordingExecutor, ScriptedPinger};
pub use fixtures::{Harness, TestFixtures};
