//! Tests for worker services

pub mod placement_selector;
