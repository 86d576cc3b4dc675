//! Diagnostic lines captured for the caller of an action

use std::sync::{Arc, Mutex};

use shared::{process_debug, OutputLine, OutputStream, ProcessId};

/// Cheaply cloneable sink shared by every step of one action
#[derive(Debug, Clone, Default)]
pub struct ActionLog {
    lines: Arc<Mutex<Vec<OutputLine>>>,
}

impl ActionLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn out(&self, line: impl Into<String>) {
        self.push(OutputStream::Stdout, line.into());
    }

    pub fn err(&self, line: impl Into<String>) {
        self.push(OutputStream::Stderr, line.into());
    }

    /// Everything captured so far, in order
    pub fn lines(&self) -> Vec<OutputLine> {
        match self.lines.lock() {
            Ok(lines) => lines.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn text(&self) -> Vec<String> {
        self.lines().into_iter().map(|l| l.line).collect()
    }

    fn push(&self, stream: OutputStream, line: String) {
        process_debug!(ProcessId::current(), "[{:?}] {}", stream, line);
        let mut lines = match self.lines.lock() {
            Ok(lines) => lines,
            Err(poisoned) => poisoned.into_inner(),
        };
        lines.push(OutputLine { stream, line });
    }
}
