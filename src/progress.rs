// src/progress.rs

//! Pull progress reporting
//!
//! A pull drives one `PullProgress` implementation with running object and
//! byte counts. `ConsoleProgress` renders a terminal status line;
//! `SilentProgress` is for scripted callers and tests.

use indicatif::{ProgressBar, ProgressStyle};
use std::io::IsTerminal;

/// Snapshot of a pull in flight
#[derive(Debug, Clone, Default)]
pub struct PullState {
    pub fetched_objects: u64,
    pub transferred_bytes: u64,
}

/// Receiver for pull state updates
pub trait PullProgress {
    fn progress(&self, state: &PullState);
}

/// No-op progress receiver
#[derive(Debug, Default)]
pub struct SilentProgress;

impl PullProgress for SilentProgress {
    fn progress(&self, _state: &PullState) {}
}

/// Terminal status line, updated in place
pub struct ConsoleProgress {
    bar: ProgressBar,
}

impl ConsoleProgress {
    pub fn new() -> Self {
        let bar = ProgressBar::new_spinner();
        bar.set_style(
            ProgressStyle::with_template("{spinner} {msg}").expect("static progress template"),
        );
        Self { bar }
    }

    /// Console renderer when stdout is a terminal, silent otherwise
    pub fn for_stdout() -> Box<dyn PullProgress> {
        if std::io::stdout().is_terminal() {
            Box::new(ConsoleProgress::new())
        } else {
            Box::new(SilentProgress)
        }
    }
}

impl Default for ConsoleProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl PullProgress for ConsoleProgress {
    fn progress(&self, state: &PullState) {
        self.bar.set_message(format!(
            "Receiving objects: {} objects, {} bytes",
            state.fetched_objects, state.transferred_bytes
        ));
        self.bar.tick();
    }
}

impl Drop for ConsoleProgress {
    fn drop(&mut self) {
        self.bar.finish_and_clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_silent_progress_accepts_updates() {
        let progress = SilentProgress;
        progress.progress(&PullState {
            fetched_objects: 3,
            transferred_bytes: 1024,
        });
    }
}
