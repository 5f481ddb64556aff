//! Progress reporting and cooperative cancellation

use std::cell::RefCell;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Observer for run messages and a 0-100 progress value.
///
/// Purely observational; nothing reported here affects scoring.
pub trait ProgressSink {
    fn info(&self, message: &str);
    fn warn(&self, message: &str);
    fn error(&self, message: &str);
    fn set_progress(&self, percent: f64);
}

impl<T: ProgressSink + ?Sized> ProgressSink for &T {
    fn info(&self, message: &str) {
        (**self).info(message)
    }

    fn warn(&self, message: &str) {
        (**self).warn(message)
    }

    fn error(&self, message: &str) {
        (**self).error(message)
    }

    fn set_progress(&self, percent: f64) {
        (**self).set_progress(percent)
    }
}

/// Forwards everything to `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl ProgressSink for TracingSink {
    fn info(&self, message: &str) {
        info!("{}", message);
    }

    fn warn(&self, message: &str) {
        warn!("{}", message);
    }

    fn error(&self, message: &str) {
        error!("{}", message);
    }

    fn set_progress(&self, percent: f64) {
        tracing::debug!(progress = percent, "Progress {:.0}%", percent);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Info,
    Warn,
    Error,
}

/// Captures messages and progress values in memory
#[derive(Debug, Default)]
pub struct RecordingSink {
    messages: RefCell<Vec<(Level, String)>>,
    progress: RefCell<Vec<f64>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<(Level, String)> {
        self.messages.borrow().clone()
    }

    pub fn messages_at(&self, level: Level) -> Vec<String> {
        self.messages
            .borrow()
            .iter()
            .filter(|(l, _)| *l == level)
            .map(|(_, m)| m.clone())
            .collect()
    }

    pub fn progress(&self) -> Vec<f64> {
        self.progress.borrow().clone()
    }

    fn push(&self, level: Level, message: &str) {
        self.messages.borrow_mut().push((level, message.to_string()));
    }
}

impl ProgressSink for RecordingSink {
    fn info(&self, message: &str) {
        self.push(Level::Info, message);
    }

    fn warn(&self, message: &str) {
        self.push(Level::Warn, message);
    }

    fn error(&self, message: &str) {
        self.push(Level::Error, message);
    }

    fn set_progress(&self, percent: f64) {
        self.progress.borrow_mut().push(percent);
    }
}

/// Shared flag polled between candidates
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Linear progress over `[start, end]` for step `done` of `total`
pub fn band(start: f64, end: f64, done: usize, total: usize) -> f64 {
    if total == 0 {
        return end;
    }
    start + (end - start) * (done as f64 / total as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_sink() {
        let sink = RecordingSink::new();
        sink.info("Loading candidates");
        sink.warn("Feature 3 has no geometry");
        sink.set_progress(20.0);

        assert_eq!(sink.messages().len(), 2);
        assert_eq!(sink.messages_at(Level::Warn), vec!["Feature 3 has no geometry"]);
        assert_eq!(sink.progress(), vec![20.0]);
    }

    #[test]
    fn test_cancellation_is_shared() {
        let token = CancellationToken::new();
        let handle = token.clone();
        assert!(!token.is_cancelled());
        handle.cancel();
        assert!(token.is_cancelled());
    }

    #[test]
    fn test_band() {
        assert_eq!(band(20.0, 80.0, 0, 4), 20.0);
        assert_eq!(band(20.0, 80.0, 2, 4), 50.0);
        assert_eq!(band(20.0, 80.0, 4, 4), 80.0);
        assert_eq!(band(20.0, 80.0, 0, 0), 80.0);
    }
}
