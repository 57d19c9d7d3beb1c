//! Serialised access to the global test logger.

use std::sync::{Mutex, MutexGuard, OnceLock};

use log::Level;
use logtest::{Logger, Record};
use rstest::fixture;

/// Handle to the global logger with exclusive access.
///
/// `log` allows one global logger per process, so every test capturing log
/// output goes through this guard and never sees another test's records.
/// Records left over from a previous holder are discarded on acquisition.
pub struct LoggerHandle {
    guard: MutexGuard<'static, Logger>,
}

impl LoggerHandle {
    /// Acquire the global [`Logger`] instance.
    ///
    /// # Panics
    ///
    /// Panics if a previous holder panicked while holding the logger.
    #[must_use]
    pub fn new() -> Self {
        static LOGGER: OnceLock<Mutex<Logger>> = OnceLock::new();

        let logger = LOGGER.get_or_init(|| Mutex::new(Logger::start()));
        let mut guard = logger.lock().expect("logger poisoned");
        while guard.pop().is_some() {}
        Self { guard }
    }

    /// Drain captured records and return the messages logged at `level`.
    pub fn messages_at(&mut self, level: Level) -> Vec<String> {
        let mut messages = Vec::new();
        while let Some(record) = self.guard.pop() {
            if record.level() == level {
                messages.push(record.args().to_owned());
            }
        }
        messages
    }

    /// Drain captured records and return the first whose message contains
    /// `needle`.
    pub fn find(&mut self, needle: &str) -> Option<Record> {
        while let Some(record) = self.guard.pop() {
            if record.args().contains(needle) {
                return Some(record);
            }
        }
        None
    }
}

impl Default for LoggerHandle {
    fn default() -> Self { Self::new() }
}

impl std::ops::Deref for LoggerHandle {
    type Target = Logger;

    fn deref(&self) -> &Self::Target { &self.guard }
}

impl std::ops::DerefMut for LoggerHandle {
    fn deref_mut(&mut self) -> &mut Self::Target { &mut self.guard }
}

#[allow(
    unused_braces,
    reason = "rustc false positive for single line rstest fixtures"
)]
#[fixture]
pub fn logger() -> LoggerHandle { LoggerHandle::new() }
