//! Logging collaborator.
//!
//! Every failure the crate reports to a caller is also described through a
//! [`Logger`] so the application can surface diagnostics however it likes.
//! [`FacadeLogger`] forwards to the `log` crate macros and is the default;
//! [`NullLogger`] discards everything.

/// Sink for diagnostic messages.
pub trait Logger: Send + Sync {
    fn info(&self, message: &str);
    fn warning(&self, message: &str);
    fn error(&self, message: &str);
}

/// Forwards messages to the `log` crate macros.
#[derive(Debug, Default, Clone, Copy)]
pub struct FacadeLogger;

impl Logger for FacadeLogger {
    fn info(&self, message: &str) {
        log::info!("{message}");
    }

    fn warning(&self, message: &str) {
        log::warn!("{message}");
    }

    fn error(&self, message: &str) {
        log::error!("{message}");
    }
}

/// Discards all messages.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullLogger;

impl Logger for NullLogger {
    fn info(&self, _message: &str) {}
    fn warning(&self, _message: &str) {}
    fn error(&self, _message: &str) {}
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::Logger;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Counts messages per severity; tests assert on the counters.
    #[derive(Debug, Default)]
    pub struct CountingLogger {
        pub infos: AtomicU32,
        pub warnings: AtomicU32,
        pub errors: AtomicU32,
    }

    impl CountingLogger {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn error_count(&self) -> u32 {
            self.errors.load(Ordering::Relaxed)
        }

        pub fn warning_count(&self) -> u32 {
            self.warnings.load(Ordering::Relaxed)
        }

        pub fn reset(&self) {
            self.infos.store(0, Ordering::Relaxed);
            self.warnings.store(0, Ordering::Relaxed);
            self.errors.store(0, Ordering::Relaxed);
        }
    }

    impl Logger for CountingLogger {
        fn info(&self, _message: &str) {
            self.infos.fetch_add(1, Ordering::Relaxed);
        }

        fn warning(&self, _message: &str) {
            self.warnings.fetch_add(1, Ordering::Relaxed);
        }

        fn error(&self, _message: &str) {
            self.errors.fetch_add(1, Ordering::Relaxed);
        }
    }
}
