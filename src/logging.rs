//! Diagnostics sink handed to the engine.
//!
//! The engine never reaches for a process-global logger. It is given a
//! [`Logger`] at construction and runs its intake thread and handler workers
//! inside that logger's `tracing` dispatcher, so diagnostics from matchers,
//! the dispatcher and failing handlers all land where the embedder chose.

use std::fmt;

use tracing::{dispatcher, Dispatch, Subscriber};

/// A `tracing` dispatcher the engine logs through.
#[derive(Clone)]
pub struct Logger {
    dispatch: Dispatch,
}

impl Logger {
    /// Uses the dispatcher that is current on the calling thread.
    #[must_use]
    pub fn current() -> Self {
        Self {
            dispatch: dispatcher::get_default(Dispatch::clone),
        }
    }

    /// Wraps an existing dispatcher.
    #[must_use]
    pub fn new(dispatch: Dispatch) -> Self {
        Self { dispatch }
    }

    /// Builds a logger from a subscriber.
    #[must_use]
    pub fn from_subscriber<S>(subscriber: S) -> Self
    where
        S: Subscriber + Send + Sync + 'static,
    {
        Self::new(Dispatch::new(subscriber))
    }

    /// A logger that discards everything.
    #[must_use]
    pub fn disabled() -> Self {
        Self::new(Dispatch::none())
    }

    /// Runs `f` with this logger as the thread's default dispatcher.
    pub fn scope<T>(&self, f: impl FnOnce() -> T) -> T {
        dispatcher::with_default(&self.dispatch, f)
    }

    /// The wrapped dispatcher.
    #[must_use]
    pub const fn dispatch(&self) -> &Dispatch {
        &self.dispatch
    }
}

impl Default for Logger {
    fn default() -> Self {
        Self::current()
    }
}

impl fmt::Debug for Logger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Logger").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct Buffer(Arc<Mutex<Vec<u8>>>);

    impl io::Write for Buffer {
        fn write(&mut self, data: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(data);
            Ok(data.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for Buffer {
        type Writer = Self;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    fn capture() -> (Logger, Buffer) {
        let buf = Buffer::default();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(buf.clone())
            .with_ansi(false)
            .with_max_level(tracing::Level::DEBUG)
            .finish();
        (Logger::from_subscriber(subscriber), buf)
    }

    fn text(buf: &Buffer) -> String {
        String::from_utf8_lossy(&buf.0.lock().unwrap()).into_owned()
    }

    #[test]
    fn test_scope_routes_events() {
        let (logger, buf) = capture();
        logger.scope(|| tracing::warn!(field = "enumId", "scoped message"));
        let out = text(&buf);
        assert!(out.contains("scoped message"));
        assert!(out.contains("enumId"));
    }

    #[test]
    fn test_scope_routes_events_on_other_threads() {
        let (logger, buf) = capture();
        let worker = logger.clone();
        std::thread::spawn(move || worker.scope(|| tracing::error!("from worker")))
            .join()
            .unwrap();
        assert!(text(&buf).contains("from worker"));
    }

    #[test]
    fn test_disabled_logger() {
        let logger = Logger::disabled();
        assert_eq!(logger.scope(|| 7), 7);
    }
}
