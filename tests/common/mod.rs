//! Shared helpers for integration tests.

#![allow(dead_code)]

use std::io;
use std::sync::{Arc, Mutex};

use statewatch::{Logger, StateChangeEvent, StateSnapshot, StateValue};

/// In-memory sink for formatted `tracing` output.
#[derive(Clone, Default)]
pub struct LogBuffer(Arc<Mutex<Vec<u8>>>);

impl LogBuffer {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl io::Write for LogBuffer {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for LogBuffer {
    type Writer = Self;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

/// A logger that records everything at DEBUG and above into a buffer.
pub fn capture_logger() -> (Logger, LogBuffer) {
    let buf = LogBuffer::default();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(buf.clone())
        .with_ansi(false)
        .with_max_level(tracing::Level::DEBUG)
        .finish();
    (Logger::from_subscriber(subscriber), buf)
}

/// An event whose new value is `new` and old value is `old`.
pub fn change(id: &str, old: impl Into<StateValue>, new: impl Into<StateValue>) -> StateChangeEvent {
    StateChangeEvent::new(id, StateSnapshot::new(old), StateSnapshot::new(new))
}
