// Logs module - Supervision event sinks

pub mod sink;
pub mod writer;

pub use sink::{ConsoleSink, EventLogger, LogSink, Severity};
pub use writer::EventLogWriter;
