//! Emitter - upstream producer entry point

use crate::{EventStream, EventTime, OutputError, Record};

/// Anything events can be emitted into: an output or a router
pub trait Emitter: Send + Sync {
    fn name(&self) -> &str;

    /// Emit a single event
    fn emit(&self, tag: &str, time: EventTime, record: Record) -> Result<(), OutputError> {
        self.emits(tag, &EventStream::one(time, record))
    }

    /// Emit a stream of events sharing one tag
    fn emits(&self, tag: &str, stream: &EventStream) -> Result<(), OutputError>;
}
