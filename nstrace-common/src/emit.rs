//! Event emission
//!
//! Submission is fire-and-forget: a full per-CPU buffer drops the record and the
//! caller is never told.

use crate::Skip;

pub trait EventSink<T> {
    fn submit(&self, event: &T);
}

/// Submit the event of a hook pipeline, or hand back why there was none.
#[inline(always)]
pub fn forward<T, S: EventSink<T>>(sink: &S, outcome: Result<T, Skip>) -> Option<Skip> {
    match outcome {
        Ok(event) => {
            sink.submit(&event);
            None
        }
        Err(skip) => Some(skip),
    }
}
