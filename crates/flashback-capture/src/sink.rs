//! Shared event sink handed to every capture channel.

use std::cell::RefCell;
use std::rc::Rc;

use flashback_page::Clock;
use flashback_types::{Event, EventPayload};

use crate::pipeline::DeliveryPipeline;

/// Cheap-to-clone handle through which channels emit events.
///
/// Stamps each payload with the injected clock and appends it to the
/// session's delivery pipeline. All channels share one sink, so the
/// enqueue order is exactly the production order.
#[derive(Clone)]
pub struct EventSink {
    pipeline: Rc<RefCell<DeliveryPipeline>>,
    clock: Rc<dyn Clock>,
}

impl EventSink {
    pub fn new(pipeline: Rc<RefCell<DeliveryPipeline>>, clock: Rc<dyn Clock>) -> Self {
        Self { pipeline, clock }
    }

    /// Emits one event, stamped with the current time.
    pub fn push(&self, payload: EventPayload) {
        let event = Event {
            timestamp: self.clock.now_ms(),
            payload,
        };
        self.pipeline.borrow_mut().enqueue(event);
    }

    /// Requests an unconditional flush (unload, hidden, stop).
    pub fn flush(&self) {
        self.pipeline.borrow_mut().flush();
    }

    /// Current clock reading, for channels that throttle.
    pub fn now_ms(&self) -> i64 {
        self.clock.now_ms()
    }
}
