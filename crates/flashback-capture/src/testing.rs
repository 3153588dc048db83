//! Shared test fixtures for the capture crate.

use std::cell::RefCell;
use std::rc::Rc;

use flashback_page::{Page, SimPage};
use flashback_types::{Event, EventBatch, RecorderConfig};

use crate::pipeline::DeliveryPipeline;
use crate::sink::EventSink;
use crate::transport::{Transport, TransportError};

/// Always fails delivery, so enqueued events stay inspectable in the
/// pending queue.
pub struct FailingTransport;

impl Transport for FailingTransport {
    fn deliver(&self, _batch: &EventBatch) -> Result<u64, TransportError> {
        Err(TransportError::Rejected { status: 503 })
    }
}

/// Records every delivered batch and acknowledges it.
pub struct CollectingTransport {
    pub batches: Rc<RefCell<Vec<EventBatch>>>,
}

impl Transport for CollectingTransport {
    fn deliver(&self, batch: &EventBatch) -> Result<u64, TransportError> {
        self.batches.borrow_mut().push(batch.clone());
        Ok(batch.events.len() as u64)
    }
}

/// Builds a sink over a pipeline whose deliveries always fail, keeping
/// events queued for inspection via [`queued`].
pub fn test_sink(
    page: &Rc<SimPage>,
    config: &RecorderConfig,
) -> (EventSink, Rc<RefCell<DeliveryPipeline>>) {
    let pipeline = Rc::new(RefCell::new(DeliveryPipeline::new(
        "test-session".to_string(),
        Rc::clone(page) as Rc<dyn Page>,
        Box::new(FailingTransport),
        config,
    )));
    let sink = EventSink::new(Rc::clone(&pipeline), page.clock());
    (sink, pipeline)
}

/// Snapshot of the events currently queued in the pipeline.
pub fn queued(pipeline: &Rc<RefCell<DeliveryPipeline>>) -> Vec<Event> {
    pipeline.borrow().pending_events()
}
