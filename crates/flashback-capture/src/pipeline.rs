//! Batching and delivery pipeline.
//!
//! A bounded queue of pending events with two flush triggers: reaching
//! the configured batch size, and the periodic timer tick. Delivery is
//! at-least-once: a failed batch is pushed back onto the head of the
//! queue in its original order, ahead of anything enqueued since, and
//! retried on the next flush cycle.

use std::collections::VecDeque;
use std::rc::Rc;

use flashback_page::Page;
use flashback_types::{BatchMeta, Event, EventBatch, RecorderConfig};

use crate::transport::Transport;

/// Outcome of one flush attempt, mostly for tests and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushOutcome {
    /// Nothing to deliver.
    Empty,
    /// A flush is already in progress.
    Busy,
    /// The batch was delivered and discarded.
    Delivered(usize),
    /// Delivery failed; the batch was re-queued at the head.
    Requeued(usize),
}

/// The per-session delivery pipeline.
pub struct DeliveryPipeline {
    session_id: String,
    page: Rc<dyn Page>,
    transport: Box<dyn Transport>,
    queue: VecDeque<Event>,
    batch_size: usize,
    max_pending: usize,
    /// Events dropped because the queue was full while the collector
    /// stayed unreachable.
    dropped: u64,
    in_flight: bool,
}

impl DeliveryPipeline {
    pub fn new(
        session_id: String,
        page: Rc<dyn Page>,
        transport: Box<dyn Transport>,
        config: &RecorderConfig,
    ) -> Self {
        Self {
            session_id,
            page,
            transport,
            queue: VecDeque::new(),
            batch_size: config.batch_size.max(1),
            max_pending: config.max_pending_events.max(config.batch_size.max(1)),
            dropped: 0,
            in_flight: false,
        }
    }

    /// Appends an event at the tail. Reaching the batch size triggers
    /// an immediate flush. When the queue is at capacity the oldest
    /// event is dropped first — newest activity wins.
    pub fn enqueue(&mut self, event: Event) {
        if self.queue.len() >= self.max_pending {
            self.queue.pop_front();
            self.dropped += 1;
            if self.dropped % 100 == 1 {
                tracing::warn!(
                    session_id = %self.session_id,
                    dropped = self.dropped,
                    "pending queue full, dropping oldest events"
                );
            }
        }

        self.queue.push_back(event);

        if self.queue.len() >= self.batch_size {
            self.flush();
        }
    }

    /// Removes up to one batch from the head, attaches current page
    /// metadata, and attempts delivery. On failure the events return to
    /// the head in their original order; the failure is logged, never
    /// raised.
    pub fn flush(&mut self) -> FlushOutcome {
        if self.in_flight {
            return FlushOutcome::Busy;
        }
        if self.queue.is_empty() {
            return FlushOutcome::Empty;
        }

        self.in_flight = true;

        let take = self.queue.len().min(self.batch_size);
        let events: Vec<Event> = self.queue.drain(..take).collect();
        let batch = EventBatch {
            session_id: self.session_id.clone(),
            events,
            timestamp: self.page.clock().now_ms(),
            meta: self.current_meta(),
        };

        let outcome = match self.transport.deliver(&batch) {
            Ok(acknowledged) => {
                tracing::debug!(
                    session_id = %self.session_id,
                    sent = batch.events.len(),
                    acknowledged,
                    "batch delivered"
                );
                FlushOutcome::Delivered(batch.events.len())
            }
            Err(e) => {
                tracing::warn!(
                    session_id = %self.session_id,
                    error = %e,
                    requeued = batch.events.len(),
                    "batch delivery failed, re-queuing at head"
                );
                for event in batch.events.into_iter().rev() {
                    self.queue.push_front(event);
                }
                FlushOutcome::Requeued(take)
            }
        };

        self.in_flight = false;
        outcome
    }

    /// Flushes until the queue is empty or delivery stops making
    /// progress. Used on stop and unload.
    pub fn drain(&mut self) {
        while !self.queue.is_empty() {
            match self.flush() {
                FlushOutcome::Delivered(_) => {}
                _ => break,
            }
        }
    }

    fn current_meta(&self) -> BatchMeta {
        BatchMeta {
            user_agent: self.page.user_agent(),
            language: self.page.language(),
            screen: self.page.screen(),
            viewport: Some(self.page.viewport()),
            url: Some(self.page.url()),
            title: Some(self.page.title()),
            referrer: Some(self.page.referrer()),
            timezone: Some(self.page.timezone()),
        }
    }

    /// Number of events awaiting delivery.
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Snapshot of the pending queue, head first. Events from a failed
    /// delivery remain retrievable here until a later flush succeeds.
    pub fn pending_events(&self) -> Vec<Event> {
        self.queue.iter().cloned().collect()
    }

    /// Events dropped due to queue pressure.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::{Cell, RefCell};
    use flashback_page::{SimPage, SimPageOptions};
    use flashback_types::{EventPayload, PointerMoveData, ScrollData};
    use crate::transport::TransportError;

    /// Records delivered batches; optionally fails every attempt.
    struct RecordingTransport {
        batches: Rc<RefCell<Vec<EventBatch>>>,
        fail: Rc<Cell<bool>>,
    }

    impl Transport for RecordingTransport {
        fn deliver(&self, batch: &EventBatch) -> Result<u64, TransportError> {
            if self.fail.get() {
                return Err(TransportError::Rejected { status: 500 });
            }
            self.batches.borrow_mut().push(batch.clone());
            Ok(batch.events.len() as u64)
        }
    }

    fn pipeline_with(
        config: RecorderConfig,
    ) -> (
        DeliveryPipeline,
        Rc<RefCell<Vec<EventBatch>>>,
        Rc<Cell<bool>>,
    ) {
        let page = SimPage::new(SimPageOptions::default());
        let batches = Rc::new(RefCell::new(Vec::new()));
        let fail = Rc::new(Cell::new(false));
        let transport = RecordingTransport {
            batches: Rc::clone(&batches),
            fail: Rc::clone(&fail),
        };
        let pipeline = DeliveryPipeline::new(
            "session-1".to_string(),
            page as Rc<dyn Page>,
            Box::new(transport),
            &config,
        );
        (pipeline, batches, fail)
    }

    fn move_event(n: i32) -> Event {
        Event {
            timestamp: n as i64,
            payload: EventPayload::PointerMove(PointerMoveData { x: n, y: n }),
        }
    }

    #[test]
    fn reaching_batch_size_triggers_flush() {
        let config = RecorderConfig {
            batch_size: 3,
            ..RecorderConfig::default()
        };
        let (mut pipeline, batches, _) = pipeline_with(config);

        pipeline.enqueue(move_event(1));
        pipeline.enqueue(move_event(2));
        assert!(batches.borrow().is_empty());

        pipeline.enqueue(move_event(3));
        assert_eq!(batches.borrow().len(), 1);
        assert_eq!(pipeline.pending(), 0);
    }

    #[test]
    fn flush_preserves_enqueue_order() {
        let config = RecorderConfig {
            batch_size: 100,
            ..RecorderConfig::default()
        };
        let (mut pipeline, batches, _) = pipeline_with(config);

        for n in 0..5 {
            pipeline.enqueue(move_event(n));
        }
        assert_eq!(pipeline.flush(), FlushOutcome::Delivered(5));

        let delivered = &batches.borrow()[0];
        let timestamps: Vec<i64> = delivered.events.iter().map(|e| e.timestamp).collect();
        assert_eq!(timestamps, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn failed_batch_returns_to_head_in_order() {
        let config = RecorderConfig {
            batch_size: 3,
            ..RecorderConfig::default()
        };
        let (mut pipeline, batches, fail) = pipeline_with(config);

        fail.set(true);
        pipeline.enqueue(move_event(1));
        pipeline.enqueue(move_event(2));
        pipeline.enqueue(move_event(3)); // size-triggered flush fails
        assert_eq!(pipeline.pending(), 3, "failed batch stays queued");

        // New activity lands behind the re-queued batch.
        let scroll = Event {
            timestamp: 4,
            payload: EventPayload::Scroll(ScrollData { x: 0, y: 10 }),
        };
        pipeline.enqueue(scroll);

        fail.set(false);
        assert_eq!(pipeline.flush(), FlushOutcome::Delivered(3));
        assert_eq!(pipeline.flush(), FlushOutcome::Delivered(1));

        let all: Vec<i64> = batches
            .borrow()
            .iter()
            .flat_map(|b| b.events.iter().map(|e| e.timestamp))
            .collect();
        assert_eq!(all, vec![1, 2, 3, 4], "original order ahead of new events");
    }

    #[test]
    fn queue_is_bounded_dropping_oldest() {
        let config = RecorderConfig {
            batch_size: 100,
            max_pending_events: 100,
            ..RecorderConfig::default()
        };
        let (mut pipeline, _, fail) = pipeline_with(config);

        fail.set(true);
        for n in 0..150 {
            pipeline.enqueue(move_event(n));
        }
        assert_eq!(pipeline.pending(), 100);
        assert_eq!(pipeline.dropped(), 50);
    }

    #[test]
    fn flush_of_empty_queue_is_a_no_op() {
        let (mut pipeline, batches, _) = pipeline_with(RecorderConfig::default());
        assert_eq!(pipeline.flush(), FlushOutcome::Empty);
        assert!(batches.borrow().is_empty());
    }

    #[test]
    fn drain_empties_the_queue_across_batches() {
        let config = RecorderConfig {
            batch_size: 2,
            max_pending_events: 100,
            ..RecorderConfig::default()
        };
        let (mut pipeline, batches, fail) = pipeline_with(config);

        fail.set(true);
        for n in 0..5 {
            pipeline.enqueue(move_event(n));
        }
        fail.set(false);
        pipeline.drain();
        assert_eq!(pipeline.pending(), 0);
        assert_eq!(batches.borrow().len(), 3, "5 events in batches of 2");
    }

    #[test]
    fn batch_carries_current_page_metadata() {
        let (mut pipeline, batches, _) = pipeline_with(RecorderConfig::default());
        pipeline.enqueue(move_event(1));
        pipeline.flush();

        let batch = &batches.borrow()[0];
        assert_eq!(batch.meta.user_agent, "SimPage/1.0");
        assert!(batch.meta.url.as_deref().unwrap_or("").starts_with("https://"));
        assert_eq!(batch.session_id, "session-1");
    }
}
