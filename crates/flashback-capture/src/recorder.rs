//! Session controller.
//!
//! Owns session identity, the persisted sampling decision, page
//! exclusion, channel lifecycle, and the outbound delivery pipeline.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use rand::Rng;

use flashback_page::Page;
use flashback_types::{
    EventPayload, RecorderConfig, SessionEndData, SessionEndReason, SessionStartData,
};

use crate::channels::{
    CaptureChannel, FormChannel, NavigationChannel, PointerChannel, StructuralChannel,
};
use crate::pipeline::DeliveryPipeline;
use crate::privacy::PrivacyPolicy;
use crate::registry::NodeRegistry;
use crate::sink::EventSink;
use crate::transport::{HttpTransport, Transport, TransportError};

/// State-store key for the persisted per-visitor sampling decision.
pub const SAMPLING_STATE_KEY: &str = "flashback.sampled";

/// State-store key for the session identifier reused across page views.
pub const SESSION_STATE_KEY: &str = "flashback.session";

/// Errors surfaced by the recorder itself. Everything downstream of a
/// started session is swallowed and logged instead.
#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    /// The delivery transport could not be constructed.
    #[error("transport initialization failed: {0}")]
    Transport(#[from] TransportError),
}

/// Recorder lifecycle states. `Excluded`, `Unsampled`, and `Stopped`
/// are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecorderState {
    Idle,
    Excluded,
    Unsampled,
    Recording,
    Stopped,
}

/// Captures one session of a page.
pub struct Recorder {
    page: Rc<dyn Page>,
    config: RecorderConfig,
    policy: Rc<PrivacyPolicy>,
    state: RecorderState,
    session_id: Option<String>,
    registry: Rc<RefCell<NodeRegistry>>,
    pipeline: Option<Rc<RefCell<DeliveryPipeline>>>,
    sink: Option<EventSink>,
    channels: Vec<Box<dyn CaptureChannel>>,
}

impl Recorder {
    pub fn new(page: Rc<dyn Page>, config: RecorderConfig) -> Self {
        let policy = Rc::new(PrivacyPolicy::new(config.privacy.clone()));
        Self {
            page,
            config,
            policy,
            state: RecorderState::Idle,
            session_id: None,
            registry: Rc::new(RefCell::new(NodeRegistry::new())),
            pipeline: None,
            sink: None,
            channels: Vec::new(),
        }
    }

    /// Starts recording over the HTTP transport built from the
    /// configured endpoint.
    ///
    /// Returns `Ok(false)` without starting when the page is excluded,
    /// the visitor is unsampled, or recording already started.
    ///
    /// # Errors
    ///
    /// Returns `CaptureError::Transport` when the HTTP client cannot be
    /// constructed.
    pub fn start(&mut self) -> Result<bool, CaptureError> {
        let transport = HttpTransport::new(
            &self.config.endpoint,
            Duration::from_millis(self.config.transport_timeout_ms),
        )?;
        Ok(self.start_with_transport(Box::new(transport)))
    }

    /// Starts recording over a caller-supplied transport.
    pub fn start_with_transport(&mut self, transport: Box<dyn Transport>) -> bool {
        if self.state != RecorderState::Idle {
            tracing::debug!(state = ?self.state, "start ignored, recorder is not idle");
            return false;
        }

        let url = self.page.url();
        if self.policy.is_page_excluded(&url) {
            tracing::info!(%url, "page matches exclusion pattern, not recording");
            self.state = RecorderState::Excluded;
            return false;
        }

        if !self.sampling_decision() {
            tracing::info!("visitor not sampled, not recording");
            self.state = RecorderState::Unsampled;
            return false;
        }

        let session_id = self.resolve_session_id();
        let pipeline = Rc::new(RefCell::new(DeliveryPipeline::new(
            session_id.clone(),
            Rc::clone(&self.page),
            transport,
            &self.config,
        )));
        let sink = EventSink::new(Rc::clone(&pipeline), self.page.clock());

        sink.push(EventPayload::SessionStart(SessionStartData {
            url: self.page.url(),
            title: self.page.title(),
            referrer: self.page.referrer(),
        }));

        // Channel start order is immaterial except that the structural
        // channel emits its snapshot during start, before any mutation
        // can be observed.
        let mut channels: Vec<Box<dyn CaptureChannel>> = Vec::new();
        if let Some(channel) = StructuralChannel::start(
            &self.page,
            sink.clone(),
            Rc::clone(&self.policy),
            Rc::clone(&self.registry),
        ) {
            channels.push(Box::new(channel));
        }
        if let Some(channel) = PointerChannel::start(
            &self.page,
            sink.clone(),
            Rc::clone(&self.policy),
            &self.config,
        ) {
            channels.push(Box::new(channel));
        }
        if let Some(channel) =
            FormChannel::start(&self.page, sink.clone(), Rc::clone(&self.policy))
        {
            channels.push(Box::new(channel));
        }
        if let Some(channel) =
            NavigationChannel::start(&self.page, sink.clone(), Rc::clone(&self.policy))
        {
            channels.push(Box::new(channel));
        }

        tracing::info!(
            session_id = %session_id,
            channels = channels.len(),
            "recording started"
        );

        self.session_id = Some(session_id);
        self.pipeline = Some(pipeline);
        self.sink = Some(sink);
        self.channels = channels;
        self.state = RecorderState::Recording;
        true
    }

    /// Stops recording: emits session-end, detaches every channel, and
    /// synchronously flushes the remaining queue before returning.
    ///
    /// Calling stop while not recording is a no-op returning false.
    pub fn stop(&mut self) -> bool {
        if self.state != RecorderState::Recording {
            tracing::debug!(state = ?self.state, "stop ignored, recorder is not recording");
            return false;
        }

        if let Some(sink) = &self.sink {
            sink.push(EventPayload::SessionEnd(SessionEndData {
                reason: SessionEndReason::Stopped,
            }));
        }

        for channel in &mut self.channels {
            channel.stop();
        }
        self.channels.clear();

        if let Some(pipeline) = &self.pipeline {
            pipeline.borrow_mut().drain();
        }

        tracing::info!(
            session_id = self.session_id.as_deref().unwrap_or(""),
            "recording stopped"
        );
        self.state = RecorderState::Stopped;
        true
    }

    /// Periodic driver: releases trailing throttled emissions and runs
    /// the time-triggered flush. The embedder calls this on its timer
    /// at roughly `batch_interval_ms`.
    pub fn on_timer_tick(&mut self) {
        if self.state != RecorderState::Recording {
            return;
        }
        let now = self.page.clock().now_ms();
        for channel in &mut self.channels {
            channel.poll(now);
        }
        if let Some(pipeline) = &self.pipeline {
            pipeline.borrow_mut().flush();
        }
    }

    /// Reads the persisted sampling decision, rolling and persisting it
    /// on first sight of this visitor.
    fn sampling_decision(&self) -> bool {
        let store = self.page.state();
        match store.get(SAMPLING_STATE_KEY) {
            Some(value) => value == "true",
            None => {
                let rate = self.config.sampling_rate.min(100);
                let roll: u8 = rand::thread_rng().gen_range(0..100);
                let decision = roll < rate;
                store.set(SAMPLING_STATE_KEY, if decision { "true" } else { "false" });
                tracing::debug!(rate, decision, "sampling decision rolled and persisted");
                decision
            }
        }
    }

    /// Reuses the persisted session identifier or allocates a new one.
    fn resolve_session_id(&self) -> String {
        let store = self.page.state();
        if let Some(existing) = store.get(SESSION_STATE_KEY) {
            if !existing.is_empty() {
                return existing;
            }
        }
        let fresh = uuid::Uuid::new_v4().to_string();
        store.set(SESSION_STATE_KEY, &fresh);
        fresh
    }

    /// The interval the embedder should drive [`Recorder::on_timer_tick`]
    /// at, from the configured batch interval.
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.config.batch_interval_ms)
    }

    /// Current lifecycle state.
    pub fn state(&self) -> RecorderState {
        self.state
    }

    /// The session identifier, once recording has started.
    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    /// Number of events awaiting delivery.
    pub fn pending(&self) -> usize {
        self.pipeline
            .as_ref()
            .map(|p| p.borrow().pending())
            .unwrap_or(0)
    }
}
