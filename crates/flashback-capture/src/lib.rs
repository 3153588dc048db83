//! Capture SDK for the Flashback session-replay pipeline.
//!
//! Converts a live, mutable page into a compact, privacy-filtered event
//! stream and delivers it to the collector in batches:
//!
//! - [`NodeRegistry`] — stable integer identity for DOM nodes, weakly
//!   held so detached nodes are never kept alive.
//! - [`PrivacyPolicy`] — masking and subtree/page exclusion, applied
//!   consistently across every capture path.
//! - [`selector_of`] — best-effort CSS path derivation.
//! - [`serialize_node`] — live tree → [`flashback_types::SerializedNode`].
//! - [`channels`] — the four independent capture channels.
//! - [`Recorder`] — the session state machine orchestrating the above.
//! - [`DeliveryPipeline`] / [`Transport`] — batching with at-least-once
//!   delivery and head re-queue on failure.
//!
//! Capture is single-threaded cooperative: channel callbacks run on the
//! page's event-processing thread, so the pipeline needs no lock, only
//! head/tail ordering discipline.

pub mod channels;
mod pipeline;
mod privacy;
mod registry;
mod selector;
mod serialize;
mod sink;
mod throttle;
mod transport;

mod recorder;

pub use pipeline::{DeliveryPipeline, FlushOutcome};
pub use privacy::PrivacyPolicy;
pub use recorder::{
    CaptureError, Recorder, RecorderState, SAMPLING_STATE_KEY, SESSION_STATE_KEY,
};
pub use registry::NodeRegistry;
pub use selector::selector_of;
pub use serialize::{captured_value, serialize_node};
pub use sink::EventSink;
pub use throttle::Throttle;
pub use transport::{HttpTransport, Transport, TransportError};

#[cfg(test)]
pub(crate) mod testing;
