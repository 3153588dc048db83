//! Shared types for the Flashback session-replay pipeline.
//!
//! This crate provides the foundational types used across all Flashback
//! crates: the closed event model, the serialized DOM tree, session and
//! visitor records, the recorder configuration surface, the batch wire
//! format, and visitor fingerprint derivation.
//!
//! No crate in the workspace depends on anything *except*
//! `flashback-types` for cross-cutting type definitions. This keeps the
//! dependency graph clean and prevents circular dependencies.

mod config;
mod event;
mod fingerprint;
mod node;
mod session;

pub use config::{PrivacyConfig, RecorderConfig};
pub use event::{
    BatchMeta, ClickData, CollectResponse, Event, EventBatch, EventKind, EventPayload, FormAction,
    FormData, MutationChange, MutationData, NavigationTiming, PageLoadData, ParseEventKindError,
    PointerMoveData, ScrollData, SessionEndData, SessionEndReason, SessionStartData, SnapshotData,
    TransitionCause, TransitionData, ViewportResizeData,
};
pub use fingerprint::{derive_fingerprint, FingerprintInputs};
pub use node::{NodeId, SerializedNode};
pub use session::{ScreenSize, Session, SessionSummary, Visitor};
