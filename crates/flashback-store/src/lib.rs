//! Persistence operations for the Flashback collector.
//!
//! The store is an idempotent, append-only event log plus session and
//! visitor bookkeeping. All writes for one batch go through
//! [`append_events`], which is atomic per call: the session row is
//! created or touched, the visitor is upserted, and every event in the
//! batch is appended — or none of it is.
//!
//! Re-delivery of a batch whose prior attempt actually committed (a
//! false-negative network failure on the client) produces duplicate
//! event rows. That is an accepted consequence of at-least-once
//! delivery; readers must tolerate occasional duplicates
//! distinguishable only by identical timestamp and payload.

mod error;
mod store;

pub use error::StoreError;
pub use store::{
    append_events, delete_session, get_session, list_sessions, retention_horizon, sweep_expired,
    EventRow, SessionDetail, SessionPage,
};
