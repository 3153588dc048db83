//! Session and visitor record types.

use serde::{Deserialize, Serialize};

/// A width/height pair, used for both screen and viewport dimensions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScreenSize {
    pub width: u32,
    pub height: u32,
}

/// A recorded session row.
///
/// Created on the first batch received for a previously-unknown session
/// id; `updated_at` and `event_count` change on every subsequent batch.
/// Timestamps are ISO 8601 strings in UTC, as produced by SQLite's
/// `datetime('now')`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    /// Public session identifier.
    pub session_id: String,
    /// Fingerprint of the visitor this session was correlated to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visitor_id: Option<String>,
    /// URL of the first batch's page.
    pub url: String,
    /// Document title of the first batch's page.
    pub title: String,
    /// Referrer of the first batch's page.
    pub referrer: String,
    /// User agent string.
    pub user_agent: String,
    /// Screen dimensions reported by the client.
    pub screen: ScreenSize,
    /// Total events appended across all batches.
    pub event_count: i64,
    /// Creation timestamp (ISO 8601).
    pub created_at: String,
    /// Last batch timestamp (ISO 8601). Drives retention.
    pub updated_at: String,
}

/// A compact session row for list views.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub session_id: String,
    pub url: String,
    pub title: String,
    pub screen: ScreenSize,
    pub event_count: i64,
    /// Visit count of the correlated visitor, 0 when uncorrelated.
    pub visit_count: i64,
    pub created_at: String,
    pub updated_at: String,
}

/// A visitor correlation row, keyed by fingerprint.
///
/// Fingerprint collisions across unrelated visitors are accepted as a
/// precision/privacy trade-off, not a correctness bug.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Visitor {
    pub fingerprint: String,
    pub first_seen: String,
    pub last_seen: String,
    pub visit_count: i64,
}
