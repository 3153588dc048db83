//! Store operations over rusqlite connections.

use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

use flashback_types::{
    derive_fingerprint, EventBatch, FingerprintInputs, ScreenSize, Session, SessionSummary,
};

use crate::error::StoreError;

/// One stored event log row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventRow {
    /// Client capture time in milliseconds.
    pub timestamp: i64,
    /// Index within the received batch.
    pub seq: i64,
    /// Event kind label, for filtering without parsing payloads.
    pub event_type: String,
    /// The full original event as a JSON string.
    pub payload_json: String,
}

/// A full session with its ordered event log.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionDetail {
    pub session: Session,
    pub events: Vec<EventRow>,
}

/// One page of the session list.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionPage {
    pub sessions: Vec<SessionSummary>,
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}

/// Appends one batch to the event log, atomically.
///
/// Creates the session row on first sight of `session_id`; later
/// batches only touch `updated_at` and increment `event_count`. The
/// visitor derived from the batch metadata (plus the client network
/// address when known) is upserted, incrementing `visit_count` on
/// conflict. All events are appended in batch order with their index as
/// `seq`. Any failure rolls the whole call back.
///
/// Returns the number of events appended.
///
/// # Errors
///
/// Returns `StoreError::Database` on SQL failure or
/// `StoreError::Serialization` if an event cannot be serialized.
pub fn append_events(
    conn: &mut Connection,
    batch: &EventBatch,
    client_address: Option<&str>,
) -> Result<usize, StoreError> {
    let tx = conn.transaction()?;

    let fingerprint = derive_fingerprint(&FingerprintInputs {
        user_agent: &batch.meta.user_agent,
        language: &batch.meta.language,
        timezone: batch.meta.timezone.as_deref().unwrap_or(""),
        screen: batch.meta.screen,
        client_address,
    });

    tx.execute(
        "INSERT INTO visitors (fingerprint) VALUES (?1)
         ON CONFLICT(fingerprint) DO UPDATE SET
             visit_count = visit_count + 1,
             last_seen = datetime('now')",
        [&fingerprint],
    )?;

    // Creation populates the page metadata; subsequent batches for the
    // same id only touch updated_at and the event count.
    tx.execute(
        "INSERT INTO sessions (
            session_id, visitor_id, url, title, referrer, user_agent,
            screen_width, screen_height, event_count
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
        ON CONFLICT(session_id) DO UPDATE SET
            event_count = event_count + excluded.event_count,
            updated_at = datetime('now')",
        params![
            batch.session_id,
            fingerprint,
            batch.meta.url.as_deref().unwrap_or(""),
            batch.meta.title.as_deref().unwrap_or(""),
            batch.meta.referrer.as_deref().unwrap_or(""),
            batch.meta.user_agent,
            batch.meta.screen.width,
            batch.meta.screen.height,
            batch.events.len() as i64,
        ],
    )?;

    {
        let mut stmt = tx.prepare(
            "INSERT INTO events (session_id, timestamp, seq, event_type, payload_json)
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )?;
        for (seq, event) in batch.events.iter().enumerate() {
            let payload_json = serde_json::to_string(event)?;
            stmt.execute(params![
                batch.session_id,
                event.timestamp,
                seq as i64,
                event.kind().as_str(),
                payload_json,
            ])?;
        }
    }

    tx.commit()?;

    tracing::debug!(
        session_id = %batch.session_id,
        events = batch.events.len(),
        "batch appended"
    );
    Ok(batch.events.len())
}

fn map_row_to_summary(row: &Row<'_>) -> rusqlite::Result<SessionSummary> {
    Ok(SessionSummary {
        session_id: row.get(0)?,
        url: row.get(1)?,
        title: row.get(2)?,
        screen: ScreenSize {
            width: row.get(3)?,
            height: row.get(4)?,
        },
        event_count: row.get(5)?,
        visit_count: row.get(6)?,
        created_at: row.get(7)?,
        updated_at: row.get(8)?,
    })
}

/// Lists sessions ordered by most-recently-updated first.
pub fn list_sessions(conn: &Connection, limit: i64, offset: i64) -> Result<SessionPage, StoreError> {
    let total: i64 = conn.query_row("SELECT COUNT(*) FROM sessions", [], |row| row.get(0))?;

    let mut stmt = conn.prepare(
        "SELECT
            s.session_id, s.url, s.title, s.screen_width, s.screen_height,
            s.event_count, COALESCE(v.visit_count, 0), s.created_at, s.updated_at
        FROM sessions s
        LEFT JOIN visitors v ON v.fingerprint = s.visitor_id
        ORDER BY s.updated_at DESC, s.id DESC
        LIMIT ?1 OFFSET ?2",
    )?;

    let rows = stmt.query_map(params![limit, offset], map_row_to_summary)?;
    let mut sessions = Vec::new();
    for row in rows {
        sessions.push(row?);
    }

    Ok(SessionPage {
        sessions,
        total,
        limit,
        offset,
    })
}

/// Retrieves a full session with its event log in stored order.
///
/// # Errors
///
/// Returns `StoreError::SessionNotFound` when no row exists for `id`.
pub fn get_session(conn: &Connection, session_id: &str) -> Result<SessionDetail, StoreError> {
    let session = conn
        .query_row(
            "SELECT session_id, visitor_id, url, title, referrer, user_agent,
                    screen_width, screen_height, event_count, created_at, updated_at
             FROM sessions WHERE session_id = ?1",
            [session_id],
            |row| {
                Ok(Session {
                    session_id: row.get(0)?,
                    visitor_id: row.get(1)?,
                    url: row.get(2)?,
                    title: row.get(3)?,
                    referrer: row.get(4)?,
                    user_agent: row.get(5)?,
                    screen: ScreenSize {
                        width: row.get(6)?,
                        height: row.get(7)?,
                    },
                    event_count: row.get(8)?,
                    created_at: row.get(9)?,
                    updated_at: row.get(10)?,
                })
            },
        )
        .optional()?
        .ok_or_else(|| StoreError::SessionNotFound(session_id.to_string()))?;

    // Arrival order is the production order: timestamps repeat within a
    // burst and seq restarts per batch, so the rowid is the only total
    // order that matches both.
    let mut stmt = conn.prepare(
        "SELECT timestamp, seq, event_type, payload_json
         FROM events
         WHERE session_id = ?1
         ORDER BY id ASC",
    )?;
    let rows = stmt.query_map([session_id], |row| {
        Ok(EventRow {
            timestamp: row.get(0)?,
            seq: row.get(1)?,
            event_type: row.get(2)?,
            payload_json: row.get(3)?,
        })
    })?;

    let mut events = Vec::new();
    for row in rows {
        events.push(row?);
    }

    Ok(SessionDetail { session, events })
}

/// Deletes a session and all of its events as one unit.
///
/// # Errors
///
/// Returns `StoreError::SessionNotFound` when no row exists for `id`.
pub fn delete_session(conn: &Connection, session_id: &str) -> Result<(), StoreError> {
    let count = conn.execute("DELETE FROM sessions WHERE session_id = ?1", [session_id])?;
    if count == 0 {
        return Err(StoreError::SessionNotFound(session_id.to_string()));
    }
    Ok(())
}

/// Removes sessions (and, by cascade, their events) whose `updated_at`
/// precedes `horizon`, up to `batch_limit` sessions per call. Callers
/// loop while a full batch was deleted.
///
/// The recurring schedule belongs to the surrounding service, not the
/// store.
pub fn sweep_expired(
    conn: &Connection,
    horizon: &str,
    batch_limit: usize,
) -> Result<usize, StoreError> {
    let deleted = conn.execute(
        "DELETE FROM sessions WHERE id IN (
            SELECT id FROM sessions WHERE updated_at < ?1 LIMIT ?2
        )",
        params![horizon, batch_limit as i64],
    )?;
    Ok(deleted)
}

/// UTC timestamp string for "now minus `days`", in the same
/// `datetime('now')` format the session rows use.
pub fn retention_horizon(days: u32) -> String {
    let cutoff = chrono::Utc::now() - chrono::Duration::days(i64::from(days));
    cutoff.format("%Y-%m-%d %H:%M:%S").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use flashback_types::{
        BatchMeta, Event, EventPayload, PointerMoveData, ScreenSize, ScrollData,
    };

    fn test_conn() -> Connection {
        let conn = Connection::open_in_memory().expect("should open in-memory db");
        conn.execute_batch("PRAGMA foreign_keys = ON;")
            .expect("should enable foreign keys");
        flashback_db::run_migrations(&conn).expect("migrations should succeed");
        conn
    }

    fn meta() -> BatchMeta {
        BatchMeta {
            user_agent: "Mozilla/5.0 (test)".to_string(),
            language: "en-US".to_string(),
            screen: ScreenSize {
                width: 1920,
                height: 1080,
            },
            viewport: None,
            url: Some("https://app.example.com/home".to_string()),
            title: Some("Home".to_string()),
            referrer: Some(String::new()),
            timezone: Some("UTC".to_string()),
        }
    }

    fn batch(session_id: &str, event_count: usize) -> EventBatch {
        let events = (0..event_count)
            .map(|n| Event {
                timestamp: 1_000 + n as i64,
                payload: EventPayload::PointerMove(PointerMoveData {
                    x: n as i32,
                    y: n as i32,
                }),
            })
            .collect();
        EventBatch {
            session_id: session_id.to_string(),
            events,
            timestamp: 2_000,
            meta: meta(),
        }
    }

    #[test]
    fn first_batch_creates_session_with_event_count() {
        let mut conn = test_conn();
        let appended =
            append_events(&mut conn, &batch("s-1", 3), Some("203.0.113.7")).expect("append");
        assert_eq!(appended, 3);

        let detail = get_session(&conn, "s-1").expect("session exists");
        assert_eq!(detail.session.event_count, 3);
        assert_eq!(detail.session.url, "https://app.example.com/home");
        assert_eq!(detail.events.len(), 3);
    }

    #[test]
    fn second_batch_touches_the_same_row() {
        let mut conn = test_conn();
        append_events(&mut conn, &batch("s-1", 3), None).expect("first append");
        append_events(&mut conn, &batch("s-1", 2), None).expect("second append");

        let row_count: i64 = conn
            .query_row("SELECT COUNT(*) FROM sessions", [], |row| row.get(0))
            .expect("count");
        assert_eq!(row_count, 1, "no duplicate session row");

        let detail = get_session(&conn, "s-1").expect("session exists");
        assert_eq!(detail.session.event_count, 5);
        assert_eq!(detail.events.len(), 5);
    }

    #[test]
    fn events_keep_batch_order() {
        let mut conn = test_conn();
        let mut b = batch("s-1", 3);
        // Same timestamp for all three: seq must disambiguate.
        for event in &mut b.events {
            event.timestamp = 5_000;
        }
        b.events[2].payload = EventPayload::Scroll(ScrollData { x: 1, y: 2 });
        append_events(&mut conn, &b, None).expect("append");

        let detail = get_session(&conn, "s-1").expect("session exists");
        let seqs: Vec<i64> = detail.events.iter().map(|e| e.seq).collect();
        assert_eq!(seqs, vec![0, 1, 2]);
        assert_eq!(detail.events[2].event_type, "scroll");
    }

    #[test]
    fn append_is_atomic_on_failure() {
        let mut conn = test_conn();
        // Force the event insert to fail mid-batch.
        conn.execute_batch("DROP TABLE events;").expect("drop");

        let err = append_events(&mut conn, &batch("s-1", 3), None)
            .expect_err("append should fail without the events table");
        assert!(matches!(err, StoreError::Database(_)));

        let sessions: i64 = conn
            .query_row("SELECT COUNT(*) FROM sessions", [], |row| row.get(0))
            .expect("count");
        let visitors: i64 = conn
            .query_row("SELECT COUNT(*) FROM visitors", [], |row| row.get(0))
            .expect("count");
        assert_eq!(sessions, 0, "session insert must roll back");
        assert_eq!(visitors, 0, "visitor upsert must roll back");
    }

    #[test]
    fn visitor_visit_count_increments_on_conflict() {
        let mut conn = test_conn();
        append_events(&mut conn, &batch("s-1", 1), Some("203.0.113.7")).expect("append");
        append_events(&mut conn, &batch("s-2", 1), Some("203.0.113.7")).expect("append");

        let (rows, visits): (i64, i64) = conn
            .query_row(
                "SELECT COUNT(*), MAX(visit_count) FROM visitors",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .expect("query visitors");
        assert_eq!(rows, 1, "same fingerprint upserts one visitor");
        assert_eq!(visits, 2);
    }

    #[test]
    fn duplicate_batch_redelivery_is_tolerated() {
        let mut conn = test_conn();
        let b = batch("s-1", 3);
        append_events(&mut conn, &b, None).expect("first delivery");
        // The client re-queued after a false-negative failure.
        append_events(&mut conn, &b, None).expect("re-delivery");

        let detail = get_session(&conn, "s-1").expect("session exists");
        assert_eq!(detail.events.len(), 6, "duplicates are kept, not deduplicated");
        let sessions: i64 = conn
            .query_row("SELECT COUNT(*) FROM sessions", [], |row| row.get(0))
            .expect("count");
        assert_eq!(sessions, 1);
    }

    #[test]
    fn list_orders_by_most_recently_updated() {
        let mut conn = test_conn();
        append_events(&mut conn, &batch("older", 1), None).expect("append");
        append_events(&mut conn, &batch("newer", 1), None).expect("append");
        conn.execute(
            "UPDATE sessions SET updated_at = datetime('now', '-1 hour') WHERE session_id = 'older'",
            [],
        )
        .expect("age the older session");

        let page = list_sessions(&conn, 1, 0).expect("list");
        assert_eq!(page.total, 2);
        assert_eq!(page.sessions.len(), 1);
        assert_eq!(page.sessions[0].session_id, "newer");
        assert_eq!(page.sessions[0].visit_count, 1);

        let rest = list_sessions(&conn, 10, 1).expect("list offset");
        assert_eq!(rest.sessions.len(), 1);
        assert_eq!(rest.sessions[0].session_id, "older");
    }

    #[test]
    fn get_unknown_session_is_not_found() {
        let conn = test_conn();
        let err = get_session(&conn, "missing").expect_err("should be absent");
        assert!(matches!(err, StoreError::SessionNotFound(_)));
    }

    #[test]
    fn delete_removes_session_and_events_as_a_unit() {
        let mut conn = test_conn();
        append_events(&mut conn, &batch("s-1", 3), None).expect("append");

        delete_session(&conn, "s-1").expect("delete");

        let events: i64 = conn
            .query_row("SELECT COUNT(*) FROM events", [], |row| row.get(0))
            .expect("count");
        assert_eq!(events, 0, "events go with their session");

        let err = delete_session(&conn, "s-1").expect_err("already gone");
        assert!(matches!(err, StoreError::SessionNotFound(_)));
    }

    #[test]
    fn sweep_removes_only_sessions_past_the_horizon() {
        let mut conn = test_conn();
        append_events(&mut conn, &batch("stale", 2), None).expect("append");
        append_events(&mut conn, &batch("fresh", 2), None).expect("append");
        conn.execute(
            "UPDATE sessions SET updated_at = datetime('now', '-16 days') WHERE session_id = 'stale'",
            [],
        )
        .expect("age the stale session");
        conn.execute(
            "UPDATE sessions SET updated_at = datetime('now', '-1 day') WHERE session_id = 'fresh'",
            [],
        )
        .expect("age the fresh session");

        let deleted =
            sweep_expired(&conn, &retention_horizon(15), 1_000).expect("sweep should succeed");
        assert_eq!(deleted, 1);

        assert!(get_session(&conn, "stale").is_err(), "stale session removed");
        let fresh = get_session(&conn, "fresh").expect("fresh session kept");
        assert_eq!(fresh.events.len(), 2, "fresh events untouched");

        let orphaned: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM events WHERE session_id = 'stale'",
                [],
                |row| row.get(0),
            )
            .expect("count");
        assert_eq!(orphaned, 0, "swept session takes its events along");
    }

    #[test]
    fn sweep_batches_by_limit() {
        let mut conn = test_conn();
        for n in 0..5 {
            append_events(&mut conn, &batch(&format!("s-{n}"), 1), None).expect("append");
        }
        conn.execute(
            "UPDATE sessions SET updated_at = datetime('now', '-30 days')",
            [],
        )
        .expect("age everything");

        let horizon = retention_horizon(15);
        assert_eq!(sweep_expired(&conn, &horizon, 2).expect("sweep"), 2);
        assert_eq!(sweep_expired(&conn, &horizon, 2).expect("sweep"), 2);
        assert_eq!(sweep_expired(&conn, &horizon, 2).expect("sweep"), 1);
        assert_eq!(sweep_expired(&conn, &horizon, 2).expect("sweep"), 0);
    }
}
