//! The closed event model and batch wire format.
//!
//! Every signal the recorder captures becomes one [`Event`]: a
//! timestamp plus a payload variant from the closed [`EventPayload`]
//! union. The variant set is exhaustive by construction, which gives
//! compile-time guarantees at serialization and replay time — there is
//! no open-ended "custom event" escape hatch.

use serde::{Deserialize, Serialize};

use crate::node::{NodeId, SerializedNode};
use crate::session::ScreenSize;

/// The closed set of event kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EventKind {
    /// Full serialized DOM tree, the baseline for replay.
    StructuralSnapshot,
    /// One incremental structural, attribute, or text change.
    StructuralMutation,
    /// Throttled pointer movement.
    PointerMove,
    /// Unthrottled pointer click.
    PointerClick,
    /// Throttled scroll offset change.
    Scroll,
    /// Form control input, change, focus, or blur.
    FormInput,
    /// Throttled viewport resize.
    ViewportResize,
    /// Initial page load with navigation timing.
    PageLoad,
    /// URL change or visibility loss within one page lifetime.
    PageTransition,
    /// Recording started.
    SessionStart,
    /// Recording ended.
    SessionEnd,
}

impl EventKind {
    /// Returns the canonical string label for this kind.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::StructuralSnapshot => "structural-snapshot",
            Self::StructuralMutation => "structural-mutation",
            Self::PointerMove => "pointer-move",
            Self::PointerClick => "pointer-click",
            Self::Scroll => "scroll",
            Self::FormInput => "form-input",
            Self::ViewportResize => "viewport-resize",
            Self::PageLoad => "page-load",
            Self::PageTransition => "page-transition",
            Self::SessionStart => "session-start",
            Self::SessionEnd => "session-end",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EventKind {
    type Err = ParseEventKindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "structural-snapshot" => Ok(Self::StructuralSnapshot),
            "structural-mutation" => Ok(Self::StructuralMutation),
            "pointer-move" => Ok(Self::PointerMove),
            "pointer-click" => Ok(Self::PointerClick),
            "scroll" => Ok(Self::Scroll),
            "form-input" => Ok(Self::FormInput),
            "viewport-resize" => Ok(Self::ViewportResize),
            "page-load" => Ok(Self::PageLoad),
            "page-transition" => Ok(Self::PageTransition),
            "session-start" => Ok(Self::SessionStart),
            "session-end" => Ok(Self::SessionEnd),
            _ => Err(ParseEventKindError(s.to_string())),
        }
    }
}

/// Error returned when parsing an unknown event kind string.
#[derive(Debug, Clone)]
pub struct ParseEventKindError(pub String);

impl std::fmt::Display for ParseEventKindError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "unknown event kind: {}", self.0)
    }
}

impl std::error::Error for ParseEventKindError {}

/// Navigation timing captured with the page-load event, when available.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NavigationTiming {
    /// Milliseconds from navigation start to DOMContentLoaded.
    pub dom_content_loaded_ms: i64,
    /// Milliseconds from navigation start to the load event.
    pub load_ms: i64,
}

/// Payload of a structural-snapshot event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotData {
    /// The serialized document root.
    pub root: SerializedNode,
    /// URL of the page at snapshot time.
    pub url: String,
    /// Document title at snapshot time.
    pub title: String,
}

/// The sub-kind-specific portion of a structural mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mutation", rename_all = "kebab-case")]
pub enum MutationChange {
    /// Children were added to or removed from the target.
    #[serde(rename_all = "camelCase")]
    ChildList {
        /// Serialized subtrees of the added nodes, in insertion order.
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        added: Vec<SerializedNode>,
        /// Identifiers of removed nodes. Nodes never observed before
        /// removal are omitted.
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        removed: Vec<NodeId>,
    },
    /// An attribute on the target changed.
    #[serde(rename_all = "camelCase")]
    Attribute {
        /// Attribute name.
        name: String,
        /// Previous value, absent when the attribute was added.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        old_value: Option<String>,
        /// New value, absent when the attribute was removed.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        new_value: Option<String>,
    },
    /// The character data of a text node changed.
    #[serde(rename_all = "camelCase")]
    CharacterData {
        /// Previous character data.
        old_value: String,
        /// New character data.
        new_value: String,
    },
}

/// Payload of a structural-mutation event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MutationData {
    /// Identifier of the mutation target.
    pub target_id: NodeId,
    /// Best-effort selector for the target.
    pub selector: String,
    /// The sub-kind-specific change.
    #[serde(flatten)]
    pub change: MutationChange,
}

/// Payload of a pointer-move event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PointerMoveData {
    pub x: i32,
    pub y: i32,
}

/// Payload of a pointer-click event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClickData {
    pub x: i32,
    pub y: i32,
    /// Button index, 0 = primary.
    pub button: u8,
    /// Best-effort selector for the clicked element.
    pub selector: String,
    /// Lowercase tag name of the clicked element.
    pub tag: String,
    /// Truncated text preview of the clicked element, at most 50 chars.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

/// Payload of a scroll event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScrollData {
    pub x: i32,
    pub y: i32,
}

/// The action-specific portion of a form-input event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "kebab-case")]
pub enum FormAction {
    /// A text-like control received input.
    #[serde(rename_all = "camelCase")]
    Input {
        /// Current value, masked when the redaction policy requires it.
        value: String,
        /// Whether the value above is a mask rather than the real value.
        masked: bool,
        /// Selection range start, when known.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        selection_start: Option<u32>,
        /// Selection range end, when known.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        selection_end: Option<u32>,
    },
    /// A checkbox or radio changed state.
    Toggle { checked: bool },
    /// A select element changed its selection.
    #[serde(rename_all = "camelCase")]
    Select {
        selected_index: i64,
        selected_text: String,
    },
    /// A form control received focus. Carries no value.
    Focus,
    /// A form control lost focus. Carries no value.
    Blur,
}

/// Payload of a form-input event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormData {
    /// Best-effort selector for the control.
    pub selector: String,
    /// Lowercase tag name of the control.
    pub tag: String,
    /// The action-specific payload.
    #[serde(flatten)]
    pub action: FormAction,
}

/// Payload of a viewport-resize event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewportResizeData {
    pub width: u32,
    pub height: u32,
}

/// Why a page-transition event was emitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TransitionCause {
    /// History push navigation.
    Push,
    /// History replace navigation.
    Replace,
    /// Back/forward (popstate) navigation.
    Pop,
    /// Fragment-only navigation.
    HashChange,
    /// The page became hidden without a URL change.
    Hidden,
}

/// Payload of a page-transition event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransitionData {
    pub from_url: String,
    pub to_url: String,
    pub cause: TransitionCause,
}

/// Payload of a page-load event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageLoadData {
    pub url: String,
    pub title: String,
    pub referrer: String,
    /// Navigation timing, when the page exposes it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timing: Option<NavigationTiming>,
}

/// Payload of a session-start event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStartData {
    pub url: String,
    pub title: String,
    pub referrer: String,
}

/// Why a session-end event was emitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SessionEndReason {
    /// The page is unloading.
    Unload,
    /// The embedder stopped the recorder explicitly.
    Stopped,
}

/// Payload of a session-end event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionEndData {
    pub reason: SessionEndReason,
}

/// The payload union, one variant per [`EventKind`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "kebab-case")]
pub enum EventPayload {
    StructuralSnapshot(SnapshotData),
    StructuralMutation(MutationData),
    PointerMove(PointerMoveData),
    PointerClick(ClickData),
    Scroll(ScrollData),
    FormInput(FormData),
    ViewportResize(ViewportResizeData),
    PageLoad(PageLoadData),
    PageTransition(TransitionData),
    SessionStart(SessionStartData),
    SessionEnd(SessionEndData),
}

impl EventPayload {
    /// Returns the kind of this payload.
    pub fn kind(&self) -> EventKind {
        match self {
            Self::StructuralSnapshot(_) => EventKind::StructuralSnapshot,
            Self::StructuralMutation(_) => EventKind::StructuralMutation,
            Self::PointerMove(_) => EventKind::PointerMove,
            Self::PointerClick(_) => EventKind::PointerClick,
            Self::Scroll(_) => EventKind::Scroll,
            Self::FormInput(_) => EventKind::FormInput,
            Self::ViewportResize(_) => EventKind::ViewportResize,
            Self::PageLoad(_) => EventKind::PageLoad,
            Self::PageTransition(_) => EventKind::PageTransition,
            Self::SessionStart(_) => EventKind::SessionStart,
            Self::SessionEnd(_) => EventKind::SessionEnd,
        }
    }
}

/// One captured event: a millisecond timestamp plus a typed payload.
///
/// Ordering within a session is timestamp-ascending as produced; the
/// transport must not reorder a batch's internal sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Capture time in milliseconds.
    pub timestamp: i64,
    /// The typed payload.
    #[serde(flatten)]
    pub payload: EventPayload,
}

impl Event {
    /// Returns the kind of this event.
    pub fn kind(&self) -> EventKind {
        self.payload.kind()
    }
}

/// Metadata attached to every delivered batch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchMeta {
    pub user_agent: String,
    pub language: String,
    pub screen: ScreenSize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub viewport: Option<ScreenSize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub referrer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
}

/// The wire format posted by the delivery pipeline to the collector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventBatch {
    /// Session this batch belongs to.
    pub session_id: String,
    /// The events, in enqueue order.
    pub events: Vec<Event>,
    /// Flush time in milliseconds.
    pub timestamp: i64,
    /// Current page metadata.
    pub meta: BatchMeta,
}

/// Collector response to a successful batch post.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectResponse {
    pub success: bool,
    pub events_received: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_kind_round_trips_through_str() {
        for kind in [
            EventKind::StructuralSnapshot,
            EventKind::StructuralMutation,
            EventKind::PointerMove,
            EventKind::PointerClick,
            EventKind::Scroll,
            EventKind::FormInput,
            EventKind::ViewportResize,
            EventKind::PageLoad,
            EventKind::PageTransition,
            EventKind::SessionStart,
            EventKind::SessionEnd,
        ] {
            let parsed: EventKind = kind.as_str().parse().expect("label should parse back");
            assert_eq!(parsed, kind);
        }
        assert!("not-a-kind".parse::<EventKind>().is_err());
    }

    #[test]
    fn event_serializes_with_type_and_data() {
        let event = Event {
            timestamp: 1234,
            payload: EventPayload::PointerMove(PointerMoveData { x: 10, y: 20 }),
        };
        let json = serde_json::to_value(&event).expect("should serialize");
        assert_eq!(json["type"], "pointer-move");
        assert_eq!(json["timestamp"], 1234);
        assert_eq!(json["data"]["x"], 10);
    }

    #[test]
    fn mutation_change_is_tagged_by_sub_kind() {
        let data = MutationData {
            target_id: 7,
            selector: "div > p".to_string(),
            change: MutationChange::Attribute {
                name: "class".to_string(),
                old_value: None,
                new_value: Some("active".to_string()),
            },
        };
        let json = serde_json::to_value(&data).expect("should serialize");
        assert_eq!(json["mutation"], "attribute");
        assert_eq!(json["targetId"], 7);
        assert_eq!(json["newValue"], "active");
        assert!(json.get("oldValue").is_none());
    }

    #[test]
    fn form_action_unit_variants_round_trip() {
        let data = FormData {
            selector: "#email".to_string(),
            tag: "input".to_string(),
            action: FormAction::Focus,
        };
        let json = serde_json::to_string(&data).expect("should serialize");
        let restored: FormData = serde_json::from_str(&json).expect("should deserialize");
        assert_eq!(restored.action, FormAction::Focus);
    }

    #[test]
    fn batch_uses_camel_case_on_the_wire() {
        let batch = EventBatch {
            session_id: "s-1".to_string(),
            events: vec![Event {
                timestamp: 1,
                payload: EventPayload::SessionEnd(SessionEndData {
                    reason: SessionEndReason::Stopped,
                }),
            }],
            timestamp: 2,
            meta: BatchMeta {
                user_agent: "test-agent".to_string(),
                ..BatchMeta::default()
            },
        };
        let json = serde_json::to_value(&batch).expect("should serialize");
        assert_eq!(json["sessionId"], "s-1");
        assert_eq!(json["meta"]["userAgent"], "test-agent");
        assert_eq!(json["events"][0]["data"]["reason"], "stopped");
    }

    #[test]
    fn payload_kind_matches_wire_tag() {
        let payload = EventPayload::Scroll(ScrollData { x: 0, y: 300 });
        let json = serde_json::to_value(&payload).expect("should serialize");
        assert_eq!(json["type"], payload.kind().as_str());
    }
}
