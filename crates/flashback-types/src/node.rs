//! Serialized DOM tree types.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Stable identifier for a DOM node within one recording session.
///
/// Assigned the first time a node is observed, monotonically increasing,
/// never reused within a session. Not stable across sessions or full page
/// reloads — a new snapshot establishes a new numbering.
pub type NodeId = u64;

/// A node captured from the live DOM, suitable for transmission and
/// reconstruction.
///
/// Every node carries the identifier it was assigned at capture time so
/// that subsequent mutation events can address it. Attribute maps use
/// `BTreeMap` for deterministic wire output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SerializedNode {
    /// An element node with tag name, attributes, and children.
    #[serde(rename_all = "camelCase")]
    Element {
        /// Session-scoped node identifier.
        id: NodeId,
        /// Lowercase tag name.
        name: String,
        /// Attribute map, captured verbatim.
        #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
        attrs: BTreeMap<String, String>,
        /// Child nodes in document order.
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        children: Vec<SerializedNode>,
        /// Live value of a form control, captured through the masking path.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        value: Option<String>,
        /// Selected index for `<select>` elements.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        selected_index: Option<i64>,
    },
    /// A text node with its character data, verbatim.
    Text {
        /// Session-scoped node identifier.
        id: NodeId,
        /// Character data.
        value: String,
    },
    /// A comment node with its character data, verbatim.
    Comment {
        /// Session-scoped node identifier.
        id: NodeId,
        /// Character data.
        value: String,
    },
}

impl SerializedNode {
    /// Returns the identifier assigned to this node at capture time.
    pub fn id(&self) -> NodeId {
        match self {
            Self::Element { id, .. } | Self::Text { id, .. } | Self::Comment { id, .. } => *id,
        }
    }

    /// Depth-first search for a node by identifier.
    pub fn find(&self, target: NodeId) -> Option<&SerializedNode> {
        if self.id() == target {
            return Some(self);
        }
        if let Self::Element { children, .. } = self {
            for child in children {
                if let Some(found) = child.find(target) {
                    return Some(found);
                }
            }
        }
        None
    }

    /// Counts the nodes in this subtree, including this node.
    pub fn node_count(&self) -> usize {
        match self {
            Self::Element { children, .. } => {
                1 + children.iter().map(SerializedNode::node_count).sum::<usize>()
            }
            _ => 1,
        }
    }
}
