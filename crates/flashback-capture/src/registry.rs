//! Stable node identity for one recording session.

use std::collections::HashMap;

use flashback_page::{PageNode, WeakPageNode};
use flashback_types::NodeId;

/// Entries below this count are never compacted; above it, compaction
/// runs whenever the table has doubled since the last pass.
const COMPACT_FLOOR: usize = 1_024;

struct RegistryEntry {
    id: NodeId,
    node: WeakPageNode,
}

/// Assigns and looks up session-scoped integer identifiers for DOM
/// nodes.
///
/// The table is keyed by node allocation address and holds only weak
/// handles, so it never keeps a detached node alive. Identifiers are
/// monotonic and never reused within a session. Dead entries are
/// reclaimed opportunistically as the table grows.
pub struct NodeRegistry {
    entries: HashMap<usize, RegistryEntry>,
    next_id: NodeId,
    compact_at: usize,
}

impl Default for NodeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
            next_id: 1,
            compact_at: COMPACT_FLOOR,
        }
    }

    /// Returns the identifier for `node`, allocating one on first
    /// observation. Always succeeds.
    pub fn id_of(&mut self, node: &PageNode) -> NodeId {
        let key = node.ptr_id();

        // An allocation address can be reused after the previous node
        // at that address was dropped; trust the entry only while its
        // weak handle still resolves to the same node.
        if let Some(entry) = self.entries.get(&key) {
            match entry.node.upgrade() {
                Some(live) if live.same_node(node) => return entry.id,
                _ => {}
            }
        }

        let id = self.next_id;
        self.next_id += 1;
        self.entries.insert(
            key,
            RegistryEntry {
                id,
                node: node.downgrade(),
            },
        );

        if self.entries.len() >= self.compact_at {
            self.compact();
        }

        id
    }

    /// Returns the identifier previously assigned to `node`, without
    /// allocating. Used for removed nodes, which should never receive a
    /// fresh identity on their way out.
    pub fn lookup(&self, node: &PageNode) -> Option<NodeId> {
        self.entries.get(&node.ptr_id()).and_then(|entry| {
            let live = entry.node.upgrade()?;
            live.same_node(node).then_some(entry.id)
        })
    }

    /// Drops entries whose nodes are gone.
    pub fn compact(&mut self) {
        self.entries
            .retain(|_, entry| entry.node.upgrade().is_some());
        self.compact_at = (self.entries.len() * 2).max(COMPACT_FLOOR);
    }

    /// Number of live and dead entries currently in the table.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the registry has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
