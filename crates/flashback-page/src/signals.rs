//! Raw page signals and observer plumbing.

use crate::node::PageNode;

/// A structural change reported by the page's mutation source.
#[derive(Debug, Clone)]
pub enum DomMutation {
    /// Nodes were appended under `target`.
    ChildrenAdded {
        target: PageNode,
        nodes: Vec<PageNode>,
    },
    /// Nodes were removed from under `target`. The handles remain valid
    /// for the duration of the callback so observers can resolve
    /// identities before the nodes are dropped.
    ChildrenRemoved {
        target: PageNode,
        nodes: Vec<PageNode>,
    },
    /// An attribute on `target` changed. `old_value`/`new_value` are
    /// `None` for additions and removals respectively.
    AttributeChanged {
        target: PageNode,
        name: String,
        old_value: Option<String>,
        new_value: Option<String>,
    },
    /// The character data of a text node changed.
    TextChanged {
        target: PageNode,
        old_value: String,
        new_value: String,
    },
}

impl DomMutation {
    /// The node the mutation applies to.
    pub fn target(&self) -> &PageNode {
        match self {
            Self::ChildrenAdded { target, .. }
            | Self::ChildrenRemoved { target, .. }
            | Self::AttributeChanged { target, .. }
            | Self::TextChanged { target, .. } => target,
        }
    }
}

/// Pointer, scroll, and viewport signals.
#[derive(Debug, Clone)]
pub enum PointerSignal {
    Move {
        x: i32,
        y: i32,
    },
    Click {
        target: PageNode,
        x: i32,
        y: i32,
        button: u8,
    },
    Scroll {
        x: i32,
        y: i32,
    },
    Resize {
        width: u32,
        height: u32,
    },
}

/// Form control signals.
#[derive(Debug, Clone)]
pub enum FormSignal {
    /// A control received input; `selection` is the caret range when
    /// the control exposes one.
    Input {
        target: PageNode,
        selection: Option<(u32, u32)>,
    },
    /// A control committed a change (checkbox toggle, select pick).
    Change { target: PageNode },
    Focus { target: PageNode },
    Blur { target: PageNode },
}

impl FormSignal {
    /// The control the signal applies to.
    pub fn target(&self) -> &PageNode {
        match self {
            Self::Input { target, .. }
            | Self::Change { target }
            | Self::Focus { target }
            | Self::Blur { target } => target,
        }
    }
}

/// URL change signals.
#[derive(Debug, Clone)]
pub enum HistorySignal {
    Push { url: String },
    Replace { url: String },
    Pop { url: String },
    HashChange { url: String },
}

impl HistorySignal {
    /// The URL after the navigation.
    pub fn url(&self) -> &str {
        match self {
            Self::Push { url } | Self::Replace { url } | Self::Pop { url } | Self::HashChange { url } => {
                url
            }
        }
    }
}

/// Page lifecycle signals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleSignal {
    /// The page became hidden (tab switch, minimize).
    Hidden,
    /// The page is unloading.
    Unload,
}

/// Returned when a page capability cannot be provided (the underlying
/// browser API is unavailable). Channels treat this as a missing
/// feature, not a fatal error.
#[derive(Debug, Clone, thiserror::Error)]
#[error("page capability '{0}' is unavailable")]
pub struct CapabilityError(pub &'static str);

/// An active observation. Dropping (or explicitly detaching) the handle
/// unsubscribes the observer — there is no global state left behind.
pub struct ObserverHandle {
    detach: Option<Box<dyn FnOnce()>>,
}

impl ObserverHandle {
    /// Wraps an unsubscribe action.
    pub fn new(detach: impl FnOnce() + 'static) -> Self {
        Self {
            detach: Some(Box::new(detach)),
        }
    }

    /// Explicitly unsubscribes. Equivalent to dropping the handle.
    pub fn detach(mut self) {
        if let Some(detach) = self.detach.take() {
            detach();
        }
    }
}

impl Drop for ObserverHandle {
    fn drop(&mut self) {
        if let Some(detach) = self.detach.take() {
            detach();
        }
    }
}

impl std::fmt::Debug for ObserverHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObserverHandle")
            .field("active", &self.detach.is_some())
            .finish()
    }
}
