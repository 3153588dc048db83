//! Live DOM node handles.
//!
//! A [`PageNode`] is a cheaply-clonable handle (`Rc`) to one node of
//! the mirrored DOM tree. Parent links are weak, so dropping every
//! strong handle to a detached subtree actually frees it — which is
//! what lets the identity registry hold weak associations that never
//! extend a node's lifetime.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::{Rc, Weak};

/// The node kinds the capture layer distinguishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Element,
    Text,
    Comment,
}

#[derive(Debug)]
struct NodeData {
    kind: NodeKind,
    /// Lowercase tag name for elements, `#text` / `#comment` otherwise.
    name: String,
    attrs: BTreeMap<String, String>,
    /// Character data for text/comment nodes; live value for form
    /// controls.
    value: String,
    checked: bool,
    /// Selected index for `<select>`; -1 when nothing is selected.
    selected_index: i64,
    parent: Option<WeakPageNode>,
    children: Vec<PageNode>,
}

/// A strong handle to a live node.
#[derive(Debug, Clone)]
pub struct PageNode(Rc<RefCell<NodeData>>);

/// A weak handle to a live node; upgrades fail once the node is gone.
#[derive(Debug, Clone)]
pub struct WeakPageNode(Weak<RefCell<NodeData>>);

impl WeakPageNode {
    /// Attempts to upgrade back to a strong handle.
    pub fn upgrade(&self) -> Option<PageNode> {
        self.0.upgrade().map(PageNode)
    }
}

impl PageNode {
    fn new(kind: NodeKind, name: String, value: String) -> Self {
        Self(Rc::new(RefCell::new(NodeData {
            kind,
            name,
            attrs: BTreeMap::new(),
            value,
            checked: false,
            selected_index: -1,
            parent: None,
            children: Vec::new(),
        })))
    }

    /// Creates a detached element node. Tag names are lowercased.
    pub fn element(tag: &str) -> Self {
        Self::new(NodeKind::Element, tag.to_ascii_lowercase(), String::new())
    }

    /// Creates a detached text node.
    pub fn text(data: &str) -> Self {
        Self::new(NodeKind::Text, "#text".to_string(), data.to_string())
    }

    /// Creates a detached comment node.
    pub fn comment(data: &str) -> Self {
        Self::new(NodeKind::Comment, "#comment".to_string(), data.to_string())
    }

    /// Returns the node kind.
    pub fn kind(&self) -> NodeKind {
        self.0.borrow().kind
    }

    /// Returns the node name (lowercase tag, `#text`, or `#comment`).
    pub fn name(&self) -> String {
        self.0.borrow().name.clone()
    }

    /// Identity of the underlying allocation. Unique among live nodes;
    /// may be reused after a node is dropped, so pair it with a weak
    /// handle when used as a map key.
    pub fn ptr_id(&self) -> usize {
        Rc::as_ptr(&self.0) as usize
    }

    /// Returns a weak handle to this node.
    pub fn downgrade(&self) -> WeakPageNode {
        WeakPageNode(Rc::downgrade(&self.0))
    }

    /// Whether two handles refer to the same node.
    pub fn same_node(&self, other: &PageNode) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Returns an attribute value.
    pub fn attr(&self, name: &str) -> Option<String> {
        self.0.borrow().attrs.get(name).cloned()
    }

    /// Whether the attribute is present.
    pub fn has_attr(&self, name: &str) -> bool {
        self.0.borrow().attrs.contains_key(name)
    }

    /// Snapshot of the attribute map.
    pub fn attrs(&self) -> BTreeMap<String, String> {
        self.0.borrow().attrs.clone()
    }

    /// Sets an attribute, returning the previous value.
    pub fn set_attr(&self, name: &str, value: &str) -> Option<String> {
        self.0
            .borrow_mut()
            .attrs
            .insert(name.to_string(), value.to_string())
    }

    /// Removes an attribute, returning the previous value.
    pub fn remove_attr(&self, name: &str) -> Option<String> {
        self.0.borrow_mut().attrs.remove(name)
    }

    /// Character data or live form value.
    pub fn value(&self) -> String {
        self.0.borrow().value.clone()
    }

    /// Replaces the character data or live form value.
    pub fn set_value(&self, value: &str) {
        self.0.borrow_mut().value = value.to_string();
    }

    /// Checked state for checkbox/radio controls.
    pub fn checked(&self) -> bool {
        self.0.borrow().checked
    }

    /// Sets the checked state.
    pub fn set_checked(&self, checked: bool) {
        self.0.borrow_mut().checked = checked;
    }

    /// Selected index for `<select>`; -1 when nothing is selected.
    pub fn selected_index(&self) -> i64 {
        self.0.borrow().selected_index
    }

    /// Sets the selected index.
    pub fn set_selected_index(&self, index: i64) {
        self.0.borrow_mut().selected_index = index;
    }

    /// Text content of the selected `<option>` child, for `<select>`.
    pub fn selected_text(&self) -> Option<String> {
        let index = self.selected_index();
        if index < 0 {
            return None;
        }
        self.children()
            .iter()
            .filter(|c| c.kind() == NodeKind::Element && c.name() == "option")
            .nth(index as usize)
            .map(|option| option.text_content())
    }

    /// Snapshot of the child handles, in document order.
    pub fn children(&self) -> Vec<PageNode> {
        self.0.borrow().children.clone()
    }

    /// Returns the parent node, if attached.
    pub fn parent(&self) -> Option<PageNode> {
        self.0.borrow().parent.as_ref().and_then(WeakPageNode::upgrade)
    }

    /// Appends a child, detaching it from any previous parent first.
    pub fn append_child(&self, child: &PageNode) {
        if let Some(old_parent) = child.parent() {
            old_parent.remove_child(child);
        }
        child.0.borrow_mut().parent = Some(self.downgrade());
        self.0.borrow_mut().children.push(child.clone());
    }

    /// Removes a child. Returns false when `child` was not a child of
    /// this node.
    pub fn remove_child(&self, child: &PageNode) -> bool {
        let mut data = self.0.borrow_mut();
        let before = data.children.len();
        data.children.retain(|c| !c.same_node(child));
        let removed = data.children.len() < before;
        if removed {
            child.0.borrow_mut().parent = None;
        }
        removed
    }

    /// Concatenated text content of this subtree.
    pub fn text_content(&self) -> String {
        match self.kind() {
            NodeKind::Text => self.value(),
            NodeKind::Comment => String::new(),
            NodeKind::Element => {
                let mut out = String::new();
                for child in self.children() {
                    out.push_str(&child.text_content());
                }
                out
            }
        }
    }

    /// The `id` attribute, when present and non-empty.
    pub fn id_attr(&self) -> Option<String> {
        self.attr("id").filter(|id| !id.is_empty())
    }

    /// Class tokens from the `class` attribute.
    pub fn class_list(&self) -> Vec<String> {
        self.attr("class")
            .map(|c| c.split_whitespace().map(str::to_string).collect())
            .unwrap_or_default()
    }

    /// Whether this element is a form control the form watcher tracks.
    pub fn is_form_control(&self) -> bool {
        self.kind() == NodeKind::Element
            && matches!(self.name().as_str(), "input" | "textarea" | "select")
    }

    /// The `type` attribute lowercased, defaulting to `text`.
    pub fn input_type(&self) -> String {
        self.attr("type")
            .map(|t| t.to_ascii_lowercase())
            .unwrap_or_else(|| "text".to_string())
    }

    /// 1-based position among same-tag siblings and the total count of
    /// same-tag siblings (including this node). `(1, 1)` for detached
    /// nodes or only children.
    pub fn nth_of_type(&self) -> (usize, usize) {
        let Some(parent) = self.parent() else {
            return (1, 1);
        };
        let tag = self.name();
        let mut position = 0;
        let mut count = 0;
        for sibling in parent.children() {
            if sibling.kind() == NodeKind::Element && sibling.name() == tag {
                count += 1;
                if sibling.same_node(self) {
                    position = count;
                }
            }
        }
        if count == 0 {
            (1, 1)
        } else {
            (position, count)
        }
    }
}
