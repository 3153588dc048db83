//! Live node → [`SerializedNode`] conversion.

use flashback_page::{NodeKind, PageNode};
use flashback_types::SerializedNode;

use crate::privacy::PrivacyPolicy;
use crate::registry::NodeRegistry;

/// Serializes a node and its subtree.
///
/// Returns `None` when the node, or any of its ancestors, is excluded
/// by the redaction policy — an excluded subtree contributes nothing to
/// the serialized tree. Attributes and character data are captured
/// verbatim; only the live value of form controls passes through the
/// masking path, the same path live input events use.
pub fn serialize_node(
    node: &PageNode,
    registry: &mut NodeRegistry,
    policy: &PrivacyPolicy,
) -> Option<SerializedNode> {
    if policy.is_excluded(node) {
        return None;
    }
    serialize_checked(node, registry, policy)
}

/// Recursive worker: ancestors are known to be unexcluded, so only the
/// node's own exclusion attribute is checked per level.
fn serialize_checked(
    node: &PageNode,
    registry: &mut NodeRegistry,
    policy: &PrivacyPolicy,
) -> Option<SerializedNode> {
    match node.kind() {
        NodeKind::Element => {
            if policy.is_excluded_self(node) {
                return None;
            }
            let id = registry.id_of(node);
            let (value, selected_index) = captured_control_state(node, policy);
            let children = node
                .children()
                .iter()
                .filter_map(|child| serialize_checked(child, registry, policy))
                .collect();

            Some(SerializedNode::Element {
                id,
                name: node.name(),
                attrs: node.attrs(),
                children,
                value,
                selected_index,
            })
        }
        NodeKind::Text => Some(SerializedNode::Text {
            id: registry.id_of(node),
            value: node.value(),
        }),
        NodeKind::Comment => Some(SerializedNode::Comment {
            id: registry.id_of(node),
            value: node.value(),
        }),
    }
}

/// Captures a form control's live value through the masking path.
///
/// Returns `(value, selected_index)`; both `None` for non-controls.
/// The boolean-valued helper [`captured_value`] is shared with the form
/// watcher so snapshot and live capture can never disagree on masking.
fn captured_control_state(node: &PageNode, policy: &PrivacyPolicy) -> (Option<String>, Option<i64>) {
    if !node.is_form_control() {
        return (None, None);
    }
    let (value, _masked) = captured_value(node, policy);
    let selected_index = (node.name() == "select").then(|| node.selected_index());
    (Some(value), selected_index)
}

/// The single path every capture site uses to read a control's value:
/// returns the masked-or-verbatim value and whether masking applied.
pub fn captured_value(node: &PageNode, policy: &PrivacyPolicy) -> (String, bool) {
    let raw = node.value();
    if policy.should_mask(node) {
        (policy.mask_value(&raw), true)
    } else {
        (raw, false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flashback_types::PrivacyConfig;

    fn setup() -> (NodeRegistry, PrivacyPolicy) {
        (NodeRegistry::new(), PrivacyPolicy::new(PrivacyConfig::default()))
    }

    fn build_form() -> (PageNode, PageNode, PageNode) {
        let form = PageNode::element("form");
        let name = PageNode::element("input");
        name.set_attr("name", "username");
        name.set_value("ada");
        let secret = PageNode::element("input");
        secret.set_attr("type", "password");
        secret.set_value("hunter2!");
        form.append_child(&name);
        form.append_child(&secret);
        (form, name, secret)
    }

    #[test]
    fn captures_structure_in_document_order() {
        let (mut registry, policy) = setup();
        let (form, ..) = build_form();

        let tree = serialize_node(&form, &mut registry, &policy).expect("form is not excluded");
        match &tree {
            SerializedNode::Element { name, children, .. } => {
                assert_eq!(name, "form");
                assert_eq!(children.len(), 2);
            }
            other => panic!("unexpected node: {other:?}"),
        }
    }

    #[test]
    fn live_values_pass_through_masking() {
        let (mut registry, policy) = setup();
        let (form, ..) = build_form();

        let tree = serialize_node(&form, &mut registry, &policy).expect("form is not excluded");
        let SerializedNode::Element { children, .. } = &tree else {
            panic!("expected element");
        };
        let values: Vec<Option<String>> = children
            .iter()
            .map(|c| match c {
                SerializedNode::Element { value, .. } => value.clone(),
                _ => None,
            })
            .collect();
        assert_eq!(values[0].as_deref(), Some("ada"), "plain value verbatim");
        assert_eq!(values[1].as_deref(), Some("********"), "password masked");
    }

    #[test]
    fn attributes_are_not_masked() {
        let (mut registry, policy) = setup();
        let input = PageNode::element("input");
        input.set_attr("type", "password");
        input.set_attr("placeholder", "Password");
        input.set_value("s3cret");

        let tree = serialize_node(&input, &mut registry, &policy).expect("not excluded");
        let SerializedNode::Element { attrs, value, .. } = &tree else {
            panic!("expected element");
        };
        assert_eq!(attrs.get("placeholder").map(String::as_str), Some("Password"));
        assert_eq!(value.as_deref(), Some("******"));
    }

    #[test]
    fn excluded_subtree_contributes_nothing() {
        let (mut registry, policy) = setup();
        let wrap = PageNode::element("div");
        let private = PageNode::element("section");
        private.set_attr("data-flashback-exclude", "");
        private.append_child(&PageNode::text("hidden"));
        wrap.append_child(&private);
        wrap.append_child(&PageNode::text("visible"));

        let tree = serialize_node(&wrap, &mut registry, &policy).expect("wrap is not excluded");
        let SerializedNode::Element { children, .. } = &tree else {
            panic!("expected element");
        };
        assert_eq!(children.len(), 1);
        assert!(matches!(&children[0], SerializedNode::Text { value, .. } if value == "visible"));
    }

    #[test]
    fn serializing_under_an_excluded_ancestor_returns_none() {
        let (mut registry, policy) = setup();
        let outer = PageNode::element("div");
        outer.set_attr("data-flashback-exclude", "");
        let inner = PageNode::element("p");
        outer.append_child(&inner);

        assert!(serialize_node(&inner, &mut registry, &policy).is_none());
    }

    #[test]
    fn select_captures_selected_index() {
        let (mut registry, policy) = setup();
        let select = PageNode::element("select");
        for label in ["a", "b"] {
            let option = PageNode::element("option");
            option.append_child(&PageNode::text(label));
            select.append_child(&option);
        }
        select.set_selected_index(1);

        let tree = serialize_node(&select, &mut registry, &policy).expect("not excluded");
        let SerializedNode::Element { selected_index, .. } = &tree else {
            panic!("expected element");
        };
        assert_eq!(*selected_index, Some(1));
    }

    #[test]
    fn reserializing_reuses_identifiers() {
        let (mut registry, policy) = setup();
        let div = PageNode::element("div");
        let first = serialize_node(&div, &mut registry, &policy).expect("not excluded");
        let second = serialize_node(&div, &mut registry, &policy).expect("not excluded");
        assert_eq!(first.id(), second.id());
    }
}
