//! Structural mutation watcher.

use std::cell::RefCell;
use std::rc::Rc;

use flashback_page::{DomMutation, NodeKind, ObserverHandle, Page, PageNode};
use flashback_types::{EventPayload, MutationChange, MutationData, SnapshotData};

use crate::channels::CaptureChannel;
use crate::privacy::PrivacyPolicy;
use crate::registry::NodeRegistry;
use crate::selector::selector_of;
use crate::serialize::serialize_node;
use crate::sink::EventSink;

/// Watches subtree mutations and emits the snapshot baseline followed
/// by incremental structural-mutation events.
pub struct StructuralChannel {
    handle: Option<ObserverHandle>,
}

impl StructuralChannel {
    /// Emits the structural snapshot, then begins observing mutations.
    ///
    /// The snapshot always precedes observation, establishing the
    /// baseline the mutation stream is relative to. Returns `None` when
    /// the mutation capability is unavailable (the snapshot, if any,
    /// has still been emitted).
    pub fn start(
        page: &Rc<dyn Page>,
        sink: EventSink,
        policy: Rc<PrivacyPolicy>,
        registry: Rc<RefCell<NodeRegistry>>,
    ) -> Option<Self> {
        let root = page.document();
        let snapshot = serialize_node(&root, &mut registry.borrow_mut(), &policy);
        match snapshot {
            Some(tree) => sink.push(EventPayload::StructuralSnapshot(SnapshotData {
                root: tree,
                url: page.url(),
                title: page.title(),
            })),
            None => tracing::warn!("document root is excluded, snapshot omitted"),
        }

        let cb_sink = sink.clone();
        let cb_policy = Rc::clone(&policy);
        let cb_registry = Rc::clone(&registry);
        let handle = match page.observe_mutations(Rc::new(move |mutation| {
            handle_mutation(mutation, &cb_sink, &cb_policy, &cb_registry);
        })) {
            Ok(handle) => handle,
            Err(e) => {
                tracing::warn!(channel = "structural", error = %e, "capability unavailable, channel disabled");
                return None;
            }
        };

        Some(Self {
            handle: Some(handle),
        })
    }
}

impl CaptureChannel for StructuralChannel {
    fn name(&self) -> &'static str {
        "structural"
    }

    fn stop(&mut self) {
        self.handle.take();
    }
}

fn handle_mutation(
    mutation: &DomMutation,
    sink: &EventSink,
    policy: &PrivacyPolicy,
    registry: &Rc<RefCell<NodeRegistry>>,
) {
    let target = mutation.target();
    if policy.is_excluded(target) {
        return;
    }

    let change = match mutation {
        DomMutation::ChildrenAdded { nodes, .. } => {
            let mut registry = registry.borrow_mut();
            let added: Vec<_> = nodes
                .iter()
                .filter_map(|node| serialize_node(node, &mut registry, policy))
                .collect();
            if added.is_empty() {
                // Every added node was excluded.
                return;
            }
            MutationChange::ChildList {
                added,
                removed: Vec::new(),
            }
        }
        DomMutation::ChildrenRemoved { nodes, .. } => {
            let registry = registry.borrow();
            // Nodes never observed before removal carry no identity and
            // are omitted rather than assigned one on the way out.
            let removed: Vec<_> = nodes.iter().filter_map(|node| registry.lookup(node)).collect();
            if removed.is_empty() {
                return;
            }
            MutationChange::ChildList {
                added: Vec::new(),
                removed,
            }
        }
        DomMutation::AttributeChanged {
            name,
            old_value,
            new_value,
            ..
        } => MutationChange::Attribute {
            name: name.clone(),
            old_value: old_value.clone(),
            new_value: new_value.clone(),
        },
        DomMutation::TextChanged {
            old_value,
            new_value,
            ..
        } => MutationChange::CharacterData {
            old_value: old_value.clone(),
            new_value: new_value.clone(),
        },
    };

    let target_id = registry.borrow_mut().id_of(target);
    sink.push(EventPayload::StructuralMutation(MutationData {
        target_id,
        selector: target_selector(target),
        change,
    }));
}

/// Selector for the mutation target; text nodes borrow their parent
/// element's selector.
fn target_selector(target: &PageNode) -> String {
    if target.kind() == NodeKind::Element {
        selector_of(target)
    } else {
        target.parent().map(|p| selector_of(&p)).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::DeliveryPipeline;
    use crate::testing::{queued, test_sink};
    use flashback_page::{SimPage, SimPageOptions};
    use flashback_types::{Event, PrivacyConfig, RecorderConfig};

    fn start_channel(
        page: &Rc<SimPage>,
    ) -> (
        Option<StructuralChannel>,
        Rc<RefCell<DeliveryPipeline>>,
        Rc<RefCell<NodeRegistry>>,
    ) {
        let policy = Rc::new(PrivacyPolicy::new(PrivacyConfig::default()));
        let registry = Rc::new(RefCell::new(NodeRegistry::new()));
        let (sink, pipeline) = test_sink(page, &RecorderConfig::default());
        let page_dyn: Rc<dyn Page> = Rc::clone(page) as Rc<dyn Page>;
        let channel = StructuralChannel::start(&page_dyn, sink, policy, Rc::clone(&registry));
        (channel, pipeline, registry)
    }

    fn payloads(pipeline: &Rc<RefCell<DeliveryPipeline>>) -> Vec<Event> {
        queued(pipeline)
    }

    #[test]
    fn snapshot_precedes_mutations() {
        let page = SimPage::new(SimPageOptions::default());
        let body = PageNode::element("body");
        page.document().append_child(&body);

        let (channel, pipeline, _) = start_channel(&page);
        assert!(channel.is_some());

        page.append(&body, &PageNode::element("div"));

        let events = payloads(&pipeline);
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0].payload, EventPayload::StructuralSnapshot(_)));
        assert!(matches!(events[1].payload, EventPayload::StructuralMutation(_)));
    }

    #[test]
    fn attribute_change_carries_old_and_new() {
        let page = SimPage::new(SimPageOptions::default());
        let div = PageNode::element("div");
        page.document().append_child(&div);

        let (_channel, pipeline, _) = start_channel(&page);
        page.set_attribute(&div, "class", "active");

        let events = payloads(&pipeline);
        let EventPayload::StructuralMutation(data) = &events[1].payload else {
            panic!("expected mutation");
        };
        assert!(matches!(
            &data.change,
            MutationChange::Attribute { name, old_value: None, new_value: Some(v) }
                if name == "class" && v == "active"
        ));
    }

    #[test]
    fn removal_reports_known_identifiers_only() {
        let page = SimPage::new(SimPageOptions::default());
        let body = PageNode::element("body");
        let known = PageNode::element("p");
        page.document().append_child(&body);
        body.append_child(&known);

        let (_channel, pipeline, registry) = start_channel(&page);
        let known_id = registry.borrow().lookup(&known).expect("snapshot assigned an id");

        page.remove(&body, &known);

        // A node attached without a mutation record and removed before
        // it was ever observed: it has no identity to report.
        let stranger = PageNode::element("i");
        body.append_child(&stranger);
        page.remove(&body, &stranger);

        let events = payloads(&pipeline);
        let removals: Vec<_> = events
            .iter()
            .filter_map(|e| match &e.payload {
                EventPayload::StructuralMutation(MutationData {
                    change: MutationChange::ChildList { removed, .. },
                    ..
                }) if !removed.is_empty() => Some(removed.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(removals, vec![vec![known_id]]);
    }

    #[test]
    fn excluded_subtree_produces_no_mutation_events() {
        let page = SimPage::new(SimPageOptions::default());
        let body = PageNode::element("body");
        let private = PageNode::element("section");
        private.set_attr("data-flashback-exclude", "");
        page.document().append_child(&body);
        body.append_child(&private);

        let (_channel, pipeline, _) = start_channel(&page);
        let baseline = payloads(&pipeline).len();

        // Mutations inside the excluded subtree.
        let leaf = PageNode::element("div");
        page.append(&private, &leaf);
        page.set_attribute(&leaf, "class", "x");
        page.remove(&private, &leaf);

        assert_eq!(payloads(&pipeline).len(), baseline, "no events for excluded subtree");
    }

    #[test]
    fn adding_an_excluded_node_is_invisible() {
        let page = SimPage::new(SimPageOptions::default());
        let body = PageNode::element("body");
        page.document().append_child(&body);

        let (_channel, pipeline, _) = start_channel(&page);
        let baseline = payloads(&pipeline).len();

        let private = PageNode::element("div");
        private.set_attr("data-flashback-exclude", "");
        page.append(&body, &private);

        assert_eq!(payloads(&pipeline).len(), baseline);
    }

    #[test]
    fn text_change_uses_parent_selector() {
        let page = SimPage::new(SimPageOptions::default());
        let para = PageNode::element("p");
        para.set_attr("id", "intro");
        let text = PageNode::text("before");
        page.document().append_child(&para);
        para.append_child(&text);

        let (_channel, pipeline, _) = start_channel(&page);
        page.set_text(&text, "after");

        let events = payloads(&pipeline);
        let EventPayload::StructuralMutation(data) = &events[1].payload else {
            panic!("expected mutation");
        };
        assert_eq!(data.selector, "#intro");
        assert!(matches!(
            &data.change,
            MutationChange::CharacterData { old_value, new_value }
                if old_value == "before" && new_value == "after"
        ));
    }

    #[test]
    fn unavailable_capability_disables_channel() {
        let page = SimPage::new(SimPageOptions::default());
        page.disable_capability("mutations");
        let (channel, pipeline, _) = start_channel(&page);
        assert!(channel.is_none());
        // The snapshot was still emitted before the capability check.
        assert_eq!(payloads(&pipeline).len(), 1);
    }

    #[test]
    fn stop_detaches_the_observer() {
        let page = SimPage::new(SimPageOptions::default());
        let body = PageNode::element("body");
        page.document().append_child(&body);

        let (channel, pipeline, _) = start_channel(&page);
        let mut channel = channel.expect("channel should start");
        channel.stop();

        let baseline = payloads(&pipeline).len();
        page.append(&body, &PageNode::element("div"));
        assert_eq!(payloads(&pipeline).len(), baseline);
        assert_eq!(page.observer_count(), 0);
    }
}
