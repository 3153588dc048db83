//! Best-effort CSS-like selector derivation.

use flashback_page::{NodeKind, PageNode};

/// How many ancestor levels the path walk covers before giving up.
const MAX_DEPTH: usize = 5;

/// How many class tokens a path segment carries.
const MAX_CLASSES: usize = 2;

/// Derives a CSS-like path for an element.
///
/// An element with an id resolves to `#id` immediately (ids are assumed
/// page-unique). Otherwise the path walks up to five ancestor levels,
/// each segment combining the lowercase tag name, up to two class
/// tokens, and an `:nth-of-type` disambiguator only when the element
/// has same-tag siblings.
///
/// This is a heuristic, not a guaranteed-unique selector — replay must
/// tolerate a selector resolving to zero or multiple elements.
pub fn selector_of(element: &PageNode) -> String {
    if element.kind() != NodeKind::Element {
        return String::new();
    }
    if let Some(id) = element.id_attr() {
        return format!("#{id}");
    }

    let mut segments = Vec::new();
    let mut current = Some(element.clone());

    while let Some(node) = current {
        if node.kind() != NodeKind::Element {
            break;
        }
        segments.push(segment_for(&node));
        if segments.len() >= MAX_DEPTH {
            break;
        }
        current = node.parent();
    }

    segments.reverse();
    segments.join(" > ")
}

fn segment_for(node: &PageNode) -> String {
    let mut segment = node.name();

    for class in node.class_list().into_iter().take(MAX_CLASSES) {
        segment.push('.');
        segment.push_str(&class);
    }

    let (position, count) = node.nth_of_type();
    if count > 1 {
        segment.push_str(&format!(":nth-of-type({position})"));
    }

    segment
}
