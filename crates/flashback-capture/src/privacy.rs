//! Redaction and exclusion policy.
//!
//! Masking redacts a captured value while still recording that the
//! interaction happened; exclusion suppresses capture entirely for an
//! element and its whole subtree. Both are evaluated at the point of
//! observation by every channel, so a subtree excluded from snapshots
//! is equally invisible to mutation, click, and form capture.

use flashback_page::{NodeKind, PageNode};
use flashback_types::PrivacyConfig;

/// The character a masked value is composed of.
const MASK_CHAR: char = '*';

/// Masked values never exceed this many characters. Values shorter than
/// the cap leak their approximate length; an accepted trade-off.
const MASK_LEN_CAP: usize = 20;

/// Input `type`/`autocomplete` values that are always sensitive.
const SENSITIVE_TYPES: &[&str] = &[
    "password",
    "email",
    "tel",
    "current-password",
    "new-password",
    "one-time-code",
    "cc-number",
    "cc-csc",
    "cc-exp",
];

/// Case-insensitive substrings of name/id/placeholder that mark a
/// control as sensitive.
const SENSITIVE_PATTERNS: &[&str] = &[
    "passw", "pwd", "secret", "token", "card", "cvv", "cvc", "ccnum", "ssn", "social", "pin",
    "security", "iban", "routing", "license",
];

/// Decides masking and exclusion for captured elements.
#[derive(Debug, Clone)]
pub struct PrivacyPolicy {
    config: PrivacyConfig,
}

impl PrivacyPolicy {
    pub fn new(config: PrivacyConfig) -> Self {
        Self { config }
    }

    /// Whether this element's captured value must be masked.
    ///
    /// First match wins: mask-everything, then the explicit mask
    /// attribute, then the sensitive-type and sensitive-pattern sets.
    pub fn should_mask(&self, element: &PageNode) -> bool {
        if self.config.mask_all_inputs {
            return true;
        }
        if element.has_attr(&self.config.mask_attribute) {
            return true;
        }
        if !self.config.mask_sensitive_inputs {
            return false;
        }

        let input_type = element.input_type();
        if SENSITIVE_TYPES.contains(&input_type.as_str()) {
            return true;
        }
        if let Some(autocomplete) = element.attr("autocomplete") {
            if SENSITIVE_TYPES.contains(&autocomplete.to_ascii_lowercase().as_str()) {
                return true;
            }
        }

        for attr in ["name", "id", "placeholder"] {
            if let Some(value) = element.attr(attr) {
                let lowered = value.to_ascii_lowercase();
                if SENSITIVE_PATTERNS.iter().any(|p| lowered.contains(p)) {
                    return true;
                }
            }
        }

        false
    }

    /// Replaces a value with the fixed mask character, length-capped.
    /// Counts characters, not bytes, so multibyte input never yields a
    /// longer mask than the original had characters.
    pub fn mask_value(&self, value: &str) -> String {
        let len = value.chars().count().min(MASK_LEN_CAP);
        MASK_CHAR.to_string().repeat(len)
    }

    /// Whether the element or any ancestor carries the exclusion
    /// attribute. Authoritative: an excluded subtree yields zero events
    /// of any kind.
    pub fn is_excluded(&self, node: &PageNode) -> bool {
        let mut current = Some(node.clone());
        while let Some(n) = current {
            if n.kind() == NodeKind::Element && n.has_attr(&self.config.exclude_attribute) {
                return true;
            }
            current = n.parent();
        }
        false
    }

    /// Whether the node itself (not its ancestors) carries the
    /// exclusion attribute. Used during tree recursion, where ancestors
    /// have already been checked.
    pub fn is_excluded_self(&self, node: &PageNode) -> bool {
        node.kind() == NodeKind::Element && node.has_attr(&self.config.exclude_attribute)
    }

    /// Whether the URL matches any excluded-page pattern. Patterns are
    /// substring matches.
    pub fn is_page_excluded(&self, url: &str) -> bool {
        self.config
            .exclude_pages
            .iter()
            .any(|pattern| !pattern.is_empty() && url.contains(pattern.as_str()))
    }

    /// The configured exclusion attribute name.
    pub fn exclude_attribute(&self) -> &str {
        &self.config.exclude_attribute
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(config: PrivacyConfig) -> PrivacyPolicy {
        PrivacyPolicy::new(config)
    }

    fn default_policy() -> PrivacyPolicy {
        policy(PrivacyConfig::default())
    }

    #[test]
    fn mask_all_inputs_wins_first() {
        let p = policy(PrivacyConfig {
            mask_all_inputs: true,
            mask_sensitive_inputs: false,
            ..PrivacyConfig::default()
        });
        let input = PageNode::element("input");
        assert!(p.should_mask(&input));
    }

    #[test]
    fn explicit_mask_attribute_masks() {
        let p = default_policy();
        let input = PageNode::element("input");
        assert!(!p.should_mask(&input));
        input.set_attr("data-flashback-mask", "");
        assert!(p.should_mask(&input));
    }

    #[test]
    fn sensitive_type_masks() {
        let p = default_policy();
        let input = PageNode::element("input");
        input.set_attr("type", "password");
        assert!(p.should_mask(&input));
    }

    #[test]
    fn sensitive_autocomplete_masks() {
        let p = default_policy();
        let input = PageNode::element("input");
        input.set_attr("autocomplete", "CC-Number");
        assert!(p.should_mask(&input));
    }

    #[test]
    fn sensitive_name_pattern_is_case_insensitive() {
        let p = default_policy();
        let input = PageNode::element("input");
        input.set_attr("name", "CardNumber");
        assert!(p.should_mask(&input));

        let plain = PageNode::element("input");
        plain.set_attr("name", "quantity");
        assert!(!p.should_mask(&plain));
    }

    #[test]
    fn disabling_sensitive_detection_unmasks() {
        let p = policy(PrivacyConfig {
            mask_sensitive_inputs: false,
            ..PrivacyConfig::default()
        });
        let input = PageNode::element("input");
        input.set_attr("type", "password");
        assert!(!p.should_mask(&input));
    }

    #[test]
    fn mask_value_is_length_capped() {
        let p = default_policy();
        assert_eq!(p.mask_value(""), "");
        assert_eq!(p.mask_value("abc"), "***");
        assert_eq!(p.mask_value(&"x".repeat(50)), "*".repeat(20));
    }

    #[test]
    fn mask_value_counts_chars_not_bytes() {
        let p = default_policy();
        assert_eq!(p.mask_value("äöü"), "***");
    }

    #[test]
    fn exclusion_walks_ancestors() {
        let p = default_policy();
        let outer = PageNode::element("div");
        outer.set_attr("data-flashback-exclude", "");
        let inner = PageNode::element("span");
        let leaf = PageNode::text("secret");
        outer.append_child(&inner);
        inner.append_child(&leaf);

        assert!(p.is_excluded(&outer));
        assert!(p.is_excluded(&inner));
        assert!(p.is_excluded(&leaf));
        assert!(p.is_excluded_self(&outer));
        assert!(!p.is_excluded_self(&inner));
    }

    #[test]
    fn page_patterns_match_by_substring() {
        let p = policy(PrivacyConfig {
            exclude_pages: vec!["/admin".to_string(), "/checkout".to_string()],
            ..PrivacyConfig::default()
        });
        assert!(p.is_page_excluded("https://app.example.com/admin/users"));
        assert!(p.is_page_excluded("https://app.example.com/checkout"));
        assert!(!p.is_page_excluded("https://app.example.com/home"));
    }
}
