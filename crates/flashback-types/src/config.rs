//! Recorder configuration surface.

use serde::{Deserialize, Serialize};

/// Privacy and redaction settings for the recorder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrivacyConfig {
    /// Mask every form control value, regardless of type.
    #[serde(default)]
    pub mask_all_inputs: bool,

    /// Mask controls whose type, autocomplete, name, id, or placeholder
    /// looks sensitive.
    #[serde(default = "default_true")]
    pub mask_sensitive_inputs: bool,

    /// Attribute that forces masking of a single element's value.
    #[serde(default = "default_mask_attribute")]
    pub mask_attribute: String,

    /// Attribute that excludes an element and its entire subtree from
    /// capture of any kind.
    #[serde(default = "default_exclude_attribute")]
    pub exclude_attribute: String,

    /// URL substring patterns for pages that must never be recorded.
    #[serde(default)]
    pub exclude_pages: Vec<String>,
}

fn default_true() -> bool {
    true
}

fn default_mask_attribute() -> String {
    "data-flashback-mask".to_string()
}

fn default_exclude_attribute() -> String {
    "data-flashback-exclude".to_string()
}

impl Default for PrivacyConfig {
    fn default() -> Self {
        Self {
            mask_all_inputs: false,
            mask_sensitive_inputs: true,
            mask_attribute: default_mask_attribute(),
            exclude_attribute: default_exclude_attribute(),
            exclude_pages: Vec::new(),
        }
    }
}

/// Recorder configuration.
///
/// Every knob the embedding snippet recognizes. Defaults are tuned for
/// a typical single-page application.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecorderConfig {
    /// Collector endpoint for batch posts.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Percentage of visitors to record, 0–100. Decided once per
    /// visitor and persisted, not re-rolled per page view.
    #[serde(default = "default_sampling_rate")]
    pub sampling_rate: u8,

    /// Events per delivered batch; reaching this size triggers a flush.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Interval of the time-triggered flush, in milliseconds.
    #[serde(default = "default_batch_interval_ms")]
    pub batch_interval_ms: u64,

    /// Leading-edge throttle interval for pointer moves, in milliseconds.
    #[serde(default = "default_mouse_throttle_ms")]
    pub mouse_throttle_ms: u64,

    /// Throttle interval for scroll and resize, in milliseconds.
    #[serde(default = "default_scroll_throttle_ms")]
    pub scroll_throttle_ms: u64,

    /// Upper bound on queued events awaiting delivery. When the queue
    /// is full the oldest events are dropped and counted.
    #[serde(default = "default_max_pending_events")]
    pub max_pending_events: usize,

    /// Transport timeout, in milliseconds.
    #[serde(default = "default_transport_timeout_ms")]
    pub transport_timeout_ms: u64,

    /// Privacy settings.
    #[serde(default)]
    pub privacy: PrivacyConfig,
}

fn default_endpoint() -> String {
    "http://localhost:3000/api/collect".to_string()
}

fn default_sampling_rate() -> u8 {
    100
}

fn default_batch_size() -> usize {
    50
}

fn default_batch_interval_ms() -> u64 {
    5_000
}

fn default_mouse_throttle_ms() -> u64 {
    50
}

fn default_scroll_throttle_ms() -> u64 {
    100
}

fn default_max_pending_events() -> usize {
    500
}

fn default_transport_timeout_ms() -> u64 {
    10_000
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            sampling_rate: default_sampling_rate(),
            batch_size: default_batch_size(),
            batch_interval_ms: default_batch_interval_ms(),
            mouse_throttle_ms: default_mouse_throttle_ms(),
            scroll_throttle_ms: default_scroll_throttle_ms(),
            max_pending_events: default_max_pending_events(),
            transport_timeout_ms: default_transport_timeout_ms(),
            privacy: PrivacyConfig::default(),
        }
    }
}
