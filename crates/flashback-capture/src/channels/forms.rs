//! Form control watcher.

use std::cell::RefCell;
use std::rc::Rc;

use flashback_page::{FormSignal, ObserverHandle, Page, PageNode};
use flashback_types::{EventPayload, FormAction, FormData};

use crate::channels::CaptureChannel;
use crate::privacy::PrivacyPolicy;
use crate::selector::selector_of;
use crate::serialize::captured_value;
use crate::sink::EventSink;

struct FormState {
    sink: EventSink,
    policy: Rc<PrivacyPolicy>,
}

impl FormState {
    fn handle(&self, signal: &FormSignal) {
        let target = signal.target();
        if !target.is_form_control() || self.policy.is_excluded(target) {
            return;
        }

        let action = match signal {
            FormSignal::Input { selection, .. } => {
                // Checkbox, radio, and select commit on change, not input.
                if is_toggle(target) || target.name() == "select" {
                    return;
                }
                let (value, masked) = captured_value(target, &self.policy);
                FormAction::Input {
                    value,
                    masked,
                    selection_start: selection.map(|(start, _)| start),
                    selection_end: selection.map(|(_, end)| end),
                }
            }
            FormSignal::Change { .. } => {
                if is_toggle(target) {
                    FormAction::Toggle {
                        checked: target.checked(),
                    }
                } else if target.name() == "select" {
                    FormAction::Select {
                        selected_index: target.selected_index(),
                        selected_text: target.selected_text().unwrap_or_default(),
                    }
                } else {
                    // Text-like change: the input events already carried
                    // the value.
                    return;
                }
            }
            FormSignal::Focus { .. } => FormAction::Focus,
            FormSignal::Blur { .. } => FormAction::Blur,
        };

        self.sink.push(EventPayload::FormInput(FormData {
            selector: selector_of(target),
            tag: target.name(),
            action,
        }));
    }
}

fn is_toggle(target: &PageNode) -> bool {
    target.name() == "input" && matches!(target.input_type().as_str(), "checkbox" | "radio")
}

/// Watches input, change, focus, and blur on form controls.
pub struct FormChannel {
    handle: Option<ObserverHandle>,
}

impl FormChannel {
    pub fn start(page: &Rc<dyn Page>, sink: EventSink, policy: Rc<PrivacyPolicy>) -> Option<Self> {
        let state = Rc::new(RefCell::new(FormState { sink, policy }));

        let cb_state = Rc::clone(&state);
        let handle = match page.observe_forms(Rc::new(move |signal| {
            cb_state.borrow().handle(signal);
        })) {
            Ok(handle) => handle,
            Err(e) => {
                tracing::warn!(channel = "forms", error = %e, "capability unavailable, channel disabled");
                return None;
            }
        };

        Some(Self {
            handle: Some(handle),
        })
    }
}

impl CaptureChannel for FormChannel {
    fn name(&self) -> &'static str {
        "forms"
    }

    fn stop(&mut self) {
        self.handle.take();
    }
}
