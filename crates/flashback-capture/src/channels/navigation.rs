//! Navigation and lifecycle watcher.
//!
//! Route changes are observed through the page's history capability —
//! an explicit subscription that is dropped on stop. Nothing is
//! monkey-patched, so multiple recorder instances can coexist and tests
//! need no global cleanup.

use std::cell::RefCell;
use std::rc::Rc;

use flashback_page::{HistorySignal, LifecycleSignal, ObserverHandle, Page};
use flashback_types::{
    EventPayload, PageLoadData, SessionEndData, SessionEndReason, TransitionCause, TransitionData,
};

use crate::channels::CaptureChannel;
use crate::privacy::PrivacyPolicy;
use crate::sink::EventSink;

struct NavigationState {
    sink: EventSink,
    policy: Rc<PrivacyPolicy>,
    current_url: String,
}

impl NavigationState {
    fn handle_history(&mut self, signal: &HistorySignal) {
        let to_url = signal.url().to_string();
        let from_url = std::mem::replace(&mut self.current_url, to_url.clone());

        // Excluded pages produce no event, but the URL bookkeeping above
        // still advanced so a later transition reports the right origin.
        if self.policy.is_page_excluded(&to_url) {
            return;
        }

        let cause = match signal {
            HistorySignal::Push { .. } => TransitionCause::Push,
            HistorySignal::Replace { .. } => TransitionCause::Replace,
            HistorySignal::Pop { .. } => TransitionCause::Pop,
            HistorySignal::HashChange { .. } => TransitionCause::HashChange,
        };

        self.sink.push(EventPayload::PageTransition(TransitionData {
            from_url,
            to_url,
            cause,
        }));
    }

    fn handle_lifecycle(&mut self, signal: &LifecycleSignal) {
        match signal {
            LifecycleSignal::Hidden => {
                self.sink.push(EventPayload::PageTransition(TransitionData {
                    from_url: self.current_url.clone(),
                    to_url: self.current_url.clone(),
                    cause: TransitionCause::Hidden,
                }));
                self.sink.flush();
            }
            LifecycleSignal::Unload => {
                self.sink.push(EventPayload::SessionEnd(SessionEndData {
                    reason: SessionEndReason::Unload,
                }));
                self.sink.flush();
            }
        }
    }
}

/// Watches history navigation and page lifecycle.
pub struct NavigationChannel {
    history_handle: Option<ObserverHandle>,
    lifecycle_handle: Option<ObserverHandle>,
}

impl NavigationChannel {
    /// Emits the page-load event and begins observing navigation.
    ///
    /// Returns `None` only when both the history and lifecycle
    /// capabilities are unavailable; either one alone keeps the channel
    /// useful.
    pub fn start(page: &Rc<dyn Page>, sink: EventSink, policy: Rc<PrivacyPolicy>) -> Option<Self> {
        sink.push(EventPayload::PageLoad(PageLoadData {
            url: page.url(),
            title: page.title(),
            referrer: page.referrer(),
            timing: page.navigation_timing(),
        }));

        let state = Rc::new(RefCell::new(NavigationState {
            sink,
            policy,
            current_url: page.url(),
        }));

        let history_state = Rc::clone(&state);
        let history_handle = match page.observe_history(Rc::new(move |signal| {
            history_state.borrow_mut().handle_history(signal);
        })) {
            Ok(handle) => Some(handle),
            Err(e) => {
                tracing::warn!(channel = "navigation", error = %e, "history capability unavailable");
                None
            }
        };

        let lifecycle_state = Rc::clone(&state);
        let lifecycle_handle = match page.observe_lifecycle(Rc::new(move |signal| {
            lifecycle_state.borrow_mut().handle_lifecycle(signal);
        })) {
            Ok(handle) => Some(handle),
            Err(e) => {
                tracing::warn!(channel = "navigation", error = %e, "lifecycle capability unavailable");
                None
            }
        };

        if history_handle.is_none() && lifecycle_handle.is_none() {
            return None;
        }

        Some(Self {
            history_handle,
            lifecycle_handle,
        })
    }
}

impl CaptureChannel for NavigationChannel {
    fn name(&self) -> &'static str {
        "navigation"
    }

    fn stop(&mut self) {
        self.history_handle.take();
        self.lifecycle_handle.take();
    }
}
