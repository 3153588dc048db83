//! The page capability trait.

use std::rc::Rc;

use flashback_types::{NavigationTiming, ScreenSize};

use crate::node::PageNode;
use crate::signals::{
    CapabilityError, DomMutation, FormSignal, HistorySignal, LifecycleSignal, ObserverHandle,
    PointerSignal,
};

/// Millisecond clock injected into the recorder. Timestamps, throttle
/// windows, and flush intervals all read this rather than the system
/// clock, which is what makes capture deterministic under test.
pub trait Clock {
    /// Current time in milliseconds.
    fn now_ms(&self) -> i64;
}

/// Persistent per-visitor key-value storage (the localStorage analog).
/// Holds the sampling decision and session identifier across page views.
pub trait StateStore {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str);
    fn remove(&self, key: &str);
}

/// Everything the recorder needs from a host page.
///
/// Each `observe_*` method registers one observer and returns a handle
/// whose drop unsubscribes it. A method returns [`CapabilityError`]
/// when the underlying browser API is unavailable; the corresponding
/// capture channel then stays disabled for the session without failing
/// recording as a whole.
pub trait Page {
    /// The document root element.
    fn document(&self) -> PageNode;

    /// Current page URL.
    fn url(&self) -> String;

    /// Current document title.
    fn title(&self) -> String;

    /// Document referrer, empty when none.
    fn referrer(&self) -> String;

    /// User agent string.
    fn user_agent(&self) -> String;

    /// BCP 47 language tag.
    fn language(&self) -> String;

    /// IANA timezone name.
    fn timezone(&self) -> String;

    /// Screen dimensions.
    fn screen(&self) -> ScreenSize;

    /// Viewport dimensions.
    fn viewport(&self) -> ScreenSize;

    /// Navigation timing for the initial load, when the page exposes it.
    fn navigation_timing(&self) -> Option<NavigationTiming>;

    /// Observes structural mutations.
    fn observe_mutations(
        &self,
        observer: Rc<dyn Fn(&DomMutation)>,
    ) -> Result<ObserverHandle, CapabilityError>;

    /// Observes pointer, scroll, and viewport signals.
    fn observe_pointer(
        &self,
        observer: Rc<dyn Fn(&PointerSignal)>,
    ) -> Result<ObserverHandle, CapabilityError>;

    /// Observes form control signals.
    fn observe_forms(
        &self,
        observer: Rc<dyn Fn(&FormSignal)>,
    ) -> Result<ObserverHandle, CapabilityError>;

    /// Observes history navigation signals.
    fn observe_history(
        &self,
        observer: Rc<dyn Fn(&HistorySignal)>,
    ) -> Result<ObserverHandle, CapabilityError>;

    /// Observes lifecycle signals.
    fn observe_lifecycle(
        &self,
        observer: Rc<dyn Fn(&LifecycleSignal)>,
    ) -> Result<ObserverHandle, CapabilityError>;

    /// The page's clock.
    fn clock(&self) -> Rc<dyn Clock>;

    /// The page's persistent state store.
    fn state(&self) -> Rc<dyn StateStore>;
}
