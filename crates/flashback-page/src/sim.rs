//! Deterministic in-memory page.
//!
//! `SimPage` implements [`Page`] over a scriptable DOM: tests build a
//! tree, start a recorder against it, then drive mutations, input,
//! navigation, and the clock by hand. Dispatch is synchronous on the
//! calling thread, mirroring the single-threaded cooperative model of a
//! real page.

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use flashback_types::{NavigationTiming, ScreenSize};

use crate::node::{NodeKind, PageNode};
use crate::page::{Clock, Page, StateStore};
use crate::signals::{
    CapabilityError, DomMutation, FormSignal, HistorySignal, LifecycleSignal, ObserverHandle,
    PointerSignal,
};

/// A manually-advanced clock.
#[derive(Debug, Default)]
pub struct SimClock {
    now: Cell<i64>,
}

impl SimClock {
    pub fn new(start_ms: i64) -> Self {
        Self {
            now: Cell::new(start_ms),
        }
    }

    /// Moves the clock forward.
    pub fn advance(&self, delta_ms: i64) {
        self.now.set(self.now.get() + delta_ms);
    }

    /// Sets the clock to an absolute time.
    pub fn set_ms(&self, now_ms: i64) {
        self.now.set(now_ms);
    }
}

impl Clock for SimClock {
    fn now_ms(&self) -> i64 {
        self.now.get()
    }
}

/// An in-memory state store.
#[derive(Debug, Default)]
pub struct SimStateStore {
    entries: RefCell<HashMap<String, String>>,
}

impl StateStore for SimStateStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.borrow().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) {
        self.entries
            .borrow_mut()
            .insert(key.to_string(), value.to_string());
    }

    fn remove(&self, key: &str) {
        self.entries.borrow_mut().remove(key);
    }
}

/// One observer list for a signal type.
struct ObserverSet<S> {
    entries: Rc<RefCell<Vec<(u64, Rc<dyn Fn(&S)>)>>>,
    next_id: Cell<u64>,
}

impl<S> Default for ObserverSet<S> {
    fn default() -> Self {
        Self {
            entries: Rc::new(RefCell::new(Vec::new())),
            next_id: Cell::new(0),
        }
    }
}

impl<S: 'static> ObserverSet<S> {
    fn subscribe(&self, observer: Rc<dyn Fn(&S)>) -> ObserverHandle {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        self.entries.borrow_mut().push((id, observer));

        let entries = Rc::clone(&self.entries);
        ObserverHandle::new(move || {
            entries.borrow_mut().retain(|(entry_id, _)| *entry_id != id);
        })
    }

    fn dispatch(&self, signal: &S) {
        // Snapshot before calling out so observers can subscribe or
        // detach from inside a callback.
        let snapshot: Vec<Rc<dyn Fn(&S)>> = self
            .entries
            .borrow()
            .iter()
            .map(|(_, observer)| Rc::clone(observer))
            .collect();
        for observer in snapshot {
            observer(signal);
        }
    }

    fn len(&self) -> usize {
        self.entries.borrow().len()
    }
}

/// Construction options for [`SimPage`].
#[derive(Debug, Clone)]
pub struct SimPageOptions {
    pub url: String,
    pub title: String,
    pub referrer: String,
    pub user_agent: String,
    pub language: String,
    pub timezone: String,
    pub screen: ScreenSize,
    pub viewport: ScreenSize,
    pub navigation_timing: Option<NavigationTiming>,
}

impl Default for SimPageOptions {
    fn default() -> Self {
        Self {
            url: "https://app.example.com/".to_string(),
            title: "Example".to_string(),
            referrer: String::new(),
            user_agent: "SimPage/1.0".to_string(),
            language: "en-US".to_string(),
            timezone: "UTC".to_string(),
            screen: ScreenSize {
                width: 1920,
                height: 1080,
            },
            viewport: ScreenSize {
                width: 1280,
                height: 720,
            },
            navigation_timing: Some(NavigationTiming {
                dom_content_loaded_ms: 120,
                load_ms: 340,
            }),
        }
    }
}

/// The deterministic reference page.
pub struct SimPage {
    document: PageNode,
    url: RefCell<String>,
    title: RefCell<String>,
    referrer: String,
    user_agent: String,
    language: String,
    timezone: String,
    screen: Cell<ScreenSize>,
    viewport: Cell<ScreenSize>,
    navigation_timing: Option<NavigationTiming>,
    clock: Rc<SimClock>,
    state: Rc<SimStateStore>,
    mutation_observers: ObserverSet<DomMutation>,
    pointer_observers: ObserverSet<PointerSignal>,
    form_observers: ObserverSet<FormSignal>,
    history_observers: ObserverSet<HistorySignal>,
    lifecycle_observers: ObserverSet<LifecycleSignal>,
    disabled: RefCell<HashSet<&'static str>>,
}

impl SimPage {
    /// Creates a page with an empty `<html>` document root.
    pub fn new(options: SimPageOptions) -> Rc<Self> {
        Rc::new(Self {
            document: PageNode::element("html"),
            url: RefCell::new(options.url),
            title: RefCell::new(options.title),
            referrer: options.referrer,
            user_agent: options.user_agent,
            language: options.language,
            timezone: options.timezone,
            screen: Cell::new(options.screen),
            viewport: Cell::new(options.viewport),
            navigation_timing: options.navigation_timing,
            clock: Rc::new(SimClock::new(1_000)),
            state: Rc::new(SimStateStore::default()),
            mutation_observers: ObserverSet::default(),
            pointer_observers: ObserverSet::default(),
            form_observers: ObserverSet::default(),
            history_observers: ObserverSet::default(),
            lifecycle_observers: ObserverSet::default(),
            disabled: RefCell::new(HashSet::new()),
        })
    }

    /// Creates a page at the given URL with default options otherwise.
    pub fn with_url(url: &str) -> Rc<Self> {
        Self::new(SimPageOptions {
            url: url.to_string(),
            ..SimPageOptions::default()
        })
    }

    /// The concrete clock, for advancing time in tests.
    pub fn sim_clock(&self) -> Rc<SimClock> {
        Rc::clone(&self.clock)
    }

    /// The concrete state store, for seeding persisted decisions.
    pub fn sim_state(&self) -> Rc<SimStateStore> {
        Rc::clone(&self.state)
    }

    /// Marks a capability as unavailable; subsequent `observe_*` calls
    /// for it fail. Names: `mutations`, `pointer`, `forms`, `history`,
    /// `lifecycle`.
    pub fn disable_capability(&self, name: &'static str) {
        self.disabled.borrow_mut().insert(name);
    }

    fn check_capability(&self, name: &'static str) -> Result<(), CapabilityError> {
        if self.disabled.borrow().contains(name) {
            Err(CapabilityError(name))
        } else {
            Ok(())
        }
    }

    /// Observer counts per capability, for asserting detachment.
    pub fn observer_count(&self) -> usize {
        self.mutation_observers.len()
            + self.pointer_observers.len()
            + self.form_observers.len()
            + self.history_observers.len()
            + self.lifecycle_observers.len()
    }

    // ── DOM scripting ────────────────────────────────────────────────

    /// Appends `child` under `parent` and reports the mutation.
    pub fn append(&self, parent: &PageNode, child: &PageNode) {
        parent.append_child(child);
        self.mutation_observers.dispatch(&DomMutation::ChildrenAdded {
            target: parent.clone(),
            nodes: vec![child.clone()],
        });
    }

    /// Removes `child` from `parent` and reports the mutation.
    pub fn remove(&self, parent: &PageNode, child: &PageNode) {
        if parent.remove_child(child) {
            self.mutation_observers
                .dispatch(&DomMutation::ChildrenRemoved {
                    target: parent.clone(),
                    nodes: vec![child.clone()],
                });
        }
    }

    /// Sets an attribute and reports the mutation.
    pub fn set_attribute(&self, node: &PageNode, name: &str, value: &str) {
        let old_value = node.set_attr(name, value);
        self.mutation_observers
            .dispatch(&DomMutation::AttributeChanged {
                target: node.clone(),
                name: name.to_string(),
                old_value,
                new_value: Some(value.to_string()),
            });
    }

    /// Removes an attribute and reports the mutation.
    pub fn remove_attribute(&self, node: &PageNode, name: &str) {
        let old_value = node.remove_attr(name);
        if old_value.is_some() {
            self.mutation_observers
                .dispatch(&DomMutation::AttributeChanged {
                    target: node.clone(),
                    name: name.to_string(),
                    old_value,
                    new_value: None,
                });
        }
    }

    /// Replaces a text node's character data and reports the mutation.
    pub fn set_text(&self, node: &PageNode, value: &str) {
        debug_assert_eq!(node.kind(), NodeKind::Text);
        let old_value = node.value();
        node.set_value(value);
        self.mutation_observers.dispatch(&DomMutation::TextChanged {
            target: node.clone(),
            old_value,
            new_value: value.to_string(),
        });
    }

    // ── User input scripting ─────────────────────────────────────────

    /// Types into a control: sets its value and fires an input signal.
    pub fn type_into(&self, node: &PageNode, value: &str, selection: Option<(u32, u32)>) {
        node.set_value(value);
        self.form_observers.dispatch(&FormSignal::Input {
            target: node.clone(),
            selection,
        });
    }

    /// Toggles a checkbox/radio and fires a change signal.
    pub fn toggle(&self, node: &PageNode, checked: bool) {
        node.set_checked(checked);
        self.form_observers.dispatch(&FormSignal::Change {
            target: node.clone(),
        });
    }

    /// Picks a select option and fires a change signal.
    pub fn select_option(&self, node: &PageNode, index: i64) {
        node.set_selected_index(index);
        self.form_observers.dispatch(&FormSignal::Change {
            target: node.clone(),
        });
    }

    /// Fires a focus signal.
    pub fn focus(&self, node: &PageNode) {
        self.form_observers.dispatch(&FormSignal::Focus {
            target: node.clone(),
        });
    }

    /// Fires a blur signal.
    pub fn blur(&self, node: &PageNode) {
        self.form_observers.dispatch(&FormSignal::Blur {
            target: node.clone(),
        });
    }

    /// Fires a pointer move signal.
    pub fn pointer_move(&self, x: i32, y: i32) {
        self.pointer_observers
            .dispatch(&PointerSignal::Move { x, y });
    }

    /// Fires a click signal on `target`.
    pub fn click(&self, target: &PageNode, x: i32, y: i32, button: u8) {
        self.pointer_observers.dispatch(&PointerSignal::Click {
            target: target.clone(),
            x,
            y,
            button,
        });
    }

    /// Fires a scroll signal.
    pub fn scroll_to(&self, x: i32, y: i32) {
        self.pointer_observers
            .dispatch(&PointerSignal::Scroll { x, y });
    }

    /// Resizes the viewport and fires a resize signal.
    pub fn resize(&self, width: u32, height: u32) {
        self.viewport.set(ScreenSize { width, height });
        self.pointer_observers
            .dispatch(&PointerSignal::Resize { width, height });
    }

    // ── Navigation scripting ─────────────────────────────────────────

    /// History push navigation.
    pub fn navigate_push(&self, url: &str) {
        *self.url.borrow_mut() = url.to_string();
        self.history_observers.dispatch(&HistorySignal::Push {
            url: url.to_string(),
        });
    }

    /// History replace navigation.
    pub fn navigate_replace(&self, url: &str) {
        *self.url.borrow_mut() = url.to_string();
        self.history_observers.dispatch(&HistorySignal::Replace {
            url: url.to_string(),
        });
    }

    /// Back/forward navigation.
    pub fn navigate_pop(&self, url: &str) {
        *self.url.borrow_mut() = url.to_string();
        self.history_observers.dispatch(&HistorySignal::Pop {
            url: url.to_string(),
        });
    }

    /// Fragment-only navigation.
    pub fn hash_change(&self, url: &str) {
        *self.url.borrow_mut() = url.to_string();
        self.history_observers.dispatch(&HistorySignal::HashChange {
            url: url.to_string(),
        });
    }

    /// Changes the document title without firing any signal.
    pub fn set_title(&self, title: &str) {
        *self.title.borrow_mut() = title.to_string();
    }

    /// The page becomes hidden.
    pub fn hide(&self) {
        self.lifecycle_observers.dispatch(&LifecycleSignal::Hidden);
    }

    /// The page unloads.
    pub fn unload(&self) {
        self.lifecycle_observers.dispatch(&LifecycleSignal::Unload);
    }
}

impl Page for SimPage {
    fn document(&self) -> PageNode {
        self.document.clone()
    }

    fn url(&self) -> String {
        self.url.borrow().clone()
    }

    fn title(&self) -> String {
        self.title.borrow().clone()
    }

    fn referrer(&self) -> String {
        self.referrer.clone()
    }

    fn user_agent(&self) -> String {
        self.user_agent.clone()
    }

    fn language(&self) -> String {
        self.language.clone()
    }

    fn timezone(&self) -> String {
        self.timezone.clone()
    }

    fn screen(&self) -> ScreenSize {
        self.screen.get()
    }

    fn viewport(&self) -> ScreenSize {
        self.viewport.get()
    }

    fn navigation_timing(&self) -> Option<NavigationTiming> {
        self.navigation_timing
    }

    fn observe_mutations(
        &self,
        observer: Rc<dyn Fn(&DomMutation)>,
    ) -> Result<ObserverHandle, CapabilityError> {
        self.check_capability("mutations")?;
        Ok(self.mutation_observers.subscribe(observer))
    }

    fn observe_pointer(
        &self,
        observer: Rc<dyn Fn(&PointerSignal)>,
    ) -> Result<ObserverHandle, CapabilityError> {
        self.check_capability("pointer")?;
        Ok(self.pointer_observers.subscribe(observer))
    }

    fn observe_forms(
        &self,
        observer: Rc<dyn Fn(&FormSignal)>,
    ) -> Result<ObserverHandle, CapabilityError> {
        self.check_capability("forms")?;
        Ok(self.form_observers.subscribe(observer))
    }

    fn observe_history(
        &self,
        observer: Rc<dyn Fn(&HistorySignal)>,
    ) -> Result<ObserverHandle, CapabilityError> {
        self.check_capability("history")?;
        Ok(self.history_observers.subscribe(observer))
    }

    fn observe_lifecycle(
        &self,
        observer: Rc<dyn Fn(&LifecycleSignal)>,
    ) -> Result<ObserverHandle, CapabilityError> {
        self.check_capability("lifecycle")?;
        Ok(self.lifecycle_observers.subscribe(observer))
    }

    fn clock(&self) -> Rc<dyn Clock> {
        Rc::clone(&self.clock) as Rc<dyn Clock>
    }

    fn state(&self) -> Rc<dyn StateStore> {
        Rc::clone(&self.state) as Rc<dyn StateStore>
    }
}
