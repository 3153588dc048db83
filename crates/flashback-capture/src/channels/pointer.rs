//! Pointer, scroll, and viewport watcher.

use std::cell::RefCell;
use std::rc::Rc;

use flashback_page::{ObserverHandle, Page, PointerSignal};
use flashback_types::{
    ClickData, EventPayload, PointerMoveData, RecorderConfig, ScrollData, ViewportResizeData,
};

use crate::channels::CaptureChannel;
use crate::privacy::PrivacyPolicy;
use crate::selector::selector_of;
use crate::sink::EventSink;
use crate::throttle::Throttle;

/// Click text previews are truncated to this many characters.
const CLICK_TEXT_PREVIEW: usize = 50;

struct PointerState {
    sink: EventSink,
    policy: Rc<PrivacyPolicy>,
    move_throttle: Throttle,
    pending_move: Option<PointerMoveData>,
    scroll_throttle: Throttle,
    pending_scroll: Option<ScrollData>,
    resize_throttle: Throttle,
    pending_resize: Option<ViewportResizeData>,
}

impl PointerState {
    fn handle(&mut self, signal: &PointerSignal) {
        let now = self.sink.now_ms();
        match signal {
            PointerSignal::Move { x, y } => {
                let data = PointerMoveData { x: *x, y: *y };
                if self.move_throttle.accept(now) {
                    self.sink.push(EventPayload::PointerMove(data));
                } else {
                    // Coalesce: the latest move wins the trailing slot.
                    self.pending_move = Some(data);
                }
            }
            PointerSignal::Click {
                target,
                x,
                y,
                button,
            } => {
                if self.policy.is_excluded(target) {
                    return;
                }
                let preview: String = target
                    .text_content()
                    .trim()
                    .chars()
                    .take(CLICK_TEXT_PREVIEW)
                    .collect();
                self.sink.push(EventPayload::PointerClick(ClickData {
                    x: *x,
                    y: *y,
                    button: *button,
                    selector: selector_of(target),
                    tag: target.name(),
                    text: (!preview.is_empty()).then_some(preview),
                }));
            }
            PointerSignal::Scroll { x, y } => {
                let data = ScrollData { x: *x, y: *y };
                if self.scroll_throttle.accept(now) {
                    self.sink.push(EventPayload::Scroll(data));
                } else {
                    self.pending_scroll = Some(data);
                }
            }
            PointerSignal::Resize { width, height } => {
                let data = ViewportResizeData {
                    width: *width,
                    height: *height,
                };
                if self.resize_throttle.accept(now) {
                    self.sink.push(EventPayload::ViewportResize(data));
                } else {
                    self.pending_resize = Some(data);
                }
            }
        }
    }

    fn poll(&mut self, now: i64) {
        if self.move_throttle.take_trailing(now) {
            if let Some(data) = self.pending_move.take() {
                self.sink.push(EventPayload::PointerMove(data));
            }
        }
        if self.scroll_throttle.take_trailing(now) {
            if let Some(data) = self.pending_scroll.take() {
                self.sink.push(EventPayload::Scroll(data));
            }
        }
        if self.resize_throttle.take_trailing(now) {
            if let Some(data) = self.pending_resize.take() {
                self.sink.push(EventPayload::ViewportResize(data));
            }
        }
    }
}

/// Watches pointer movement (throttled), clicks (unthrottled), scrolls
/// and resizes (throttled independently).
pub struct PointerChannel {
    handle: Option<ObserverHandle>,
    state: Rc<RefCell<PointerState>>,
}

impl PointerChannel {
    pub fn start(
        page: &Rc<dyn Page>,
        sink: EventSink,
        policy: Rc<PrivacyPolicy>,
        config: &RecorderConfig,
    ) -> Option<Self> {
        let state = Rc::new(RefCell::new(PointerState {
            sink,
            policy,
            move_throttle: Throttle::new(config.mouse_throttle_ms),
            pending_move: None,
            scroll_throttle: Throttle::new(config.scroll_throttle_ms),
            pending_scroll: None,
            resize_throttle: Throttle::new(config.scroll_throttle_ms),
            pending_resize: None,
        }));

        let cb_state = Rc::clone(&state);
        let handle = match page.observe_pointer(Rc::new(move |signal| {
            cb_state.borrow_mut().handle(signal);
        })) {
            Ok(handle) => handle,
            Err(e) => {
                tracing::warn!(channel = "pointer", error = %e, "capability unavailable, channel disabled");
                return None;
            }
        };

        Some(Self {
            handle: Some(handle),
            state,
        })
    }
}

impl CaptureChannel for PointerChannel {
    fn name(&self) -> &'static str {
        "pointer"
    }

    fn poll(&mut self, now_ms: i64) {
        self.state.borrow_mut().poll(now_ms);
    }

    fn stop(&mut self) {
        self.handle.take();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::DeliveryPipeline;
    use crate::testing::{queued, test_sink};
    use flashback_page::{Clock, PageNode, SimPage, SimPageOptions};
    use flashback_types::{Event, EventKind, PrivacyConfig};

    fn start_channel(
        page: &Rc<SimPage>,
        config: &RecorderConfig,
    ) -> (PointerChannel, Rc<RefCell<DeliveryPipeline>>) {
        let policy = Rc::new(PrivacyPolicy::new(PrivacyConfig::default()));
        let (sink, pipeline) = test_sink(page, config);
        let page_dyn: Rc<dyn Page> = Rc::clone(page) as Rc<dyn Page>;
        let channel =
            PointerChannel::start(&page_dyn, sink, policy, config).expect("channel should start");
        (channel, pipeline)
    }

    #[test]
    fn moves_are_throttled_with_one_trailing_emission() {
        let page = SimPage::new(SimPageOptions::default());
        let config = RecorderConfig {
            mouse_throttle_ms: 100,
            ..RecorderConfig::default()
        };
        let (mut channel, pipeline) = start_channel(&page, &config);
        let clock = page.sim_clock();

        page.pointer_move(1, 1); // leading edge
        clock.advance(10);
        page.pointer_move(2, 2); // absorbed
        clock.advance(10);
        page.pointer_move(3, 3); // absorbed, overwrites trailing slot

        assert_eq!(queued(&pipeline).len(), 1);

        clock.advance(100);
        channel.poll(clock.now_ms());

        let events = queued(&pipeline);
        assert_eq!(events.len(), 2, "exactly one trailing emission");
        let EventPayload::PointerMove(last) = &events[1].payload else {
            panic!("expected pointer move");
        };
        assert_eq!((last.x, last.y), (3, 3), "latest coordinates win");

        // No further trailing call without new input.
        channel.poll(clock.now_ms() + 1_000);
        assert_eq!(queued(&pipeline).len(), 2);
    }

    #[test]
    fn clicks_are_unthrottled() {
        let page = SimPage::new(SimPageOptions::default());
        let (_channel, pipeline) = start_channel(&page, &RecorderConfig::default());

        let button = PageNode::element("button");
        button.set_attr("id", "save");
        button.append_child(&PageNode::text("  Save changes  "));
        page.document().append_child(&button);

        page.click(&button, 10, 20, 0);
        page.click(&button, 11, 21, 0);

        let events = queued(&pipeline);
        assert_eq!(events.len(), 2);
        let EventPayload::PointerClick(click) = &events[0].payload else {
            panic!("expected click");
        };
        assert_eq!(click.selector, "#save");
        assert_eq!(click.tag, "button");
        assert_eq!(click.text.as_deref(), Some("Save changes"));
    }

    #[test]
    fn click_text_preview_is_truncated() {
        let page = SimPage::new(SimPageOptions::default());
        let (_channel, pipeline) = start_channel(&page, &RecorderConfig::default());

        let div = PageNode::element("div");
        div.append_child(&PageNode::text(&"x".repeat(200)));
        page.document().append_child(&div);
        page.click(&div, 0, 0, 0);

        let events = queued(&pipeline);
        let EventPayload::PointerClick(click) = &events[0].payload else {
            panic!("expected click");
        };
        assert_eq!(click.text.as_deref().map(|t| t.chars().count()), Some(50));
    }

    #[test]
    fn clicks_in_excluded_subtrees_are_dropped() {
        let page = SimPage::new(SimPageOptions::default());
        let (_channel, pipeline) = start_channel(&page, &RecorderConfig::default());

        let private = PageNode::element("div");
        private.set_attr("data-flashback-exclude", "");
        let inner = PageNode::element("button");
        private.append_child(&inner);
        page.document().append_child(&private);

        page.click(&inner, 5, 5, 0);
        assert!(queued(&pipeline).is_empty());
    }

    #[test]
    fn scroll_and_resize_throttle_independently() {
        let page = SimPage::new(SimPageOptions::default());
        let config = RecorderConfig {
            scroll_throttle_ms: 100,
            ..RecorderConfig::default()
        };
        let (_channel, pipeline) = start_channel(&page, &config);

        page.scroll_to(0, 100);
        page.resize(800, 600);

        let kinds: Vec<EventKind> = queued(&pipeline).iter().map(Event::kind).collect();
        assert_eq!(kinds, vec![EventKind::Scroll, EventKind::ViewportResize]);
    }
}
