//! Gesture recognizer: turns raw pointer input into semantic intents.
//!
//! The recognizer is a pure state machine. It never touches the document
//! or the viewport; callers feed it events (plus the hit-test result and
//! the current view) and apply the [`GestureIntent`]s it returns.
//!
//! ```text
//! Idle ──down on element──▶ Pressed ──move > threshold / hold──▶ Dragging
//!   │                         └──up──▶ Idle (click)
//!   ├──down on canvas / middle button──▶ Panning ──up──▶ Idle
//!   └──second touch──▶ Pinching ──lift one──▶ Panning
//! ```

use crate::config::EngineConfig;
use crate::input::{MouseButton, PointerEvent, PointerId, PointerKind};
use crate::shapes::ElementId;
use crate::viewport::ViewState;
use kurbo::{Point, Vec2};

/// Semantic outcome of one or more raw events.
#[derive(Debug, Clone, PartialEq)]
pub enum GestureIntent {
    /// Pointer went down on an element.
    Select { id: ElementId, additive: bool },
    DoubleClick { id: ElementId },
    /// Press and release on blank canvas without moving; client position.
    CanvasClick { position: Point },
    DragStart { id: ElementId },
    /// `offset` is the client-space displacement since the press.
    DragMove { id: ElementId, offset: Vec2 },
    DragEnd { id: ElementId, offset: Vec2 },
    /// Translate the view by a client-space delta.
    Pan { delta: Vec2 },
    /// Multiply zoom by `factor`, keeping the client point `anchor` fixed.
    ZoomAt { anchor: Point, factor: f64 },
    /// Replace the view outright (pinch).
    SetView(ViewState),
}

/// Thresholds and timings used by the recognizer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GestureConfig {
    pub drag_threshold: f64,
    pub hold_delay: f64,
    pub double_click_ms: f64,
    pub double_click_distance: f64,
    pub wheel_sensitivity: f64,
    pub min_zoom: f64,
    pub max_zoom: f64,
}

impl Default for GestureConfig {
    fn default() -> Self {
        Self::from(&EngineConfig::default())
    }
}

impl From<&EngineConfig> for GestureConfig {
    fn from(config: &EngineConfig) -> Self {
        Self {
            drag_threshold: config.drag_threshold_px,
            hold_delay: config.hold_delay_ms,
            double_click_ms: config.double_click_ms,
            double_click_distance: config.double_click_distance_px,
            wheel_sensitivity: config.wheel_zoom_sensitivity,
            min_zoom: config.min_zoom.min(config.max_zoom),
            max_zoom: config.max_zoom,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum GestureState {
    Idle,
    /// Pointer down on an element, not yet promoted to a drag.
    Pressed {
        pointer: PointerId,
        element: ElementId,
        origin: Point,
        last: Point,
        /// Path length covered since the press.
        travelled: f64,
        pressed_at: f64,
    },
    Dragging {
        pointer: PointerId,
        element: ElementId,
        origin: Point,
        last: Point,
    },
    /// Pointer down on blank canvas (or middle button anywhere).
    Panning {
        pointer: PointerId,
        origin: Point,
        last: Point,
        /// Release will not count as a canvas click.
        suppress_click: bool,
    },
    Pinching {
        first: PointerId,
        second: PointerId,
        start_distance: f64,
        start_mid: Point,
        start_view: ViewState,
    },
}

#[derive(Debug, Clone)]
struct LastPress {
    element: ElementId,
    position: Point,
    time: f64,
}

/// Per-surface gesture state machine.
#[derive(Debug, Clone)]
pub struct GestureRecognizer {
    config: GestureConfig,
    state: GestureState,
    /// Active touch points, in press order.
    touches: Vec<(PointerId, Point)>,
    last_press: Option<LastPress>,
}

impl Default for GestureRecognizer {
    fn default() -> Self {
        Self::new(GestureConfig::default())
    }
}

fn midpoint(a: Point, b: Point) -> Point {
    a.midpoint(b)
}

impl GestureRecognizer {
    pub fn new(config: GestureConfig) -> Self {
        Self {
            config,
            state: GestureState::Idle,
            touches: Vec::new(),
            last_press: None,
        }
    }

    pub fn config(&self) -> &GestureConfig {
        &self.config
    }

    pub fn is_idle(&self) -> bool {
        self.state == GestureState::Idle
    }

    /// Name of the current state, for diagnostics.
    pub fn state_name(&self) -> &'static str {
        match self.state {
            GestureState::Idle => "idle",
            GestureState::Pressed { .. } => "potential",
            GestureState::Dragging { .. } => "dragging",
            GestureState::Panning { .. } => "panning",
            GestureState::Pinching { .. } => "zooming",
        }
    }

    /// Element currently being dragged, if any.
    pub fn dragged_element(&self) -> Option<&str> {
        match &self.state {
            GestureState::Dragging { element, .. } => Some(element),
            _ => None,
        }
    }

    /// Drop all interaction state without emitting anything.
    pub fn reset(&mut self) {
        self.state = GestureState::Idle;
        self.touches.clear();
        self.last_press = None;
    }

    /// Time at which [`GestureRecognizer::poll`] has work to do.
    pub fn next_deadline(&self) -> Option<f64> {
        match self.state {
            GestureState::Pressed { pressed_at, .. } => Some(pressed_at + self.config.hold_delay),
            _ => None,
        }
    }

    /// Fire the press-and-hold timer if it has elapsed.
    pub fn poll(&mut self, now: f64) -> Vec<GestureIntent> {
        let mut intents = Vec::new();
        self.promote_if_held(now, &mut intents);
        intents
    }

    fn promote_if_held(&mut self, now: f64, intents: &mut Vec<GestureIntent>) {
        let held = match &self.state {
            GestureState::Pressed { pressed_at, .. } => now - pressed_at >= self.config.hold_delay,
            _ => false,
        };
        if held {
            log::debug!("Press held for {}ms, starting drag", self.config.hold_delay);
            self.promote(intents);
        }
    }

    fn promote(&mut self, intents: &mut Vec<GestureIntent>) {
        let state = std::mem::replace(&mut self.state, GestureState::Idle);
        if let GestureState::Pressed {
            pointer,
            element,
            origin,
            last,
            ..
        } = state
        {
            intents.push(GestureIntent::DragStart { id: element.clone() });
            self.state = GestureState::Dragging {
                pointer,
                element,
                origin,
                last,
            };
        } else {
            self.state = state;
        }
    }

    /// Feed one raw event.
    ///
    /// `hit` is the element under the pointer for `Down` events (ignored
    /// otherwise); `view` is the current viewport state; `now` is in
    /// milliseconds.
    pub fn handle(
        &mut self,
        event: &PointerEvent,
        hit: Option<&str>,
        view: ViewState,
        now: f64,
    ) -> Vec<GestureIntent> {
        let mut intents = Vec::new();
        self.promote_if_held(now, &mut intents);

        match *event {
            PointerEvent::Down {
                pointer,
                kind,
                position,
                button,
                modifiers,
            } => {
                if kind == PointerKind::Touch {
                    self.touches.retain(|(id, _)| *id != pointer);
                    self.touches.push((pointer, position));
                    if self.touches.len() == 2 {
                        self.begin_pinch(view, &mut intents);
                        return intents;
                    }
                    if self.touches.len() > 2 {
                        log::debug!("Ignoring extra touch {}", pointer);
                        return intents;
                    }
                }
                if self.state != GestureState::Idle {
                    log::debug!("Ignoring pointer {} down during {}", pointer, self.state_name());
                    return intents;
                }
                self.pointer_down(pointer, position, button, modifiers.is_additive(), hit, now, &mut intents);
            }
            PointerEvent::Move { pointer, position } => {
                self.update_touch(pointer, position);
                self.pointer_move(pointer, position, &mut intents);
            }
            PointerEvent::Up { pointer, position } | PointerEvent::Leave { pointer, position } => {
                self.update_touch(pointer, position);
                self.pointer_up(pointer, Some(position), &mut intents);
            }
            PointerEvent::Cancel { pointer } => {
                self.pointer_up(pointer, None, &mut intents);
            }
            PointerEvent::Wheel { position, delta } => {
                if delta.y != 0.0 && delta.y.is_finite() {
                    let factor = (-delta.y * self.config.wheel_sensitivity).exp();
                    intents.push(GestureIntent::ZoomAt {
                        anchor: position,
                        factor,
                    });
                }
            }
        }
        intents
    }

    #[allow(clippy::too_many_arguments)]
    fn pointer_down(
        &mut self,
        pointer: PointerId,
        position: Point,
        button: MouseButton,
        additive: bool,
        hit: Option<&str>,
        now: f64,
        intents: &mut Vec<GestureIntent>,
    ) {
        match (button, hit) {
            (MouseButton::Right, _) => {
                log::debug!("Ignoring right button press");
            }
            (MouseButton::Middle, _) => {
                self.state = GestureState::Panning {
                    pointer,
                    origin: position,
                    last: position,
                    suppress_click: true,
                };
            }
            (MouseButton::Left, Some(element)) => {
                intents.push(GestureIntent::Select {
                    id: element.to_string(),
                    additive,
                });
                if self.is_double_click(element, position, now) {
                    intents.push(GestureIntent::DoubleClick { id: element.to_string() });
                    self.last_press = None;
                } else {
                    self.last_press = Some(LastPress {
                        element: element.to_string(),
                        position,
                        time: now,
                    });
                }
                self.state = GestureState::Pressed {
                    pointer,
                    element: element.to_string(),
                    origin: position,
                    last: position,
                    travelled: 0.0,
                    pressed_at: now,
                };
            }
            (MouseButton::Left, None) => {
                self.state = GestureState::Panning {
                    pointer,
                    origin: position,
                    last: position,
                    suppress_click: false,
                };
            }
        }
    }

    fn is_double_click(&self, element: &str, position: Point, now: f64) -> bool {
        self.last_press.as_ref().is_some_and(|last| {
            last.element == element
                && now - last.time < self.config.double_click_ms
                && last.position.distance(position) < self.config.double_click_distance
        })
    }

    fn pointer_move(&mut self, moved: PointerId, position: Point, intents: &mut Vec<GestureIntent>) {
        match &mut self.state {
            GestureState::Idle => {}
            GestureState::Pressed {
                pointer,
                origin,
                last,
                travelled,
                ..
            } => {
                if *pointer != moved {
                    return;
                }
                *travelled += last.distance(position);
                *last = position;
                if *travelled > self.config.drag_threshold {
                    let offset = position - *origin;
                    self.promote(intents);
                    if let Some(id) = self.dragged_element() {
                        intents.push(GestureIntent::DragMove {
                            id: id.to_string(),
                            offset,
                        });
                    }
                }
            }
            GestureState::Dragging {
                pointer,
                element,
                origin,
                last,
            } => {
                if *pointer != moved || *last == position {
                    return;
                }
                *last = position;
                intents.push(GestureIntent::DragMove {
                    id: element.clone(),
                    offset: position - *origin,
                });
            }
            GestureState::Panning { pointer, last, .. } => {
                if *pointer != moved {
                    return;
                }
                let delta = position - *last;
                *last = position;
                if delta != Vec2::ZERO {
                    intents.push(GestureIntent::Pan { delta });
                }
            }
            GestureState::Pinching {
                first,
                second,
                start_distance,
                start_mid,
                start_view,
            } => {
                let (Some(a), Some(b)) = (
                    self.touches.iter().find(|(id, _)| *id == *first).map(|t| t.1),
                    self.touches.iter().find(|(id, _)| *id == *second).map(|t| t.1),
                ) else {
                    return;
                };
                let distance = a.distance(b);
                let ratio = if *start_distance > f64::EPSILON {
                    distance / *start_distance
                } else {
                    1.0
                };
                let scale = (start_view.scale * ratio).clamp(self.config.min_zoom, self.config.max_zoom);
                // The document point that started under the midpoint follows it.
                let anchor = start_view.to_local(*start_mid);
                let mid = midpoint(a, b);
                intents.push(GestureIntent::SetView(ViewState {
                    scale,
                    translate: Vec2::new(mid.x - anchor.x * scale, mid.y - anchor.y * scale),
                }));
            }
        }
    }

    fn pointer_up(&mut self, released: PointerId, position: Option<Point>, intents: &mut Vec<GestureIntent>) {
        let was_touch = self.touches.iter().any(|(id, _)| *id == released);
        self.touches.retain(|(id, _)| *id != released);

        let state = std::mem::replace(&mut self.state, GestureState::Idle);
        match state {
            GestureState::Idle => {}
            GestureState::Pressed { pointer, .. } if pointer != released => self.state = state,
            GestureState::Pressed { element, .. } => {
                log::debug!("Click on element {}", element);
            }
            GestureState::Dragging { pointer, .. } if pointer != released => self.state = state,
            GestureState::Dragging {
                element, origin, last, ..
            } => {
                let end = position.unwrap_or(last);
                intents.push(GestureIntent::DragEnd {
                    id: element,
                    offset: end - origin,
                });
            }
            GestureState::Panning { pointer, .. } if pointer != released => self.state = state,
            GestureState::Panning {
                origin,
                last,
                suppress_click,
                ..
            } => {
                let end = position.unwrap_or(last);
                if !suppress_click && origin.distance(end) <= self.config.drag_threshold {
                    intents.push(GestureIntent::CanvasClick { position: end });
                }
            }
            GestureState::Pinching { first, second, .. } => {
                if !was_touch || (released != first && released != second) {
                    self.state = state;
                    return;
                }
                let remaining = if released == first { second } else { first };
                if let Some(&(_, at)) = self.touches.iter().find(|(id, _)| *id == remaining) {
                    log::debug!("Pinch ended, panning with touch {}", remaining);
                    self.state = GestureState::Panning {
                        pointer: remaining,
                        origin: at,
                        last: at,
                        suppress_click: true,
                    };
                }
            }
        }
    }

    fn update_touch(&mut self, pointer: PointerId, position: Point) {
        if let Some(touch) = self.touches.iter_mut().find(|(id, _)| *id == pointer) {
            touch.1 = position;
        }
    }

    fn begin_pinch(&mut self, view: ViewState, intents: &mut Vec<GestureIntent>) {
        let (first, a) = self.touches[0];
        let (second, b) = self.touches[1];

        if let GestureState::Dragging {
            element, origin, last, ..
        } = &self.state
        {
            intents.push(GestureIntent::DragEnd {
                id: element.clone(),
                offset: *last - *origin,
            });
        }

        log::debug!("Pinch started with touches {} and {}", first, second);
        self.state = GestureState::Pinching {
            first,
            second,
            start_distance: a.distance(b),
            start_mid: midpoint(a, b),
            start_view: view,
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::Modifiers;

    fn view() -> ViewState {
        ViewState::default()
    }

    fn feed(recognizer: &mut GestureRecognizer, event: PointerEvent, hit: Option<&str>, now: f64) -> Vec<GestureIntent> {
        recognizer.handle(&event, hit, view(), now)
    }

    fn has_drag_move(intents: &[GestureIntent]) -> bool {
        intents.iter().any(|i| matches!(i, GestureIntent::DragMove { .. }))
    }

    #[test]
    fn test_click_below_threshold_never_drags() {
        let mut recognizer = GestureRecognizer::default();
        let down = feed(&mut recognizer, PointerEvent::mouse_down(10.0, 10.0), Some("a"), 0.0);
        assert_eq!(
            down,
            vec![GestureIntent::Select {
                id: "a".into(),
                additive: false
            }]
        );

        let moved = feed(&mut recognizer, PointerEvent::mouse_move(12.0, 12.0), None, 50.0);
        assert!(moved.is_empty());
        let up = feed(&mut recognizer, PointerEvent::mouse_up(12.0, 12.0), None, 100.0);
        assert!(up.is_empty());
        assert!(recognizer.is_idle());
    }

    #[test]
    fn test_move_past_threshold_promotes() {
        let mut recognizer = GestureRecognizer::default();
        feed(&mut recognizer, PointerEvent::mouse_down(10.0, 10.0), Some("a"), 0.0);
        let moved = feed(&mut recognizer, PointerEvent::mouse_move(20.0, 10.0), None, 30.0);
        assert_eq!(moved[0], GestureIntent::DragStart { id: "a".into() });
        assert_eq!(
            moved[1],
            GestureIntent::DragMove {
                id: "a".into(),
                offset: Vec2::new(10.0, 0.0)
            }
        );
        assert_eq!(recognizer.state_name(), "dragging");

        let up = feed(&mut recognizer, PointerEvent::mouse_up(25.0, 15.0), None, 60.0);
        assert_eq!(
            up,
            vec![GestureIntent::DragEnd {
                id: "a".into(),
                offset: Vec2::new(15.0, 5.0)
            }]
        );
    }

    #[test]
    fn test_wobble_counts_toward_threshold() {
        let mut recognizer = GestureRecognizer::default();
        feed(&mut recognizer, PointerEvent::mouse_down(10.0, 10.0), Some("a"), 0.0);

        // Never more than 1.5px from the press point, but 4.5px of travel.
        assert!(feed(&mut recognizer, PointerEvent::mouse_move(11.5, 10.0), None, 10.0).is_empty());
        assert!(feed(&mut recognizer, PointerEvent::mouse_move(10.0, 10.0), None, 20.0).is_empty());
        let moved = feed(&mut recognizer, PointerEvent::mouse_move(11.5, 10.0), None, 30.0);
        assert_eq!(moved[0], GestureIntent::DragStart { id: "a".into() });
        assert_eq!(
            moved[1],
            GestureIntent::DragMove {
                id: "a".into(),
                offset: Vec2::new(1.5, 0.0)
            }
        );
    }

    #[test]
    fn test_hold_timer_promotes_without_movement() {
        let mut recognizer = GestureRecognizer::default();
        feed(&mut recognizer, PointerEvent::mouse_down(10.0, 10.0), Some("a"), 0.0);
        assert_eq!(recognizer.next_deadline(), Some(200.0));
        assert!(recognizer.poll(199.0).is_empty());

        let fired = recognizer.poll(200.0);
        assert_eq!(fired, vec![GestureIntent::DragStart { id: "a".into() }]);
        assert_eq!(recognizer.next_deadline(), None);

        let moved = feed(&mut recognizer, PointerEvent::mouse_move(11.0, 10.0), None, 220.0);
        assert!(has_drag_move(&moved));
    }

    #[test]
    fn test_late_event_applies_elapsed_hold() {
        let mut recognizer = GestureRecognizer::default();
        feed(&mut recognizer, PointerEvent::mouse_down(10.0, 10.0), Some("a"), 0.0);
        let moved = feed(&mut recognizer, PointerEvent::mouse_move(11.0, 10.0), None, 500.0);
        assert_eq!(moved[0], GestureIntent::DragStart { id: "a".into() });
        assert!(has_drag_move(&moved));
    }

    #[test]
    fn test_canvas_press_pans_and_clicks() {
        let mut recognizer = GestureRecognizer::default();
        assert!(feed(&mut recognizer, PointerEvent::mouse_down(100.0, 100.0), None, 0.0).is_empty());
        let up = feed(&mut recognizer, PointerEvent::mouse_up(101.0, 100.0), None, 10.0);
        assert_eq!(
            up,
            vec![GestureIntent::CanvasClick {
                position: Point::new(101.0, 100.0)
            }]
        );

        feed(&mut recognizer, PointerEvent::mouse_down(100.0, 100.0), None, 100.0);
        let first = feed(&mut recognizer, PointerEvent::mouse_move(110.0, 105.0), None, 110.0);
        let second = feed(&mut recognizer, PointerEvent::mouse_move(130.0, 105.0), None, 120.0);
        assert_eq!(first, vec![GestureIntent::Pan { delta: Vec2::new(10.0, 5.0) }]);
        assert_eq!(second, vec![GestureIntent::Pan { delta: Vec2::new(20.0, 0.0) }]);
        assert!(feed(&mut recognizer, PointerEvent::mouse_up(130.0, 105.0), None, 130.0).is_empty());
    }

    #[test]
    fn test_middle_button_pans_over_elements() {
        let mut recognizer = GestureRecognizer::default();
        let down = PointerEvent::mouse_down(10.0, 10.0).with_button(MouseButton::Middle);
        assert!(feed(&mut recognizer, down, Some("a"), 0.0).is_empty());
        let moved = feed(&mut recognizer, PointerEvent::mouse_move(15.0, 10.0), None, 10.0);
        assert_eq!(moved, vec![GestureIntent::Pan { delta: Vec2::new(5.0, 0.0) }]);
        assert!(feed(&mut recognizer, PointerEvent::mouse_up(15.0, 10.0), None, 20.0).is_empty());
    }

    #[test]
    fn test_additive_select() {
        let mut recognizer = GestureRecognizer::default();
        let down = PointerEvent::mouse_down(1.0, 1.0).with_modifiers(Modifiers::SHIFT);
        let intents = feed(&mut recognizer, down, Some("a"), 0.0);
        assert_eq!(
            intents,
            vec![GestureIntent::Select {
                id: "a".into(),
                additive: true
            }]
        );
    }

    #[test]
    fn test_double_click() {
        let mut recognizer = GestureRecognizer::default();
        feed(&mut recognizer, PointerEvent::mouse_down(10.0, 10.0), Some("a"), 0.0);
        feed(&mut recognizer, PointerEvent::mouse_up(10.0, 10.0), None, 50.0);
        let second = feed(&mut recognizer, PointerEvent::mouse_down(11.0, 10.0), Some("a"), 200.0);
        assert!(second.contains(&GestureIntent::DoubleClick { id: "a".into() }));
        feed(&mut recognizer, PointerEvent::mouse_up(11.0, 10.0), None, 220.0);

        // A third press does not pair with the consumed second one.
        let third = feed(&mut recognizer, PointerEvent::mouse_down(11.0, 10.0), Some("a"), 300.0);
        assert!(!third.contains(&GestureIntent::DoubleClick { id: "a".into() }));
        feed(&mut recognizer, PointerEvent::mouse_up(11.0, 10.0), None, 320.0);

        let late = feed(&mut recognizer, PointerEvent::mouse_down(11.0, 10.0), Some("a"), 2000.0);
        assert!(!late.contains(&GestureIntent::DoubleClick { id: "a".into() }));
    }

    #[test]
    fn test_wheel_zooms_at_cursor() {
        let mut recognizer = GestureRecognizer::default();
        let intents = feed(&mut recognizer, PointerEvent::wheel(50.0, 60.0, -100.0), None, 0.0);
        match intents.as_slice() {
            [GestureIntent::ZoomAt { anchor, factor }] => {
                assert_eq!(*anchor, Point::new(50.0, 60.0));
                assert!((factor - (0.2f64).exp()).abs() < 1e-12);
            }
            other => panic!("unexpected intents {other:?}"),
        }
        assert!(feed(&mut recognizer, PointerEvent::wheel(0.0, 0.0, 0.0), None, 0.0).is_empty());
    }

    #[test]
    fn test_leave_ends_drag_at_last_position() {
        let mut recognizer = GestureRecognizer::default();
        feed(&mut recognizer, PointerEvent::mouse_down(0.0, 0.0), Some("a"), 0.0);
        feed(&mut recognizer, PointerEvent::mouse_move(10.0, 0.0), None, 10.0);
        let left = feed(
            &mut recognizer,
            PointerEvent::Leave {
                pointer: 1,
                position: Point::new(12.0, 0.0),
            },
            None,
            20.0,
        );
        assert_eq!(
            left,
            vec![GestureIntent::DragEnd {
                id: "a".into(),
                offset: Vec2::new(12.0, 0.0)
            }]
        );
        assert!(recognizer.is_idle());

        feed(&mut recognizer, PointerEvent::mouse_down(0.0, 0.0), Some("a"), 100.0);
        feed(&mut recognizer, PointerEvent::mouse_move(10.0, 0.0), None, 110.0);
        let cancelled = feed(&mut recognizer, PointerEvent::Cancel { pointer: 1 }, None, 120.0);
        assert!(matches!(cancelled.as_slice(), [GestureIntent::DragEnd { offset, .. }] if *offset == Vec2::new(10.0, 0.0)));
    }

    #[test]
    fn test_pinch_zoom_keeps_midpoint_anchor() {
        let mut recognizer = GestureRecognizer::default();
        feed(&mut recognizer, PointerEvent::touch_start(1, 100.0, 100.0), None, 0.0);
        feed(&mut recognizer, PointerEvent::touch_start(2, 200.0, 100.0), None, 10.0);
        assert_eq!(recognizer.state_name(), "zooming");

        let intents = feed(
            &mut recognizer,
            PointerEvent::Move {
                pointer: 2,
                position: Point::new(300.0, 100.0),
            },
            None,
            20.0,
        );
        let [GestureIntent::SetView(next)] = intents.as_slice() else {
            panic!("unexpected intents {intents:?}");
        };
        assert!((next.scale - 2.0).abs() < 1e-12);
        // Start midpoint (150,100) in document space must sit under the new midpoint (200,100).
        let under = next.to_client(view().to_local(Point::new(150.0, 100.0)));
        assert!((under.x - 200.0).abs() < 1e-9);
        assert!((under.y - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_pinch_scale_is_clamped() {
        let mut recognizer = GestureRecognizer::default();
        feed(&mut recognizer, PointerEvent::touch_start(1, 0.0, 0.0), None, 0.0);
        feed(&mut recognizer, PointerEvent::touch_start(2, 10.0, 0.0), None, 0.0);
        let intents = feed(
            &mut recognizer,
            PointerEvent::Move {
                pointer: 2,
                position: Point::new(1000.0, 0.0),
            },
            None,
            10.0,
        );
        assert!(matches!(intents.as_slice(), [GestureIntent::SetView(v)] if (v.scale - 5.0).abs() < f64::EPSILON));
    }

    #[test]
    fn test_lifting_one_touch_rebases_pan() {
        let mut recognizer = GestureRecognizer::default();
        feed(&mut recognizer, PointerEvent::touch_start(1, 100.0, 100.0), None, 0.0);
        feed(&mut recognizer, PointerEvent::touch_start(2, 200.0, 100.0), None, 0.0);
        feed(
            &mut recognizer,
            PointerEvent::Move {
                pointer: 1,
                position: Point::new(90.0, 100.0),
            },
            None,
            10.0,
        );
        let lifted = feed(
            &mut recognizer,
            PointerEvent::Up {
                pointer: 2,
                position: Point::new(200.0, 100.0),
            },
            None,
            20.0,
        );
        assert!(lifted.is_empty());
        assert_eq!(recognizer.state_name(), "panning");

        // Panning continues from the remaining touch's current spot: no jump.
        let moved = feed(
            &mut recognizer,
            PointerEvent::Move {
                pointer: 1,
                position: Point::new(95.0, 100.0),
            },
            None,
            30.0,
        );
        assert_eq!(moved, vec![GestureIntent::Pan { delta: Vec2::new(5.0, 0.0) }]);

        let released = feed(
            &mut recognizer,
            PointerEvent::Up {
                pointer: 1,
                position: Point::new(95.0, 100.0),
            },
            None,
            40.0,
        );
        assert!(released.is_empty());
        assert!(recognizer.is_idle());
    }

    #[test]
    fn test_second_touch_ends_drag() {
        let mut recognizer = GestureRecognizer::default();
        feed(&mut recognizer, PointerEvent::touch_start(1, 0.0, 0.0), Some("a"), 0.0);
        feed(
            &mut recognizer,
            PointerEvent::Move {
                pointer: 1,
                position: Point::new(20.0, 0.0),
            },
            None,
            10.0,
        );
        let intents = feed(&mut recognizer, PointerEvent::touch_start(2, 100.0, 0.0), None, 20.0);
        assert!(matches!(intents.as_slice(), [GestureIntent::DragEnd { id, .. }] if id == "a"));
        assert_eq!(recognizer.state_name(), "zooming");
    }
}
