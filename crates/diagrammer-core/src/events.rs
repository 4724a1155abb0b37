//! Event bridge: typed publish/subscribe for host applications.
//!
//! Subscribers are plain reference-counted callbacks. The bus keeps a
//! strong reference to each, so callers must unsubscribe on teardown;
//! [`EventBus::clear`] drops everything at once.

use crate::shapes::{Element, ElementId, LinkEnd, LinkId};
use kurbo::{Point, Size, Vec2};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::rc::Rc;

/// Stable external event names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    #[serde(rename = "element:added")]
    ElementAdded,
    #[serde(rename = "element:removed")]
    ElementRemoved,
    #[serde(rename = "element:changed")]
    ElementChanged,
    #[serde(rename = "element:moved")]
    ElementMoved,
    #[serde(rename = "element:resized")]
    ElementResized,
    #[serde(rename = "element:selected")]
    ElementSelected,
    #[serde(rename = "element:double-click")]
    ElementDoubleClick,
    #[serde(rename = "element:dragging")]
    ElementDragging,
    #[serde(rename = "element:drag-end")]
    ElementDragEnd,
    #[serde(rename = "link:added")]
    LinkAdded,
    #[serde(rename = "link:removed")]
    LinkRemoved,
    #[serde(rename = "link:changed")]
    LinkChanged,
    #[serde(rename = "link:connected")]
    LinkConnected,
    #[serde(rename = "link:disconnected")]
    LinkDisconnected,
    #[serde(rename = "canvas:clicked")]
    CanvasClicked,
    #[serde(rename = "document:saved")]
    DocumentSaved,
    #[serde(rename = "document:loaded")]
    DocumentLoaded,
    #[serde(rename = "viewport:changed")]
    ViewportChanged,
    #[serde(rename = "selection:changed")]
    SelectionChanged,
    #[serde(rename = "selection:cleared")]
    SelectionCleared,
}

impl EventType {
    /// Every event type, in declaration order.
    pub const ALL: [EventType; 20] = [
        EventType::ElementAdded,
        EventType::ElementRemoved,
        EventType::ElementChanged,
        EventType::ElementMoved,
        EventType::ElementResized,
        EventType::ElementSelected,
        EventType::ElementDoubleClick,
        EventType::ElementDragging,
        EventType::ElementDragEnd,
        EventType::LinkAdded,
        EventType::LinkRemoved,
        EventType::LinkChanged,
        EventType::LinkConnected,
        EventType::LinkDisconnected,
        EventType::CanvasClicked,
        EventType::DocumentSaved,
        EventType::DocumentLoaded,
        EventType::ViewportChanged,
        EventType::SelectionChanged,
        EventType::SelectionCleared,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            EventType::ElementAdded => "element:added",
            EventType::ElementRemoved => "element:removed",
            EventType::ElementChanged => "element:changed",
            EventType::ElementMoved => "element:moved",
            EventType::ElementResized => "element:resized",
            EventType::ElementSelected => "element:selected",
            EventType::ElementDoubleClick => "element:double-click",
            EventType::ElementDragging => "element:dragging",
            EventType::ElementDragEnd => "element:drag-end",
            EventType::LinkAdded => "link:added",
            EventType::LinkRemoved => "link:removed",
            EventType::LinkChanged => "link:changed",
            EventType::LinkConnected => "link:connected",
            EventType::LinkDisconnected => "link:disconnected",
            EventType::CanvasClicked => "canvas:clicked",
            EventType::DocumentSaved => "document:saved",
            EventType::DocumentLoaded => "document:loaded",
            EventType::ViewportChanged => "viewport:changed",
            EventType::SelectionChanged => "selection:changed",
            EventType::SelectionCleared => "selection:cleared",
        }
    }

    /// Look up an event type by its external name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|ty| ty.as_str() == name)
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One element displacement within an `element:moved` notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElementMove {
    pub id: ElementId,
    pub from: Point,
    pub to: Point,
}

/// Event payloads.
#[derive(Debug, Clone, PartialEq)]
pub enum DiagramEvent {
    ElementAdded { element: Element },
    ElementRemoved { id: ElementId },
    ElementChanged { id: ElementId },
    /// One notification per committed move, batch moves included.
    ElementMoved { moves: Vec<ElementMove> },
    ElementResized { id: ElementId, size: Size },
    ElementSelected { id: ElementId },
    ElementDoubleClick { id: ElementId },
    /// `offset` is the accumulated displacement since the drag started.
    ElementDragging { ids: Vec<ElementId>, offset: Vec2 },
    ElementDragEnd { ids: Vec<ElementId>, offset: Vec2 },
    LinkAdded { id: LinkId },
    LinkRemoved { id: LinkId },
    LinkChanged { id: LinkId },
    LinkConnected { id: LinkId, end: LinkEnd, element: ElementId },
    LinkDisconnected { id: LinkId, end: LinkEnd, element: ElementId },
    /// `position` is in document coordinates.
    CanvasClicked { position: Point },
    DocumentSaved { id: String },
    DocumentLoaded { id: String },
    ViewportChanged { zoom: f64, pan: Vec2 },
    SelectionChanged { ids: Vec<ElementId> },
    SelectionCleared,
}

impl DiagramEvent {
    pub fn event_type(&self) -> EventType {
        match self {
            DiagramEvent::ElementAdded { .. } => EventType::ElementAdded,
            DiagramEvent::ElementRemoved { .. } => EventType::ElementRemoved,
            DiagramEvent::ElementChanged { .. } => EventType::ElementChanged,
            DiagramEvent::ElementMoved { .. } => EventType::ElementMoved,
            DiagramEvent::ElementResized { .. } => EventType::ElementResized,
            DiagramEvent::ElementSelected { .. } => EventType::ElementSelected,
            DiagramEvent::ElementDoubleClick { .. } => EventType::ElementDoubleClick,
            DiagramEvent::ElementDragging { .. } => EventType::ElementDragging,
            DiagramEvent::ElementDragEnd { .. } => EventType::ElementDragEnd,
            DiagramEvent::LinkAdded { .. } => EventType::LinkAdded,
            DiagramEvent::LinkRemoved { .. } => EventType::LinkRemoved,
            DiagramEvent::LinkChanged { .. } => EventType::LinkChanged,
            DiagramEvent::LinkConnected { .. } => EventType::LinkConnected,
            DiagramEvent::LinkDisconnected { .. } => EventType::LinkDisconnected,
            DiagramEvent::CanvasClicked { .. } => EventType::CanvasClicked,
            DiagramEvent::DocumentSaved { .. } => EventType::DocumentSaved,
            DiagramEvent::DocumentLoaded { .. } => EventType::DocumentLoaded,
            DiagramEvent::ViewportChanged { .. } => EventType::ViewportChanged,
            DiagramEvent::SelectionChanged { .. } => EventType::SelectionChanged,
            DiagramEvent::SelectionCleared => EventType::SelectionCleared,
        }
    }
}

/// Subscriber callback.
pub type Listener = Rc<dyn Fn(&DiagramEvent)>;

fn same_listener(a: &Listener, b: &Listener) -> bool {
    std::ptr::addr_eq(Rc::as_ptr(a), Rc::as_ptr(b))
}

/// Per-event-type subscriber lists.
#[derive(Default)]
pub struct EventBus {
    listeners: HashMap<EventType, Vec<Listener>>,
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let counts: HashMap<&str, usize> = self
            .listeners
            .iter()
            .map(|(ty, list)| (ty.as_str(), list.len()))
            .collect();
        f.debug_struct("EventBus").field("listeners", &counts).finish()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a subscriber. The same callback may be registered more than
    /// once and then fires once per registration.
    pub fn add_event_listener(&mut self, event_type: EventType, listener: Listener) {
        self.listeners.entry(event_type).or_default().push(listener);
    }

    /// Remove the first registration of `listener` for `event_type`.
    /// Returns true if one was found.
    pub fn remove_event_listener(&mut self, event_type: EventType, listener: &Listener) -> bool {
        let Some(list) = self.listeners.get_mut(&event_type) else {
            return false;
        };
        let Some(index) = list.iter().position(|l| same_listener(l, listener)) else {
            return false;
        };
        list.remove(index);
        if list.is_empty() {
            self.listeners.remove(&event_type);
        }
        true
    }

    pub fn listener_count(&self, event_type: EventType) -> usize {
        self.listeners.get(&event_type).map_or(0, Vec::len)
    }

    /// Total number of registrations across all event types.
    pub fn total_listeners(&self) -> usize {
        self.listeners.values().map(Vec::len).sum()
    }

    /// Invoke every subscriber of the event's type in registration order.
    ///
    /// A panicking subscriber is logged and skipped; the rest still run.
    pub fn emit(&self, event: DiagramEvent) {
        let event_type = event.event_type();
        let Some(list) = self.listeners.get(&event_type) else {
            return;
        };
        let listeners: Vec<Listener> = list.clone();
        for listener in listeners {
            if let Err(panic) = catch_unwind(AssertUnwindSafe(|| listener(&event))) {
                let message = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                log::error!("Listener for {} failed: {}", event_type, message);
            }
        }
    }

    /// Drop every subscription.
    pub fn clear(&mut self) {
        self.listeners.clear();
    }
}
