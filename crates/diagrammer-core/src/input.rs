//! Raw pointer/touch/wheel input as delivered by the host surface.
//!
//! Positions are client coordinates relative to the capture surface.

use kurbo::{Point, Vec2};
use serde::{Deserialize, Serialize};

/// Host-assigned pointer identifier (mouse is usually 1, each finger its own).
pub type PointerId = u32;

/// Kind of device that produced a pointer event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PointerKind {
    #[default]
    Mouse,
    Touch,
    Pen,
}

/// Mouse button identifiers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MouseButton {
    #[default]
    Left,
    Right,
    Middle,
}

/// Modifier keys state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Modifiers {
    pub shift: bool,
    pub ctrl: bool,
    pub alt: bool,
    pub meta: bool,
}

impl Modifiers {
    pub const NONE: Modifiers = Modifiers {
        shift: false,
        ctrl: false,
        alt: false,
        meta: false,
    };

    pub const SHIFT: Modifiers = Modifiers {
        shift: true,
        ctrl: false,
        alt: false,
        meta: false,
    };

    /// Shift, Ctrl or Meta extend the selection instead of replacing it.
    pub fn is_additive(&self) -> bool {
        self.shift || self.ctrl || self.meta
    }
}

/// Pointer event type for unified mouse/touch handling.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum PointerEvent {
    Down {
        pointer: PointerId,
        kind: PointerKind,
        position: Point,
        button: MouseButton,
        modifiers: Modifiers,
    },
    Move {
        pointer: PointerId,
        position: Point,
    },
    Up {
        pointer: PointerId,
        position: Point,
    },
    /// The platform aborted the pointer (e.g. touch stolen by a scroll).
    Cancel { pointer: PointerId },
    /// The pointer left the capture surface.
    Leave { pointer: PointerId, position: Point },
    Wheel { position: Point, delta: Vec2 },
}

impl PointerEvent {
    /// Left-button mouse press with no modifiers.
    pub fn mouse_down(x: f64, y: f64) -> Self {
        PointerEvent::Down {
            pointer: 1,
            kind: PointerKind::Mouse,
            position: Point::new(x, y),
            button: MouseButton::Left,
            modifiers: Modifiers::NONE,
        }
    }

    pub fn mouse_move(x: f64, y: f64) -> Self {
        PointerEvent::Move {
            pointer: 1,
            position: Point::new(x, y),
        }
    }

    pub fn mouse_up(x: f64, y: f64) -> Self {
        PointerEvent::Up {
            pointer: 1,
            position: Point::new(x, y),
        }
    }

    pub fn touch_start(pointer: PointerId, x: f64, y: f64) -> Self {
        PointerEvent::Down {
            pointer,
            kind: PointerKind::Touch,
            position: Point::new(x, y),
            button: MouseButton::Left,
            modifiers: Modifiers::NONE,
        }
    }

    pub fn wheel(x: f64, y: f64, delta_y: f64) -> Self {
        PointerEvent::Wheel {
            position: Point::new(x, y),
            delta: Vec2::new(0.0, delta_y),
        }
    }

    /// Replace the button of a `Down` event.
    pub fn with_button(mut self, new_button: MouseButton) -> Self {
        if let PointerEvent::Down { button, .. } = &mut self {
            *button = new_button;
        }
        self
    }

    /// Replace the modifiers of a `Down` event.
    pub fn with_modifiers(mut self, new_modifiers: Modifiers) -> Self {
        if let PointerEvent::Down { modifiers, .. } = &mut self {
            *modifiers = new_modifiers;
        }
        self
    }

    /// Client position carried by the event, if any.
    pub fn position(&self) -> Option<Point> {
        match self {
            PointerEvent::Down { position, .. }
            | PointerEvent::Move { position, .. }
            | PointerEvent::Up { position, .. }
            | PointerEvent::Leave { position, .. }
            | PointerEvent::Wheel { position, .. } => Some(*position),
            PointerEvent::Cancel { .. } => None,
        }
    }
}
