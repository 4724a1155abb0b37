//! Viewport controller: pan/zoom state and coordinate transforms.

use crate::animation::{Interpolate, Transition};
use crate::config::EngineConfig;
use kurbo::{Affine, Point, Rect, Size, Vec2};
use serde::{Deserialize, Serialize};

/// Pan offset and zoom scale.
///
/// `client = local * scale + translate`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ViewState {
    pub scale: f64,
    pub translate: Vec2,
}

impl Default for ViewState {
    fn default() -> Self {
        Self {
            scale: 1.0,
            translate: Vec2::ZERO,
        }
    }
}

impl ViewState {
    /// Transform from document (local) to client coordinates.
    pub fn transform(&self) -> Affine {
        Affine::translate(self.translate) * Affine::scale(self.scale)
    }

    /// Transform from client to document (local) coordinates.
    pub fn inverse_transform(&self) -> Affine {
        Affine::scale(1.0 / self.scale) * Affine::translate(-self.translate)
    }

    pub fn to_local(&self, client: Point) -> Point {
        self.inverse_transform() * client
    }

    pub fn to_client(&self, local: Point) -> Point {
        self.transform() * local
    }

    /// The same view rescaled so the document point under `anchor` stays put.
    pub fn scaled_about(&self, anchor: Point, scale: f64) -> ViewState {
        let local = self.to_local(anchor);
        ViewState {
            scale,
            translate: Vec2::new(anchor.x - local.x * scale, anchor.y - local.y * scale),
        }
    }
}

impl Interpolate for ViewState {
    fn lerp(self, to: Self, t: f64) -> Self {
        ViewState {
            scale: self.scale.lerp(to.scale, t),
            translate: self.translate.lerp(to.translate, t),
        }
    }
}

/// Rate limiter for `viewport:changed` notifications.
///
/// The first change in a quiet period is reported at once. Changes inside
/// the interval are folded into one trailing report delivered by
/// [`ChangeThrottle::flush`] once the interval has elapsed.
#[derive(Debug, Clone)]
pub struct ChangeThrottle {
    interval: f64,
    last_emit: Option<f64>,
    pending: bool,
}

impl ChangeThrottle {
    pub fn new(interval: f64) -> Self {
        Self {
            interval: interval.max(0.0),
            last_emit: None,
            pending: false,
        }
    }

    /// Register a change at `now`. Returns true if it should be emitted now.
    pub fn record(&mut self, now: f64) -> bool {
        match self.last_emit {
            Some(last) if now - last < self.interval => {
                self.pending = true;
                false
            }
            _ => {
                self.last_emit = Some(now);
                self.pending = false;
                true
            }
        }
    }

    /// Emit the coalesced trailing change if its window has closed.
    pub fn flush(&mut self, now: f64) -> bool {
        if !self.pending {
            return false;
        }
        match self.next_flush() {
            Some(at) if now >= at => {
                self.pending = false;
                self.last_emit = Some(now);
                true
            }
            _ => false,
        }
    }

    /// When the pending trailing change becomes due.
    pub fn next_flush(&self) -> Option<f64> {
        if !self.pending {
            return None;
        }
        Some(self.last_emit.unwrap_or(0.0) + self.interval)
    }

    pub fn has_pending(&self) -> bool {
        self.pending
    }

    pub fn reset(&mut self) {
        self.last_emit = None;
        self.pending = false;
    }
}

/// Owns the view transform of one capture surface.
///
/// Every mutator returns whether the displayed state changed (or a smooth
/// transition started) so the caller can raise a notification.
#[derive(Debug, Clone)]
pub struct ViewportController {
    state: ViewState,
    min_zoom: f64,
    max_zoom: f64,
    surface: Option<Size>,
    animation: Option<Transition<ViewState>>,
    animation_duration: f64,
}

impl Default for ViewportController {
    fn default() -> Self {
        Self::new(&EngineConfig::default())
    }
}

impl ViewportController {
    pub fn new(config: &EngineConfig) -> Self {
        let min_zoom = config.min_zoom.min(config.max_zoom);
        Self {
            state: ViewState::default(),
            min_zoom,
            max_zoom: config.max_zoom,
            surface: None,
            animation: None,
            animation_duration: config.animation_duration_ms,
        }
    }

    pub fn state(&self) -> ViewState {
        self.state
    }

    pub fn zoom(&self) -> f64 {
        self.state.scale
    }

    pub fn translate(&self) -> Vec2 {
        self.state.translate
    }

    pub fn zoom_limits(&self) -> (f64, f64) {
        (self.min_zoom, self.max_zoom)
    }

    pub fn clamp_zoom(&self, zoom: f64) -> f64 {
        if zoom.is_nan() {
            return self.state.scale;
        }
        zoom.clamp(self.min_zoom, self.max_zoom)
    }

    // --- surface ---

    pub fn attach(&mut self, size: Size) {
        self.surface = Some(size);
    }

    pub fn resize(&mut self, size: Size) {
        self.surface = Some(size);
    }

    pub fn detach(&mut self) {
        self.surface = None;
        self.animation = None;
    }

    pub fn surface(&self) -> Option<Size> {
        self.surface
    }

    pub fn is_attached(&self) -> bool {
        self.surface.is_some()
    }

    fn center(&self) -> Point {
        self.surface
            .map(|s| Point::new(s.width / 2.0, s.height / 2.0))
            .unwrap_or(Point::ZERO)
    }

    // --- transforms ---

    pub fn to_local(&self, client: Point) -> Point {
        self.state.to_local(client)
    }

    pub fn to_client(&self, local: Point) -> Point {
        self.state.to_client(local)
    }

    // --- animation ---

    pub fn is_animating(&self) -> bool {
        self.animation.is_some()
    }

    /// Where the view is heading: the animation target, or the current state.
    pub fn target_state(&self) -> ViewState {
        self.animation.map_or(self.state, |a| a.to)
    }

    /// Drop any running transition, leaving the view where it is.
    pub fn cancel_animation(&mut self) {
        self.animation = None;
    }

    /// Advance the running transition. Returns true if the state changed.
    pub fn tick(&mut self, now: f64) -> bool {
        let Some(animation) = self.animation else {
            return false;
        };
        let next = animation.sample(now);
        if animation.is_finished(now) {
            self.animation = None;
        }
        let changed = next != self.state;
        self.state = next;
        changed
    }

    fn go_to(&mut self, target: ViewState, smooth: bool, now: f64) -> bool {
        if !target.translate.x.is_finite() || !target.translate.y.is_finite() {
            log::debug!("Ignoring non-finite view translate {:?}", target.translate);
            return false;
        }
        let target = ViewState {
            scale: self.clamp_zoom(target.scale),
            translate: target.translate,
        };
        if smooth && self.animation_duration > 0.0 {
            if target == self.state {
                self.animation = None;
                return false;
            }
            // A newer request replaces whatever is running.
            self.animation = Some(Transition::new(now, self.animation_duration, self.state, target));
            true
        } else {
            self.animation = None;
            let changed = target != self.state;
            self.state = target;
            changed
        }
    }

    // --- zoom ---

    /// Zoom about the surface center.
    pub fn set_zoom(&mut self, zoom: f64, smooth: bool, now: f64) -> bool {
        let base = self.target_state();
        let scale = self.clamp_zoom(zoom);
        let target = base.scaled_about(self.center(), scale);
        self.go_to(target, smooth, now)
    }

    /// Multiply the zoom by `step`.
    pub fn zoom_in(&mut self, step: f64, smooth: bool, now: f64) -> bool {
        self.zoom_by(step, smooth, now)
    }

    /// Multiply the zoom by `step`; a step below one zooms out.
    pub fn zoom_out(&mut self, step: f64, smooth: bool, now: f64) -> bool {
        self.zoom_by(step, smooth, now)
    }

    fn zoom_by(&mut self, step: f64, smooth: bool, now: f64) -> bool {
        if !step.is_finite() || step <= 0.0 {
            return false;
        }
        let zoom = self.target_state().scale * step;
        self.set_zoom(zoom, smooth, now)
    }

    /// Zoom by `factor`, keeping the client point `anchor` fixed.
    pub fn zoom_at(&mut self, anchor: Point, factor: f64) -> bool {
        let new_zoom = self.clamp_zoom(self.state.scale * factor);
        if (new_zoom - self.state.scale).abs() < f64::EPSILON {
            return false;
        }
        let target = self.state.scaled_about(anchor, new_zoom);
        self.go_to(target, false, 0.0)
    }

    /// Replace the whole view at once (scale is still clamped).
    pub fn set_view(&mut self, view: ViewState) -> bool {
        self.go_to(view, false, 0.0)
    }

    // --- pan ---

    /// Translate by a client-space delta.
    pub fn pan(&mut self, delta: Vec2) -> bool {
        let mut target = self.target_state();
        target.translate += delta;
        self.go_to(target, false, 0.0)
    }

    /// Move the translate offset to `(x, y)`.
    pub fn pan_to(&mut self, x: f64, y: f64, smooth: bool, now: f64) -> bool {
        let mut target = self.target_state();
        target.translate = Vec2::new(x, y);
        self.go_to(target, smooth, now)
    }

    // --- fitting ---

    /// Scale and center the view so `bounds` fits the surface minus
    /// `padding` on every side.
    ///
    /// No-op without bounds or without an attached surface.
    pub fn zoom_to_fit(&mut self, bounds: Option<Rect>, padding: f64, smooth: bool, now: f64) -> bool {
        let (Some(bounds), Some(viewport)) = (bounds, self.surface) else {
            return false;
        };

        let padded = Size::new(
            (viewport.width - padding * 2.0).max(1.0),
            (viewport.height - padding * 2.0).max(1.0),
        );
        let scale_x = padded.width / bounds.width();
        let scale_y = padded.height / bounds.height();
        let scale = self.clamp_zoom(scale_x.min(scale_y));

        let bounds_center = bounds.center();
        let viewport_center = Point::new(viewport.width / 2.0, viewport.height / 2.0);
        let target = ViewState {
            scale,
            translate: Vec2::new(
                viewport_center.x - bounds_center.x * scale,
                viewport_center.y - bounds_center.y * scale,
            ),
        };
        self.go_to(target, smooth, now)
    }
}
