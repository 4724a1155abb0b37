//! Smooth transitions sampled once per animation frame.

use kurbo::Vec2;

/// Values that can be linearly interpolated.
pub trait Interpolate: Copy {
    fn lerp(self, to: Self, t: f64) -> Self;
}

impl Interpolate for f64 {
    fn lerp(self, to: Self, t: f64) -> Self {
        self + (to - self) * t
    }
}

impl Interpolate for Vec2 {
    fn lerp(self, to: Self, t: f64) -> Self {
        Vec2::new(self.x.lerp(to.x, t), self.y.lerp(to.y, t))
    }
}

/// Cubic ease-out: fast start, gentle landing.
pub fn ease_out_cubic(t: f64) -> f64 {
    let t = t.clamp(0.0, 1.0);
    1.0 - (1.0 - t).powi(3)
}

/// A running transition from one value to another.
///
/// Cancelling is just dropping it; nothing else holds a reference.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transition<T> {
    pub start_time: f64,
    pub duration: f64,
    pub from: T,
    pub to: T,
}

impl<T: Interpolate> Transition<T> {
    pub fn new(start_time: f64, duration: f64, from: T, to: T) -> Self {
        Self {
            start_time,
            duration,
            from,
            to,
        }
    }

    /// Linear progress in `[0, 1]` at time `now` (milliseconds).
    pub fn progress(&self, now: f64) -> f64 {
        if self.duration <= 0.0 {
            return 1.0;
        }
        ((now - self.start_time) / self.duration).clamp(0.0, 1.0)
    }

    pub fn is_finished(&self, now: f64) -> bool {
        self.progress(now) >= 1.0
    }

    /// Eased value at time `now`. Returns exactly `to` once finished.
    pub fn sample(&self, now: f64) -> T {
        let t = self.progress(now);
        if t >= 1.0 {
            return self.to;
        }
        self.from.lerp(self.to, ease_out_cubic(t))
    }
}
