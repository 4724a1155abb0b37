//! Engine configuration.

use serde::{Deserialize, Serialize};

/// Default maximum number of undo states to keep.
pub const DEFAULT_HISTORY_DEPTH: usize = 100;
/// Smallest allowed zoom factor.
pub const MIN_ZOOM: f64 = 0.1;
/// Largest allowed zoom factor.
pub const MAX_ZOOM: f64 = 5.0;
/// Multiplier applied by a single zoom-in step.
pub const DEFAULT_ZOOM_STEP: f64 = 1.2;
/// Grid spacing in document units.
pub const DEFAULT_GRID_SPACING: f64 = 20.0;

/// Tunables for a [`DiagramEngine`](crate::DiagramEngine).
///
/// Every field has a default, so a host can deserialize a partial JSON
/// object and only override what it cares about.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Undo/redo stack depth.
    pub history_depth: usize,
    pub min_zoom: f64,
    pub max_zoom: f64,
    /// Default `zoom_in` factor; `zoom_out` defaults to its inverse.
    pub zoom_step: f64,
    /// Wheel zoom factor is `exp(-delta_y * sensitivity)`.
    pub wheel_zoom_sensitivity: f64,
    /// Duration of smooth pan/zoom transitions.
    pub animation_duration_ms: f64,
    /// Minimum interval between two `viewport:changed` emissions.
    pub viewport_throttle_ms: f64,
    /// Total pointer travel (screen pixels) since the press that promotes
    /// it into a drag.
    pub drag_threshold_px: f64,
    /// Press-and-hold time that promotes a press into a drag.
    pub hold_delay_ms: f64,
    pub double_click_ms: f64,
    pub double_click_distance_px: f64,
    pub page_width: f64,
    pub page_height: f64,
    /// Elements may overhang the page by this much on every side.
    pub page_padding: f64,
    pub grid_enabled: bool,
    pub grid_spacing: f64,
    /// Reject moves whose result overlaps another element.
    pub collision_detection: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            history_depth: DEFAULT_HISTORY_DEPTH,
            min_zoom: MIN_ZOOM,
            max_zoom: MAX_ZOOM,
            zoom_step: DEFAULT_ZOOM_STEP,
            wheel_zoom_sensitivity: 0.002,
            animation_duration_ms: 300.0,
            viewport_throttle_ms: 16.0,
            drag_threshold_px: 4.0,
            hold_delay_ms: 200.0,
            double_click_ms: 500.0,
            double_click_distance_px: 5.0,
            page_width: 4000.0,
            page_height: 4000.0,
            page_padding: 20.0,
            grid_enabled: false,
            grid_spacing: DEFAULT_GRID_SPACING,
            collision_detection: false,
        }
    }
}

impl EngineConfig {
    /// Parse a (possibly partial) JSON configuration.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Serialize the configuration to JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}
