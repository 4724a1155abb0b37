//! Element and link definitions for the diagram document.

mod registry;

pub use registry::{ElementBuilder, LinkBuilder, LinkTemplate, ShapeRegistry, ShapeTemplate};

use kurbo::{Point, Rect, Size, Vec2};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Unique identifier for elements (shapes).
pub type ElementId = String;

/// Unique identifier for links.
pub type LinkId = String;

/// Opaque style/attribute bag handed to the rendering collaborator untouched.
pub type Properties = serde_json::Map<String, Value>;

/// Generate a fresh entity id.
pub fn generate_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// A shape node in the diagram.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Element {
    pub id: ElementId,
    /// Template tag (e.g. `"rectangle"`).
    #[serde(rename = "type")]
    pub kind: String,
    /// Top-left corner in document coordinates.
    pub position: Point,
    pub size: Size,
    #[serde(default)]
    pub properties: Properties,
    /// Embedding parent, if any.
    #[serde(default, rename = "parentId", skip_serializing_if = "Option::is_none")]
    pub parent: Option<ElementId>,
}

impl Element {
    /// Axis-aligned bounding box in document coordinates.
    pub fn bounds(&self) -> Rect {
        Rect::from_origin_size(self.position, self.size)
    }

    /// Check if a document point lies inside the bounding box.
    pub fn hit_test(&self, point: Point) -> bool {
        let b = self.bounds();
        point.x >= b.x0 && point.x <= b.x1 && point.y >= b.y0 && point.y <= b.y1
    }

    /// Translate the element by `delta`.
    pub fn translate(&mut self, delta: Vec2) {
        self.position += delta;
    }
}

/// One end of a link: an element and optionally a port on it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    pub id: ElementId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<String>,
}

impl Endpoint {
    /// Attach to the element itself.
    pub fn element(id: impl Into<ElementId>) -> Self {
        Self { id: id.into(), port: None }
    }

    /// Attach to a named port on the element.
    pub fn port(id: impl Into<ElementId>, port: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            port: Some(port.into()),
        }
    }
}

/// Which end of a link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkEnd {
    Source,
    Target,
}

/// A directed connection between two elements.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Link {
    pub id: LinkId,
    #[serde(rename = "type")]
    pub kind: String,
    pub source: Endpoint,
    pub target: Endpoint,
    /// Manual routing waypoints, in order.
    #[serde(default)]
    pub vertices: Vec<Point>,
    #[serde(default)]
    pub properties: Properties,
}

impl Link {
    /// Check if either end references `element`.
    pub fn touches(&self, element: &str) -> bool {
        self.source.id == element || self.target.id == element
    }

    pub fn endpoint(&self, end: LinkEnd) -> &Endpoint {
        match end {
            LinkEnd::Source => &self.source,
            LinkEnd::Target => &self.target,
        }
    }
}

/// Partial element description accepted by `add_element`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ElementConfig {
    /// Explicit id; one is generated when absent.
    #[serde(default)]
    pub id: Option<ElementId>,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub position: Option<Point>,
    #[serde(default)]
    pub size: Option<Size>,
    #[serde(default)]
    pub properties: Properties,
    #[serde(default, rename = "parentId")]
    pub parent: Option<ElementId>,
}

impl ElementConfig {
    /// Start a config for the given template type.
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            ..Default::default()
        }
    }

    pub fn with_id(mut self, id: impl Into<ElementId>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn at(mut self, x: f64, y: f64) -> Self {
        self.position = Some(Point::new(x, y));
        self
    }

    pub fn sized(mut self, width: f64, height: f64) -> Self {
        self.size = Some(Size::new(width, height));
        self
    }

    pub fn with_property(mut self, key: impl Into<String>, value: Value) -> Self {
        self.properties.insert(key.into(), value);
        self
    }

    pub fn embedded_in(mut self, parent: impl Into<ElementId>) -> Self {
        self.parent = Some(parent.into());
        self
    }
}

impl From<&Element> for ElementConfig {
    fn from(element: &Element) -> Self {
        Self {
            id: Some(element.id.clone()),
            kind: element.kind.clone(),
            position: Some(element.position),
            size: Some(element.size),
            properties: element.properties.clone(),
            parent: element.parent.clone(),
        }
    }
}

fn default_link_kind() -> String {
    "link".to_string()
}

/// Partial link description accepted by `add_link`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkConfig {
    #[serde(default)]
    pub id: Option<LinkId>,
    #[serde(rename = "type", default = "default_link_kind")]
    pub kind: String,
    #[serde(default)]
    pub source: Option<Endpoint>,
    #[serde(default)]
    pub target: Option<Endpoint>,
    #[serde(default)]
    pub vertices: Vec<Point>,
    #[serde(default)]
    pub properties: Properties,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            id: None,
            kind: default_link_kind(),
            source: None,
            target: None,
            vertices: Vec::new(),
            properties: Properties::new(),
        }
    }
}

impl LinkConfig {
    /// Plain link between two elements.
    pub fn between(source: impl Into<ElementId>, target: impl Into<ElementId>) -> Self {
        Self {
            source: Some(Endpoint::element(source)),
            target: Some(Endpoint::element(target)),
            ..Default::default()
        }
    }

    pub fn with_id(mut self, id: impl Into<LinkId>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = kind.into();
        self
    }

    pub fn with_vertices(mut self, vertices: Vec<Point>) -> Self {
        self.vertices = vertices;
        self
    }
}

impl From<&Link> for LinkConfig {
    fn from(link: &Link) -> Self {
        Self {
            id: Some(link.id.clone()),
            kind: link.kind.clone(),
            source: Some(link.source.clone()),
            target: Some(link.target.clone()),
            vertices: link.vertices.clone(),
            properties: link.properties.clone(),
        }
    }
}

/// Geometry/style update for an existing element.
///
/// Property keys set to `null` are removed; other keys are merged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ElementPatch {
    #[serde(default)]
    pub position: Option<Point>,
    #[serde(default)]
    pub size: Option<Size>,
    #[serde(default)]
    pub properties: Option<Properties>,
}

impl ElementPatch {
    pub fn position(x: f64, y: f64) -> Self {
        Self {
            position: Some(Point::new(x, y)),
            ..Default::default()
        }
    }

    pub fn size(width: f64, height: f64) -> Self {
        Self {
            size: Some(Size::new(width, height)),
            ..Default::default()
        }
    }

    pub fn properties(properties: Properties) -> Self {
        Self {
            properties: Some(properties),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.position.is_none() && self.size.is_none() && self.properties.is_none()
    }
}

/// Merge `patch` into `target`, removing keys whose patch value is `null`.
pub fn merge_properties(target: &mut Properties, patch: &Properties) {
    for (key, value) in patch {
        if value.is_null() {
            target.remove(key);
        } else {
            target.insert(key.clone(), value.clone());
        }
    }
}

/// Check that a point has finite coordinates.
pub(crate) fn is_finite_point(point: Point) -> bool {
    point.x.is_finite() && point.y.is_finite()
}

/// Check that a size is finite and non-negative.
pub(crate) fn is_valid_size(size: Size) -> bool {
    size.width.is_finite() && size.height.is_finite() && size.width >= 0.0 && size.height >= 0.0
}
